// src/resolver/fallback.rs

//! Host fallback resolution
//!
//! Whatever the resolver cannot answer itself goes to a host-supplied
//! [`FallbackResolver`]. Closures work directly. [`FsFallback`] is a plain
//! filesystem implementation for the CLI and tests: files with the
//! configured extensions, directory indexes, and bare names found by
//! `node_modules` nesting with package.json `main`.

use super::request::{ModuleRequest, ResolveFailure, ResolvedModule};
use crate::package::{MANIFEST_FILE, PackageJson, locate_by_nesting};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

pub trait FallbackResolver: Send + Sync {
    fn resolve(&self, request: &ModuleRequest) -> Result<ResolvedModule, ResolveFailure>;
}

impl<F> FallbackResolver for F
where
    F: Fn(&ModuleRequest) -> Result<ResolvedModule, ResolveFailure> + Send + Sync,
{
    fn resolve(&self, request: &ModuleRequest) -> Result<ResolvedModule, ResolveFailure> {
        self(request)
    }
}

#[derive(Debug, Clone)]
pub struct FsFallback {
    extensions: Vec<String>,
}

impl FsFallback {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    fn resolve_file(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }
        let name = base.file_name()?.to_string_lossy().into_owned();
        self.extensions
            .iter()
            .map(|ext| base.with_file_name(format!("{}{}", name, ext)))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_dir(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        if let Some(main) = read_main(dir) {
            let target = clean_path(&dir.join(main));
            if let Some(found) = self.resolve_file(&target).or_else(|| self.resolve_index(&target)) {
                return Some(found);
            }
        }
        self.resolve_index(dir)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.resolve_file(&dir.join("index"))
    }

    fn resolve_path(&self, base: &Path) -> Option<PathBuf> {
        self.resolve_file(base).or_else(|| self.resolve_dir(base))
    }
}

impl FallbackResolver for FsFallback {
    fn resolve(&self, request: &ModuleRequest) -> Result<ResolvedModule, ResolveFailure> {
        let found = if request.is_absolute() {
            self.resolve_path(&clean_path(Path::new(request.specifier())))
        } else if request.is_relative() {
            self.resolve_path(&clean_path(&request.from_dir().join(request.specifier())))
        } else {
            let (name, subpath) = split_bare(request.specifier());
            locate_by_nesting(request.from_dir(), name).and_then(|root| match subpath {
                Some(sub) => self.resolve_path(&root.join(sub)),
                None => self.resolve_dir(&root),
            })
        };

        match found {
            Some(path) => {
                let path = fs::canonicalize(&path).unwrap_or(path);
                trace!("fs fallback: {} -> {:?}", request, path);
                Ok(ResolvedModule::file(path))
            }
            None => Err(ResolveFailure::new(request, "no such file or package")),
        }
    }
}

fn read_main(dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(dir.join(MANIFEST_FILE)).ok()?;
    let manifest: PackageJson = serde_json::from_str(&raw).ok()?;
    manifest.main
}

/// Split a bare specifier into package name and optional subpath
pub fn split_bare(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(i, _)| i)
    } else {
        specifier.find('/')
    };
    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..]).filter(|s| !s.is_empty())),
        None => (specifier, None),
    }
}

/// Lexically normalize `.` and `..` without touching the filesystem
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        vec![".js".into(), ".hbs".into()]
    }

    #[test]
    fn test_split_bare() {
        assert_eq!(split_bare("foo"), ("foo", None));
        assert_eq!(split_bare("foo/bar/baz"), ("foo", Some("bar/baz")));
        assert_eq!(split_bare("@scope/foo"), ("@scope/foo", None));
        assert_eq!(split_bare("@scope/foo/x"), ("@scope/foo", Some("x")));
        assert_eq!(split_bare("foo/"), ("foo", None));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/b/../c/./d.js")), PathBuf::from("/a/c/d.js"));
    }

    #[test]
    fn test_relative_with_extensions() {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        fs::create_dir_all(root.join("components")).unwrap();
        fs::write(root.join("components/card.hbs"), "<div/>").unwrap();

        let fallback = FsFallback::new(exts());
        let found = fallback
            .resolve(&ModuleRequest::new("./components/card", root.join("app.js")))
            .unwrap();
        assert_eq!(found.id, root.join("components/card.hbs").to_string_lossy());
        assert!(
            fallback
                .resolve(&ModuleRequest::new("./missing", root.join("app.js")))
                .is_err()
        );
    }

    #[test]
    fn test_bare_package_main_and_subpath() {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let pkg = root.join("node_modules/lib");
        fs::create_dir_all(pkg.join("dist")).unwrap();
        fs::write(pkg.join(MANIFEST_FILE), r#"{"name":"lib","main":"dist/main.js"}"#).unwrap();
        fs::write(pkg.join("dist/main.js"), "").unwrap();
        fs::write(pkg.join("dist/util.js"), "").unwrap();

        let fallback = FsFallback::new(exts());
        let from = root.join("src/app.js");
        let main = fallback.resolve(&ModuleRequest::new("lib", &from)).unwrap();
        assert!(main.id.ends_with("dist/main.js"));
        let sub = fallback.resolve(&ModuleRequest::new("lib/dist/util", &from)).unwrap();
        assert!(sub.id.ends_with("dist/util.js"));
    }

    #[test]
    fn test_closure_fallback() {
        let fallback = |req: &ModuleRequest| -> Result<ResolvedModule, ResolveFailure> {
            if req.specifier() == "known" {
                Ok(ResolvedModule::file("/known.js"))
            } else {
                Err(ResolveFailure::new(req, "unknown"))
            }
        };
        assert!(fallback.resolve(&ModuleRequest::new("known", "/x.js")).is_ok());
        assert!(fallback.resolve(&ModuleRequest::new("other", "/x.js")).is_err());
    }
}
