// src/index/view.rs

//! In-memory lookups over one committed index generation
//!
//! Everything here is a pure function of the index and the two directories
//! it was loaded for; nothing touches disk.

use super::RewrittenPackageIndex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Which index identity a file belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOwner {
    App,
    Moved { new_name: String, original_root: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RewrittenIndexView {
    index: RewrittenPackageIndex,
    app_root: PathBuf,
    rewritten_dir: PathBuf,
    /// New name -> original root, legacy packages only
    originals: HashMap<String, PathBuf>,
}

impl RewrittenIndexView {
    pub fn new(index: RewrittenPackageIndex, app_root: PathBuf, rewritten_dir: PathBuf) -> Self {
        let originals = index
            .packages
            .iter()
            .filter(|(root, _)| **root != app_root)
            .map(|(root, name)| (name.clone(), root.clone()))
            .collect();
        Self {
            index,
            app_root,
            rewritten_dir,
            originals,
        }
    }

    #[inline]
    pub fn index(&self) -> &RewrittenPackageIndex {
        &self.index
    }

    #[inline]
    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    #[inline]
    pub fn rewritten_dir(&self) -> &Path {
        &self.rewritten_dir
    }

    /// App name as recorded in the index
    pub fn app_name(&self) -> Option<&str> {
        self.index.new_name_of(&self.app_root)
    }

    /// New name of a moved package, by its original root
    pub fn moved_name(&self, original_root: &Path) -> Option<&str> {
        if original_root == self.app_root {
            return None;
        }
        self.index.new_name_of(original_root)
    }

    pub fn original_root_of(&self, new_name: &str) -> Option<&Path> {
        self.originals.get(new_name).map(PathBuf::as_path)
    }

    pub fn moved_root(&self, new_name: &str) -> PathBuf {
        self.rewritten_dir.join(new_name)
    }

    /// Split a path under the rewritten dir into (new name, relative rest)
    pub fn split_rewritten(&self, file: &Path) -> Option<(&str, PathBuf)> {
        let rest = file.strip_prefix(&self.rewritten_dir).ok()?;
        let mut components = rest.components();
        let first = normal(components.next()?)?;
        let candidate = if first.starts_with('@') {
            format!("{}/{}", first, normal(components.next()?)?)
        } else {
            first.to_string()
        };
        let (new_name, _) = self.originals.get_key_value(candidate.as_str())?;
        Some((new_name.as_str(), components.as_path().to_path_buf()))
    }

    /// Where `file` lived before the rewrite
    ///
    /// Files outside the rewritten dir are returned unchanged.
    pub fn original_location(&self, file: &Path) -> PathBuf {
        match self.split_rewritten(file) {
            Some((new_name, rel)) => match self.original_root_of(new_name) {
                Some(root) if rel.as_os_str().is_empty() => root.to_path_buf(),
                Some(root) => root.join(rel),
                None => file.to_path_buf(),
            },
            None => file.to_path_buf(),
        }
    }

    /// The innermost indexed package containing `file`
    pub fn owner(&self, file: &Path) -> Option<IndexOwner> {
        let location = self.original_location(file);
        location.ancestors().find_map(|dir| {
            let name = self.index.packages.get(dir)?;
            if dir == self.app_root {
                Some(IndexOwner::App)
            } else {
                Some(IndexOwner::Moved {
                    new_name: name.clone(),
                    original_root: dir.to_path_buf(),
                })
            }
        })
    }

    /// Extra roots resolvable from `owner`
    ///
    /// For the app both of its registrations are consulted.
    pub fn extra_roots(&self, owner: &IndexOwner) -> &[PathBuf] {
        let extra = &self.index.extra_resolutions;
        let found = match owner {
            IndexOwner::App => self
                .app_name()
                .and_then(|name| extra.get(name))
                .or_else(|| extra.get(self.app_root.to_string_lossy().as_ref())),
            IndexOwner::Moved { new_name, .. } => extra.get(new_name),
        };
        found.map(Vec::as_slice).unwrap_or_default()
    }

    /// Rewrite an absolute path under a moved package's original root
    pub fn relocate(&self, path: &Path) -> Option<PathBuf> {
        // Paths already under the rewritten dir stay put
        if path.starts_with(&self.rewritten_dir) {
            return None;
        }
        path.ancestors().find_map(|dir| {
            let new_name = self.moved_name(dir)?;
            let rel = path.strip_prefix(dir).ok()?;
            let moved = self.moved_root(new_name);
            Some(if rel.as_os_str().is_empty() { moved } else { moved.join(rel) })
        })
    }
}

fn normal(component: Component<'_>) -> Option<&str> {
    match component {
        Component::Normal(s) => s.to_str(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> RewrittenIndexView {
        let mut index = RewrittenPackageIndex::default();
        index
            .packages
            .insert(PathBuf::from("/proj/node_modules/foo"), "foo.aaaaaaaa".into());
        index.packages.insert(
            PathBuf::from("/proj/node_modules/foo/node_modules/@scope/bar"),
            "@scope/bar.bbbbbbbb".into(),
        );
        index.packages.insert(PathBuf::from("/proj"), "app".into());
        index
            .extra_resolutions
            .insert("app".into(), vec![PathBuf::from("/proj/lib/local")]);
        index
            .extra_resolutions
            .insert("/proj".into(), vec![PathBuf::from("/proj/lib/local")]);
        RewrittenIndexView::new(
            index,
            PathBuf::from("/proj"),
            PathBuf::from("/proj/node_modules/.embroider/rewritten-packages"),
        )
    }

    #[test]
    fn test_owner_prefers_innermost() {
        let v = view();
        assert_eq!(
            v.owner(Path::new("/proj/node_modules/foo/node_modules/@scope/bar/index.js")),
            Some(IndexOwner::Moved {
                new_name: "@scope/bar.bbbbbbbb".into(),
                original_root: PathBuf::from("/proj/node_modules/foo/node_modules/@scope/bar"),
            })
        );
        assert_eq!(v.owner(Path::new("/proj/app/app.js")), Some(IndexOwner::App));
        assert_eq!(v.owner(Path::new("/elsewhere/x.js")), None);
    }

    #[test]
    fn test_owner_of_rewritten_file_maps_back() {
        let v = view();
        let owner = v.owner(Path::new(
            "/proj/node_modules/.embroider/rewritten-packages/@scope/bar.bbbbbbbb/index.js",
        ));
        assert!(matches!(owner, Some(IndexOwner::Moved { ref new_name, .. }) if new_name == "@scope/bar.bbbbbbbb"));
    }

    #[test]
    fn test_app_extra_roots() {
        let v = view();
        assert_eq!(v.extra_roots(&IndexOwner::App), &[PathBuf::from("/proj/lib/local")]);
    }

    #[test]
    fn test_relocate_is_idempotent() {
        let v = view();
        let moved = v.relocate(Path::new("/proj/node_modules/foo/addon/x.js")).unwrap();
        assert_eq!(
            moved,
            PathBuf::from("/proj/node_modules/.embroider/rewritten-packages/foo.aaaaaaaa/addon/x.js")
        );
        assert_eq!(v.relocate(&moved), None);
        // The app is never relocated
        assert_eq!(v.relocate(Path::new("/proj/app/app.js")), None);
    }
}
