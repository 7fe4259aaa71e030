// src/package/registry.rs

//! Per-app package registry
//!
//! Packages are loaded lazily from disk and cached by canonical root. One
//! registry exists per app root (see [`crate::app::AppRegistry`]); tests
//! build independent ones. Loading the same root twice, even from racing
//! threads, yields the same `Arc<Package>`.

use super::{MANIFEST_FILE, Package};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct PackageRegistry {
    app_root: PathBuf,
    packages: RwLock<HashMap<PathBuf, Arc<Package>>>,
    /// Resolved dependency roots per package root
    dependencies: RwLock<HashMap<PathBuf, Arc<[PathBuf]>>>,
    /// Owning package root per directory (None = no owner)
    owners: RwLock<HashMap<PathBuf, Option<PathBuf>>>,
    /// Nesting lookups: (from dir, package name) -> root
    nested: RwLock<HashMap<(PathBuf, String), Option<PathBuf>>>,
}

impl PackageRegistry {
    /// Create a registry for the app rooted at `app_root`
    pub fn new(app_root: impl AsRef<Path>) -> Result<Self> {
        let app_root = canonical(app_root.as_ref())?;
        Ok(Self {
            app_root,
            packages: RwLock::new(HashMap::new()),
            dependencies: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            nested: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// The app package itself
    pub fn app(&self) -> Result<Arc<Package>> {
        let root = self.app_root.clone();
        self.get(&root)
    }

    /// Get (loading on first use) the package rooted at `root`
    pub fn get(&self, root: impl AsRef<Path>) -> Result<Arc<Package>> {
        let root = canonical(root.as_ref())?;
        if let Some(pkg) = self.packages.read().get(&root) {
            return Ok(Arc::clone(pkg));
        }

        let loaded = Arc::new(Package::load(&root, root == self.app_root)?);
        let mut packages = self.packages.write();
        // Another thread may have won the race; keep its instance
        let pkg = packages.entry(root).or_insert(loaded);
        Ok(Arc::clone(pkg))
    }

    /// Forget the cached package at `root` so the next lookup rereads its
    /// `package.json`
    ///
    /// Holders of the old `Arc<Package>` keep the old metadata.
    pub fn invalidate(&self, root: &Path) -> bool {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let removed = self.packages.write().remove(&root).is_some();
        self.dependencies.write().remove(&root);
        if removed {
            debug!("Invalidated cached package at {:?}", root);
        }
        removed
    }

    /// Forget every cached package rooted under `dir`
    pub fn invalidate_under(&self, dir: &Path) -> usize {
        let mut packages = self.packages.write();
        let before = packages.len();
        packages.retain(|root, _| !root.starts_with(dir));
        self.dependencies.write().retain(|root, _| !root.starts_with(dir));
        let removed = before - packages.len();
        if removed > 0 {
            debug!("Invalidated {} cached packages under {:?}", removed, dir);
        }
        removed
    }

    /// Direct dependencies of `pkg`, in declaration order, in-repo addons last
    ///
    /// Declared dependencies that cannot be found on disk are skipped.
    pub fn dependencies(&self, pkg: &Package) -> Result<Vec<Arc<Package>>> {
        let roots = self.dependency_roots(pkg)?;
        roots.iter().map(|root| self.get(root)).collect()
    }

    fn dependency_roots(&self, pkg: &Package) -> Result<Arc<[PathBuf]>> {
        if let Some(roots) = self.dependencies.read().get(pkg.root()) {
            return Ok(Arc::clone(roots));
        }

        let mut roots: Vec<PathBuf> = Vec::new();
        for name in pkg.dependency_names() {
            match locate_by_nesting(pkg.root(), name) {
                Some(found) => {
                    let found = canonical(&found)?;
                    if !roots.contains(&found) {
                        roots.push(found);
                    }
                }
                None => debug!("Dependency {} of {} not found on disk", name, pkg.name()),
            }
        }
        for root in self.in_repo_roots(pkg)? {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        let roots: Arc<[PathBuf]> = roots.into();
        self.dependencies
            .write()
            .insert(pkg.root().to_path_buf(), Arc::clone(&roots));
        Ok(roots)
    }

    fn in_repo_roots(&self, pkg: &Package) -> Result<Vec<PathBuf>> {
        let mut roots = Vec::new();
        for rel in pkg.in_repo_paths() {
            let dir = pkg.root().join(rel);
            if !dir.join(MANIFEST_FILE).is_file() {
                debug!("In-repo addon path {} of {} has no {}", rel, pkg.name(), MANIFEST_FILE);
                continue;
            }
            roots.push(canonical(&dir)?);
        }
        Ok(roots)
    }

    /// Dependencies that directory nesting cannot reach, keyed by name
    ///
    /// Returns `None` when the package declares no in-repo addons.
    pub fn non_resolvable_deps(&self, pkg: &Package) -> Result<Option<BTreeMap<String, Arc<Package>>>> {
        let roots = self.in_repo_roots(pkg)?;
        if roots.is_empty() {
            return Ok(None);
        }
        let mut deps = BTreeMap::new();
        for root in roots {
            let dep = self.get(&root)?;
            deps.insert(dep.name().to_string(), dep);
        }
        Ok(Some(deps))
    }

    /// The package whose root is the nearest ancestor of `path`
    ///
    /// `path` need not exist; virtual identities are owned by the package
    /// containing them.
    pub fn owner_of_file(&self, path: &Path) -> Result<Option<Arc<Package>>> {
        let start = path.parent().unwrap_or(path);
        if let Some(cached) = self.owners.read().get(start) {
            return match cached {
                Some(root) => self.get(root).map(Some),
                None => Ok(None),
            };
        }

        let owner_root = start
            .ancestors()
            .find(|dir| dir.join(MANIFEST_FILE).is_file())
            .map(Path::to_path_buf);
        self.owners
            .write()
            .insert(start.to_path_buf(), owner_root.clone());

        match owner_root {
            Some(root) => self.get(&root).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`owner_of_file`](Self::owner_of_file) but a missing owner is fatal
    pub fn require_owner(&self, path: &Path) -> Result<Arc<Package>> {
        self.owner_of_file(path)?.ok_or_else(|| Error::OwnerLookup {
            path: path.to_path_buf(),
        })
    }

    /// The package named `name` as seen from `from_dir` by directory nesting
    pub fn resolve_dependency(&self, from_dir: &Path, name: &str) -> Result<Option<Arc<Package>>> {
        let key = (from_dir.to_path_buf(), name.to_string());
        let cached = self.nested.read().get(&key).cloned();
        let root = match cached {
            Some(root) => root,
            None => {
                let root = locate_by_nesting(from_dir, name).map(|r| canonical(&r)).transpose()?;
                self.nested.write().insert(key, root.clone());
                root
            }
        };
        root.map(|r| self.get(r)).transpose()
    }
}

/// Find `name` by probing `<dir>/node_modules/<name>` upward from `from`
pub(crate) fn locate_by_nesting(from: &Path, name: &str) -> Option<PathBuf> {
    from.ancestors()
        .map(|dir| dir.join("node_modules").join(name))
        .find(|candidate| candidate.join(MANIFEST_FILE).is_file())
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|e| Error::invalid_package(path, e))
}
