// src/package/moved.rs

//! View of a package after the rewrite moved it
//!
//! Rather than patching a shared [`Package`] in place, a [`MovedPackage`]
//! wraps the original and answers location questions with the rewritten
//! values. Code that holds the pre-move package keeps seeing the old root.

use super::Package;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MovedPackage {
    original: Arc<Package>,
    new_name: String,
    moved_root: PathBuf,
    extra_roots: Vec<PathBuf>,
}

impl MovedPackage {
    pub fn new(
        original: Arc<Package>,
        new_name: impl Into<String>,
        moved_root: PathBuf,
        extra_roots: Vec<PathBuf>,
    ) -> Self {
        Self {
            original,
            new_name: new_name.into(),
            moved_root,
            extra_roots,
        }
    }

    /// Declared name, unchanged by the move
    pub fn name(&self) -> &str {
        self.original.name()
    }

    /// Directory name under the rewritten packages dir
    pub fn new_name(&self) -> &str {
        &self.new_name
    }

    /// Root after the move
    pub fn root(&self) -> &Path {
        &self.moved_root
    }

    pub fn original_root(&self) -> &Path {
        self.original.root()
    }

    pub fn original(&self) -> &Arc<Package> {
        &self.original
    }

    /// Roots resolvable from this package beyond directory nesting
    pub fn extra_resolutions(&self) -> &[PathBuf] {
        &self.extra_roots
    }

    /// Translate a file under the original root to its moved location
    pub fn relocate(&self, file: &Path) -> Option<PathBuf> {
        file.strip_prefix(self.original.root())
            .ok()
            .map(|rel| self.moved_root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageJson;

    #[test]
    fn test_relocate() {
        let pkg = Arc::new(Package::from_manifest(
            PathBuf::from("/proj/node_modules/foo"),
            PackageJson::default(),
            false,
        ));
        let moved = MovedPackage::new(
            Arc::clone(&pkg),
            "foo.12345678",
            PathBuf::from("/proj/node_modules/.embroider/rewritten-packages/foo.12345678"),
            Vec::new(),
        );
        assert_eq!(moved.name(), "foo");
        assert_eq!(
            moved.relocate(Path::new("/proj/node_modules/foo/index.js")).unwrap(),
            PathBuf::from("/proj/node_modules/.embroider/rewritten-packages/foo.12345678/index.js")
        );
        assert!(moved.relocate(Path::new("/proj/app/app.js")).is_none());
        // The wrapped package is untouched
        assert_eq!(pkg.root(), Path::new("/proj/node_modules/foo"));
    }
}
