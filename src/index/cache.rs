// src/index/cache.rs

//! Generation cache for the committed index
//!
//! The index is loaded lazily and shared as an `Arc`. A tree sync that
//! changed the output calls [`RewrittenPackageCache::invalidate_index`];
//! the next reader loads a fresh generation. Readers holding the previous
//! `Arc` keep a complete, consistent old view until they drop it.

use super::{INDEX_FILE, RewrittenIndexView, RewrittenPackageIndex};
use crate::error::Result;
use crate::package::{MovedPackage, Package, PackageRegistry};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct RewrittenPackageCache {
    app_root: PathBuf,
    rewritten_dir: PathBuf,
    current: RwLock<Option<Arc<RewrittenIndexView>>>,
    invalidations: AtomicU64,
}

impl RewrittenPackageCache {
    pub fn new(app_root: impl Into<PathBuf>, rewritten_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            rewritten_dir: rewritten_dir.into(),
            current: RwLock::new(None),
            invalidations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn rewritten_dir(&self) -> &Path {
        &self.rewritten_dir
    }

    pub fn index_file(&self) -> PathBuf {
        self.rewritten_dir.join(INDEX_FILE)
    }

    /// The current generation, loading it if none is cached
    pub fn view(&self) -> Result<Arc<RewrittenIndexView>> {
        if let Some(view) = self.current.read().as_ref() {
            return Ok(Arc::clone(view));
        }

        let mut current = self.current.write();
        if let Some(view) = current.as_ref() {
            return Ok(Arc::clone(view));
        }
        let index = RewrittenPackageIndex::load(&self.index_file())?;
        debug!(
            "Loaded rewritten package index ({} packages) from {:?}",
            index.packages.len(),
            self.index_file()
        );
        let view = Arc::new(RewrittenIndexView::new(
            index,
            self.app_root.clone(),
            self.rewritten_dir.clone(),
        ));
        *current = Some(Arc::clone(&view));
        Ok(view)
    }

    /// Drop the cached generation; the next [`view`](Self::view) reloads
    pub fn invalidate_index(&self) {
        *self.current.write() = None;
        let n = self.invalidations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Invalidated rewritten package index (invalidation #{})", n);
    }

    /// How many times the index has been invalidated
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// The moved view of `pkg`, if the rewrite moved it
    pub fn maybe_moved(&self, pkg: &Arc<Package>) -> Result<Option<MovedPackage>> {
        let view = self.view()?;
        let Some(new_name) = view.moved_name(pkg.root()) else {
            return Ok(None);
        };
        let extra = view
            .index()
            .extra_resolutions
            .get(new_name)
            .cloned()
            .unwrap_or_default();
        Ok(Some(MovedPackage::new(
            Arc::clone(pkg),
            new_name,
            view.moved_root(new_name),
            extra,
        )))
    }

    /// The original package behind a moved root
    pub fn original_of(&self, registry: &PackageRegistry, moved_root: &Path) -> Result<Option<Arc<Package>>> {
        let view = self.view()?;
        let original = view
            .split_rewritten(moved_root)
            .filter(|(_, rel)| rel.as_os_str().is_empty())
            .and_then(|(new_name, _)| view.original_root_of(new_name).map(Path::to_path_buf));
        match original {
            Some(root) => registry.get(root).map(Some),
            None => Ok(None),
        }
    }
}
