// src/sync.rs

//! Incremental tree sync
//!
//! Mirrors the merged output tree onto disk at the rewritten packages
//! directory. The first sync writes every file and clears anything stale
//! left by an earlier process. Later syncs only run when the build reports
//! the merged tree changed, and then only touch files whose content hash
//! differs from what was last written.
//!
//! A sync that wrote or removed anything invalidates the rewritten package
//! index cache so the next resolver lookup sees the new mapping; a sync that
//! changed nothing leaves the cache alone.

use crate::error::Result;
use crate::index::RewrittenPackageCache;
use crate::tree::OutputTree;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What a sync did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl SyncReport {
    /// Whether the on-disk tree was modified
    pub fn touched(&self) -> bool {
        self.written > 0 || self.removed > 0
    }
}

#[derive(Debug)]
pub struct TreeSync {
    dest: PathBuf,
    /// Resolvable link pointing at `dest`
    link: Option<PathBuf>,
    cache: Option<Arc<RewrittenPackageCache>>,
    /// Content hash of every file as last written, by relative path
    written: HashMap<PathBuf, String>,
    synced_once: bool,
    /// A sync started and has not finished successfully
    pending: bool,
}

impl TreeSync {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            link: None,
            cache: None,
            written: HashMap::new(),
            synced_once: false,
            pending: false,
        }
    }

    /// Keep a symlink at `link` pointing at the destination
    pub fn with_link(mut self, link: impl Into<PathBuf>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Invalidate `cache` after every sync that touched the disk
    pub fn with_cache(mut self, cache: Arc<RewrittenPackageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[inline]
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Whether the last sync failed before finishing
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Commit `tree` to disk
    ///
    /// `changed` is the build's single changed signal for the merged tree.
    /// It is ignored on the first call, which always syncs, and after a
    /// failed sync, which the next call resumes.
    pub fn sync(&mut self, tree: &OutputTree, changed: bool) -> Result<SyncReport> {
        if self.synced_once && !changed && !self.pending {
            debug!("Merged tree unchanged, skipping sync to {:?}", self.dest);
            return Ok(SyncReport {
                unchanged: tree.len(),
                ..SyncReport::default()
            });
        }

        let resumed = self.pending;
        if resumed {
            debug!("Resuming interrupted sync to {:?}", self.dest);
        }
        self.pending = true;
        fs::create_dir_all(&self.dest)?;
        let mut report = SyncReport::default();

        for (rel, file) in tree.files() {
            if self.synced_once && self.written.get(rel).map(String::as_str) == Some(file.hash()) {
                report.unchanged += 1;
                continue;
            }
            write_atomic(&self.dest.join(rel), file.content())?;
            self.written.insert(rel.to_path_buf(), file.hash().to_string());
            report.written += 1;
        }

        let stale: Vec<PathBuf> = if self.synced_once {
            self.written
                .keys()
                .filter(|rel| !tree.contains(rel))
                .cloned()
                .collect()
        } else {
            self.on_disk()?
                .into_iter()
                .filter(|rel| !tree.contains(rel))
                .collect()
        };
        for rel in stale {
            let path = self.dest.join(&rel);
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.written.remove(&rel);
            self.prune_empty_parents(&path);
        }

        self.synced_once = true;
        self.ensure_link()?;
        self.pending = false;

        // An interrupted attempt may have written files without invalidating
        if report.touched() || resumed {
            if let Some(cache) = &self.cache {
                cache.invalidate_index();
            }
        }
        info!(
            "Synced {:?}: {} written, {} removed, {} unchanged",
            self.dest, report.written, report.removed, report.unchanged
        );
        Ok(report)
    }

    /// Relative paths of every file currently under the destination
    fn on_disk(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dest).min_depth(1) {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.dest) {
                files.push(rel.to_path_buf());
            }
        }
        Ok(files)
    }

    fn prune_empty_parents(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(d) = dir {
            if d == self.dest || !d.starts_with(&self.dest) {
                break;
            }
            // Fails on non-empty dirs, which ends the walk
            if fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    fn ensure_link(&self) -> Result<()> {
        let Some(link) = &self.link else {
            return Ok(());
        };
        match fs::read_link(link) {
            Ok(target) if target == self.dest => return Ok(()),
            Ok(_) => fs::remove_file(link)?,
            Err(_) if link.exists() => {
                warn!("{:?} exists and is not a symlink, leaving it in place", link);
                return Ok(());
            }
            Err(_) => {}
        }
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        make_symlink(&self.dest, link)?;
        debug!("Linked {:?} -> {:?}", link, self.dest);
        Ok(())
    }
}

/// Write to a temp sibling, then rename over the target
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".sync-tmp");
    let temp_path = path.with_file_name(temp_name);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    warn!("Symlinks unsupported here, not linking {:?} -> {:?}", link, target);
    Ok(())
}
