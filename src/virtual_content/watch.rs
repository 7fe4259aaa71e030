// src/virtual_content/watch.rs

//! Per-entry invalidation for rendered virtual modules

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Virtual identity -> paths whose change stales it
#[derive(Debug, Default)]
pub struct WatchTable {
    entries: RwLock<BTreeMap<String, Vec<PathBuf>>>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the watches of `id`
    pub fn record(&self, id: impl Into<String>, watches: Vec<PathBuf>) {
        self.entries.write().insert(id.into(), watches);
    }

    pub fn forget(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn watches(&self, id: &str) -> Option<Vec<PathBuf>> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Identities invalidated by a change to `path`
    ///
    /// A watch matches when it is `path` or one of its ancestors. Entries
    /// stay recorded; the host re-renders and records again.
    pub fn on_file_change(&self, path: &Path) -> Vec<String> {
        let entries = self.entries.read();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, watches)| watches.iter().any(|w| path.starts_with(w)))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            debug!("Invalidate {} because {:?}", id, path);
        }
        stale
    }
}
