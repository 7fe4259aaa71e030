// src/tree.rs

//! In-memory output tree
//!
//! Holds the files a build stage produces, keyed by normalized relative
//! path. Iteration is sorted, which keeps fingerprints and serialized output
//! deterministic. Trees are merged by grafting one under a prefix of
//! another; two stages writing the same path is a conflict.

use crate::error::{Error, Result};
use crate::hash::{Fingerprint, xxh128};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A file in an output tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    content: Arc<[u8]>,
    /// XXH128 of the content
    hash: String,
}

impl TreeFile {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let content: Vec<u8> = content.into();
        let hash = xxh128(&content);
        Self {
            content: content.into(),
            hash,
        }
    }

    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[inline]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTree {
    files: BTreeMap<PathBuf, TreeFile>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = normalize(path.as_ref())?;
        self.files.insert(path, TreeFile::new(content));
        Ok(())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&TreeFile> {
        let path = normalize(path.as_ref()).ok()?;
        self.files.get(&path)
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.get(path).map(TreeFile::content)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in sorted path order
    pub fn files(&self) -> impl Iterator<Item = (&Path, &TreeFile)> {
        self.files.iter().map(|(p, f)| (p.as_path(), f))
    }

    /// Copy every file of `other` under `prefix`
    pub fn graft(&mut self, prefix: impl AsRef<Path>, other: &OutputTree) -> Result<()> {
        let prefix = if prefix.as_ref().as_os_str().is_empty() {
            PathBuf::new()
        } else {
            normalize(prefix.as_ref())?
        };
        for (path, file) in &other.files {
            let target = prefix.join(path);
            if self.files.contains_key(&target) {
                return Err(Error::TreeConflict { path: target });
            }
            self.files.insert(target, file.clone());
        }
        Ok(())
    }

    /// Fingerprint over every path and content hash
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        for (path, file) in &self.files {
            fp.update(path.to_string_lossy().as_bytes());
            fp.update(file.hash.as_bytes());
        }
        fp.finish()
    }
}

/// Reduce a path to plain relative components
fn normalize(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(Error::InvalidTreePath(path.display().to_string()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidTreePath(path.display().to_string()));
    }
    Ok(normalized)
}
