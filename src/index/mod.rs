// src/index/mod.rs

//! Rewritten package index
//!
//! Every legacy package gets a new name, `<declared name>.<sha1(root)[..8]>`,
//! derived from where the package lives rather than what it is called, so two
//! on-disk copies that share a name never collide. The index records:
//!
//! - `packages`: original root -> new name (plus the app under its own,
//!   unhashed name)
//! - `extraResolutions`: identity -> roots resolvable from it that directory
//!   nesting cannot find
//!
//! The app's extra roots are stored twice, under its name and under its
//! original root: later stages hold the app both before and after the move
//! and both must find the same roots.

mod cache;
mod view;

pub use cache::RewrittenPackageCache;
pub use view::{IndexOwner, RewrittenIndexView};

use crate::error::{Error, Result};
use crate::hash::path_hash;
use crate::package::{Package, PackageRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File name of the serialized index inside the rewritten packages dir
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewrittenPackageIndex {
    /// Original absolute root -> new package name
    #[serde(default)]
    pub packages: BTreeMap<PathBuf, String>,

    /// Identity (new name, or the app's original root) -> extra roots
    #[serde(default)]
    pub extra_resolutions: BTreeMap<String, Vec<PathBuf>>,
}

impl RewrittenPackageIndex {
    /// Pretty JSON with sorted keys; identical input gives identical bytes
    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn from_json(path: &Path, content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::config_load(path, e))
    }

    /// Read a committed index; missing or malformed files are fatal
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::config_load(path, e))?;
        Self::from_json(path, &content)
    }

    pub fn new_name_of(&self, original_root: &Path) -> Option<&str> {
        self.packages.get(original_root).map(String::as_str)
    }
}

/// New name for a legacy package
pub fn rewritten_name(pkg: &Package) -> String {
    format!("{}.{}", pkg.name(), path_hash(pkg.root()))
}

/// Assign new names to `legacy` and record extra resolution roots
pub fn build_index(
    registry: &PackageRegistry,
    app: &Package,
    legacy: &[Arc<Package>],
) -> Result<RewrittenPackageIndex> {
    let mut index = RewrittenPackageIndex::default();

    for pkg in legacy {
        let new_name = rewritten_name(pkg);
        debug!("Rewriting {} at {:?} as {}", pkg.name(), pkg.root(), new_name);
        index.packages.insert(pkg.root().to_path_buf(), new_name.clone());
        if let Some(deps) = registry.non_resolvable_deps(pkg)? {
            let roots = deps.values().map(|d| d.root().to_path_buf()).collect();
            index.extra_resolutions.insert(new_name, roots);
        }
    }

    // The app has an entry even though this stage does not move it
    index
        .packages
        .insert(app.root().to_path_buf(), app.name().to_string());

    if let Some(deps) = registry.non_resolvable_deps(app)? {
        let roots: Vec<PathBuf> = deps.values().map(|d| d.root().to_path_buf()).collect();
        index
            .extra_resolutions
            .insert(app.name().to_string(), roots.clone());
        index
            .extra_resolutions
            .insert(app.root().to_string_lossy().into_owned(), roots);
    }

    Ok(index)
}
