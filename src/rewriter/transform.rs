// src/rewriter/transform.rs

//! Per-package transform seam
//!
//! Turning one legacy package into its standardized form is a collaborator
//! of the rewrite, not part of it. [`PassthroughTransform`] is the stand-in
//! used by the CLI and tests: it copies the package and marks its metadata
//! as standardized.

use crate::error::{Error, Result};
use crate::package::{ADDON_KEYWORD, MANIFEST_FILE, Package, STANDARDIZED_VERSION};
use crate::tree::OutputTree;
use serde_json::{Map, Value};
use std::fs;
use walkdir::WalkDir;

/// Produces the standardized output tree of one legacy package
pub trait PackageTransform: Send + Sync {
    fn transform(&self, pkg: &Package) -> Result<OutputTree>;
}

impl<F> PackageTransform for F
where
    F: Fn(&Package) -> Result<OutputTree> + Send + Sync,
{
    fn transform(&self, pkg: &Package) -> Result<OutputTree> {
        self(pkg)
    }
}

/// Directories never copied out of a package
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransform;

impl PackageTransform for PassthroughTransform {
    fn transform(&self, pkg: &Package) -> Result<OutputTree> {
        let mut tree = OutputTree::new();
        let walker = WalkDir::new(pkg.root())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && e.file_name().to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n)))
            });

        for entry in walker {
            let entry = entry.map_err(|e| Error::Transform {
                package: pkg.name().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(pkg.root())
                .map_err(|e| Error::Transform {
                    package: pkg.name().to_string(),
                    reason: e.to_string(),
                })?;
            if rel == std::path::Path::new(MANIFEST_FILE) {
                continue;
            }
            tree.add_file(rel, fs::read(entry.path())?)?;
        }

        tree.add_file(MANIFEST_FILE, standardized_manifest(pkg)?)?;
        Ok(tree)
    }
}

/// The package's manifest, marked as a standardized addon
///
/// Unknown fields and the implicit-* lists are preserved.
pub fn standardized_manifest(pkg: &Package) -> Result<String> {
    let raw = fs::read_to_string(pkg.root().join(MANIFEST_FILE))?;
    let mut manifest: Value = serde_json::from_str(&raw)?;
    let Some(obj) = manifest.as_object_mut() else {
        return Err(Error::invalid_package(pkg.root(), "package.json is not an object"));
    };

    let keywords = obj
        .entry("keywords")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(list) = keywords.as_array_mut() {
        if !list.iter().any(|k| *k == ADDON_KEYWORD) {
            list.push(Value::from(ADDON_KEYWORD));
        }
    }

    let addon = obj
        .entry(ADDON_KEYWORD)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(meta) = addon.as_object_mut() {
        meta.insert("version".into(), Value::from(STANDARDIZED_VERSION));
        meta.entry("type").or_insert_with(|| Value::from("addon"));
        // In-repo addons are rewritten on their own
        meta.remove("paths");
    }

    let mut out = serde_json::to_string_pretty(&manifest)?;
    out.push('\n');
    Ok(out)
}
