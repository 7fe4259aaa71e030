// src/rewriter/mod.rs

//! Package rewriter
//!
//! Produces the merged tree that tree sync commits to the rewritten
//! packages directory:
//!
//! ```text
//! rewritten-packages/
//!   package.json                      resolvable marker package
//!   index.json                        the rewritten package index
//!   foo.1a2b3c4d/...                  one dir per legacy package
//!   @embroider/synthesized-styles/... shared implicit styles
//!   @embroider/synthesized-vendor/... shared implicit scripts
//! ```
//!
//! The work is split into build graph nodes: one [`TransformNode`] per legacy
//! package and a single [`MergeNode`] that depends on all of them, so a
//! change inside one addon only re-runs that addon's transform.

mod synthesize;
mod transform;

pub use synthesize::{
    Interior, SCRIPT_KINDS, STYLE_KINDS, SYNTHESIZED_STYLES, SYNTHESIZED_VENDOR, synthesize_package,
};
pub use transform::{PackageTransform, PassthroughTransform, standardized_manifest};

use crate::dag::{BuildGraph, BuildNode, Computed, NodeId};
use crate::error::{Error, Result};
use crate::index::{INDEX_FILE, RewrittenPackageIndex};
use crate::package::{MANIFEST_FILE, Package};
use crate::tree::OutputTree;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Name of the package the rewritten packages dir presents itself as
pub const REWRITTEN_PACKAGES: &str = "@embroider/rewritten-packages";

/// Runs the transform collaborator for one legacy package
pub struct TransformNode {
    pkg: Arc<Package>,
    transform: Arc<dyn PackageTransform>,
}

impl TransformNode {
    pub fn new(pkg: Arc<Package>, transform: Arc<dyn PackageTransform>) -> Self {
        Self { pkg, transform }
    }
}

impl BuildNode for TransformNode {
    fn label(&self) -> String {
        format!("transform:{}", self.pkg.name())
    }

    fn compute(&mut self, _inputs: &[Arc<OutputTree>]) -> Result<Computed> {
        debug!("Transforming {} at {:?}", self.pkg.name(), self.pkg.root());
        let tree = self.transform.transform(&self.pkg)?;
        Ok(Computed {
            tree: Arc::new(tree),
            watches: vec![self.pkg.root().to_path_buf()],
        })
    }
}

/// Places every interior tree under its new name and adds the synthesized
/// packages and the serialized index
pub struct MergeNode {
    index: RewrittenPackageIndex,
    /// New name of each input, in input order
    new_names: Vec<String>,
}

impl MergeNode {
    pub fn new(index: RewrittenPackageIndex, new_names: Vec<String>) -> Self {
        Self { index, new_names }
    }
}

impl BuildNode for MergeNode {
    fn label(&self) -> String {
        "merge-rewritten-packages".to_string()
    }

    fn compute(&mut self, inputs: &[Arc<OutputTree>]) -> Result<Computed> {
        if inputs.len() != self.new_names.len() {
            return Err(Error::Transform {
                package: self.label(),
                reason: format!("expected {} inputs, got {}", self.new_names.len(), inputs.len()),
            });
        }
        let interiors: Vec<Interior<'_>> = self
            .new_names
            .iter()
            .zip(inputs)
            .map(|(new_name, tree)| Interior {
                new_name,
                tree: tree.as_ref(),
            })
            .collect();
        let tree = merge_rewritten(&self.index, &interiors)?;
        Ok(Computed {
            tree: Arc::new(tree),
            watches: Vec::new(),
        })
    }
}

/// Assemble the merged output tree
///
/// The synthesized packages are computed from the already-rewritten
/// interiors, never from the original packages.
pub fn merge_rewritten(index: &RewrittenPackageIndex, interiors: &[Interior<'_>]) -> Result<OutputTree> {
    let mut merged = OutputTree::new();
    for interior in interiors {
        merged.graft(interior.new_name, interior.tree)?;
    }

    let styles = synthesize_package(SYNTHESIZED_STYLES, STYLE_KINDS, interiors)?;
    merged.graft(SYNTHESIZED_STYLES, &styles)?;
    let vendor = synthesize_package(SYNTHESIZED_VENDOR, SCRIPT_KINDS, interiors)?;
    merged.graft(SYNTHESIZED_VENDOR, &vendor)?;

    merged.add_file(INDEX_FILE, index.to_json()?)?;

    let marker = json!({
        "name": REWRITTEN_PACKAGES,
        "main": "moved-package-target.js",
    });
    let mut marker = serde_json::to_string_pretty(&marker)?;
    marker.push('\n');
    merged.add_file(MANIFEST_FILE, marker)?;

    debug!("Merged {} rewritten packages ({} files)", interiors.len(), merged.len());
    Ok(merged)
}

/// Wire the rewrite into `graph`; returns the merge node
pub fn add_rewrite_nodes(
    graph: &mut BuildGraph,
    index: &RewrittenPackageIndex,
    legacy: &[Arc<Package>],
    transform: Arc<dyn PackageTransform>,
) -> Result<NodeId> {
    let mut inputs = Vec::with_capacity(legacy.len());
    let mut new_names = Vec::with_capacity(legacy.len());
    for pkg in legacy {
        let new_name = index
            .new_name_of(pkg.root())
            .ok_or_else(|| Error::Transform {
                package: pkg.name().to_string(),
                reason: "package is missing from the index".to_string(),
            })?
            .to_string();
        let id = graph.add_node(
            Box::new(TransformNode::new(Arc::clone(pkg), Arc::clone(&transform))),
            &[],
        )?;
        inputs.push(id);
        new_names.push(new_name);
    }
    graph.add_node(Box::new(MergeNode::new(index.clone(), new_names)), &inputs)
}
