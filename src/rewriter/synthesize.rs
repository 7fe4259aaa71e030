// src/rewriter/synthesize.rs

//! Shared styles and vendor packages
//!
//! Addons can declare implicit stylesheets and scripts that the app must
//! include without importing them. After every addon has been rewritten,
//! those contributions are gathered from the *rewritten* trees (the lists
//! may point at generated files) into two synthesized packages.

use crate::error::{Error, Result};
use crate::package::{ADDON_KEYWORD, ImplicitKind, MANIFEST_FILE, PackageJson, STANDARDIZED_VERSION};
use crate::tree::OutputTree;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Package name of the shared styles package
pub const SYNTHESIZED_STYLES: &str = "@embroider/synthesized-styles";

/// Package name of the shared vendor package
pub const SYNTHESIZED_VENDOR: &str = "@embroider/synthesized-vendor";

/// Kinds gathered into the styles package
pub const STYLE_KINDS: &[ImplicitKind] = &[ImplicitKind::Styles, ImplicitKind::TestStyles];

/// Kinds gathered into the vendor package
pub const SCRIPT_KINDS: &[ImplicitKind] = &[ImplicitKind::Scripts, ImplicitKind::TestScripts];

/// One rewritten addon as seen by synthesis
pub struct Interior<'a> {
    pub new_name: &'a str,
    pub tree: &'a OutputTree,
}

/// Build a synthesized package named `name` from `kinds` of every interior
///
/// Contributions are copied to `<new name>/<path>` and listed, in discovery
/// order, in the synthesized package's own metadata.
pub fn synthesize_package(name: &str, kinds: &[ImplicitKind], interiors: &[Interior<'_>]) -> Result<OutputTree> {
    let mut tree = OutputTree::new();
    let mut lists: Vec<(ImplicitKind, Vec<Value>)> = kinds.iter().map(|k| (*k, Vec::new())).collect();

    for interior in interiors {
        let Some(manifest) = read_manifest(interior)? else {
            continue;
        };
        let Some(meta) = manifest.addon else {
            continue;
        };
        for (kind, listed) in lists.iter_mut() {
            for declared in meta.implicit(*kind) {
                let rel = relative(declared);
                let file = interior.tree.get(&rel).ok_or_else(|| Error::ImplicitNotFound {
                    addon: interior.new_name.to_string(),
                    path: rel.clone(),
                })?;
                let target = Path::new(interior.new_name).join(&rel);
                // Styles and test styles may list the same file
                if !tree.contains(&target) {
                    tree.add_file(&target, file.content().to_vec())?;
                }
                listed.push(Value::from(format!("./{}", target.to_string_lossy())));
            }
        }
    }

    let mut addon = Map::new();
    addon.insert("version".into(), Value::from(STANDARDIZED_VERSION));
    addon.insert("type".into(), Value::from("addon"));
    for (kind, listed) in lists {
        debug!("{}: {} {} entries", name, listed.len(), kind.meta_key());
        addon.insert(kind.meta_key().into(), Value::Array(listed));
    }
    let manifest = json!({
        "name": name,
        "version": "0.0.0",
        "keywords": [ADDON_KEYWORD],
        ADDON_KEYWORD: addon,
    });
    let mut content = serde_json::to_string_pretty(&manifest)?;
    content.push('\n');
    tree.add_file(MANIFEST_FILE, content)?;
    Ok(tree)
}

fn read_manifest(interior: &Interior<'_>) -> Result<Option<PackageJson>> {
    match interior.tree.read(MANIFEST_FILE) {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

/// Package-relative form of a declared path (`./vendor/x.js` -> `vendor/x.js`)
fn relative(declared: &str) -> PathBuf {
    PathBuf::from(declared.trim_start_matches("./"))
}
