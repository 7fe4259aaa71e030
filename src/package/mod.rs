// src/package/mod.rs

//! Package graph model
//!
//! A [`Package`] is a read-only view of one on-disk package: its canonical
//! root, its `package.json`, and the flags the rewrite cares about
//! (ecosystem membership, standardized layout). Dependency edges are not
//! stored on the package; [`PackageRegistry`] resolves them by directory
//! nesting so cyclic graphs never form reference cycles.
//!
//! # Metadata
//!
//! ```json
//! {
//!   "name": "my-addon",
//!   "keywords": ["ember-addon"],
//!   "dependencies": { "other-addon": "^1.0.0" },
//!   "ember-addon": {
//!     "version": 2,
//!     "paths": ["lib/in-repo-addon"],
//!     "implicit-scripts": ["./vendor/shim.js"]
//!   }
//! }
//! ```

mod moved;
mod registry;

pub use moved::MovedPackage;
pub use registry::PackageRegistry;
pub(crate) use registry::locate_by_nesting;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Keyword marking a package as part of the addon ecosystem
pub const ADDON_KEYWORD: &str = "ember-addon";

/// Metadata file name at every package root
pub const MANIFEST_FILE: &str = "package.json";

/// Addon format version of standardized packages
pub const STANDARDIZED_VERSION: u32 = 2;

/// The fields of `package.json` this crate reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub main: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default, rename = "ember-addon")]
    pub addon: Option<AddonMeta>,
}

/// The `ember-addon` section of `package.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AddonMeta {
    #[serde(default)]
    pub version: Option<u32>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// In-repo addon directories, relative to the package root
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub implicit_modules: Vec<String>,

    #[serde(default)]
    pub implicit_test_modules: Vec<String>,

    #[serde(default)]
    pub implicit_scripts: Vec<String>,

    #[serde(default)]
    pub implicit_test_scripts: Vec<String>,

    #[serde(default)]
    pub implicit_styles: Vec<String>,

    #[serde(default)]
    pub implicit_test_styles: Vec<String>,
}

/// Kinds of implicit contributions an addon can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplicitKind {
    Modules,
    TestModules,
    Scripts,
    TestScripts,
    Styles,
    TestStyles,
}

impl ImplicitKind {
    /// The `ember-addon` key holding this list
    pub const fn meta_key(&self) -> &'static str {
        match self {
            Self::Modules => "implicit-modules",
            Self::TestModules => "implicit-test-modules",
            Self::Scripts => "implicit-scripts",
            Self::TestScripts => "implicit-test-scripts",
            Self::Styles => "implicit-styles",
            Self::TestStyles => "implicit-test-styles",
        }
    }
}

impl AddonMeta {
    pub fn implicit(&self, kind: ImplicitKind) -> &[String] {
        match kind {
            ImplicitKind::Modules => &self.implicit_modules,
            ImplicitKind::TestModules => &self.implicit_test_modules,
            ImplicitKind::Scripts => &self.implicit_scripts,
            ImplicitKind::TestScripts => &self.implicit_test_scripts,
            ImplicitKind::Styles => &self.implicit_styles,
            ImplicitKind::TestStyles => &self.implicit_test_styles,
        }
    }
}

/// One package on disk
#[derive(Debug)]
pub struct Package {
    root: PathBuf,
    name: String,
    manifest: PackageJson,
    is_app: bool,
}

impl Package {
    /// Load the package rooted at `root`
    ///
    /// `root` must already be canonical; the registry takes care of that.
    pub fn load(root: &Path, is_app: bool) -> Result<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)
            .map_err(|e| Error::invalid_package(root, format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        let manifest: PackageJson = serde_json::from_str(&content)
            .map_err(|e| Error::invalid_package(root, e))?;
        Ok(Self::from_manifest(root.to_path_buf(), manifest, is_app))
    }

    pub fn from_manifest(root: PathBuf, manifest: PackageJson, is_app: bool) -> Self {
        // Unnamed packages fall back to their directory name
        let name = manifest.name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Self {
            root,
            name,
            manifest,
            is_app,
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn manifest(&self) -> &PackageJson {
        &self.manifest
    }

    #[inline]
    pub fn is_app(&self) -> bool {
        self.is_app
    }

    /// Participates in the addon module system
    pub fn is_ecosystem_package(&self) -> bool {
        self.is_app || self.manifest.keywords.iter().any(|k| k == ADDON_KEYWORD)
    }

    /// Already in the standardized (v2) layout
    pub fn is_standardized(&self) -> bool {
        self.manifest
            .addon
            .as_ref()
            .and_then(|meta| meta.version)
            .is_some_and(|v| v >= STANDARDIZED_VERSION)
    }

    /// An ecosystem package that still needs rewriting
    pub fn is_legacy(&self) -> bool {
        self.is_ecosystem_package() && !self.is_standardized() && !self.is_app
    }

    pub fn addon_meta(&self) -> Option<&AddonMeta> {
        self.manifest.addon.as_ref()
    }

    pub fn implicit(&self, kind: ImplicitKind) -> &[String] {
        self.addon_meta().map(|m| m.implicit(kind)).unwrap_or_default()
    }

    /// Names of declared dependencies, in manifest order
    ///
    /// Dev dependencies only count for the app.
    pub fn dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.manifest.dependencies.keys().map(String::as_str).collect();
        if self.is_app {
            for name in self.manifest.dev_dependencies.keys() {
                if !self.manifest.dependencies.contains_key(name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Directories of in-repo addons, unresolved and relative to the root
    pub fn in_repo_paths(&self) -> &[String] {
        self.addon_meta().map(|m| m.paths.as_slice()).unwrap_or_default()
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for Package {}

impl std::hash::Hash for Package {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.root.hash(state);
    }
}
