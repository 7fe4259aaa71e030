// src/resolver/config.rs

//! Serialized resolver configuration (`resolver.json`)
//!
//! Written by the compat stage and read once per resolver generation.
//! Field names are camelCase on disk.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name inside the working directory
pub const RESOLVER_CONFIG_FILE: &str = "resolver.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    pub app_root: PathBuf,
    pub module_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_module_prefix: Option<String>,
    pub resolvable_extensions: Vec<String>,
    /// The app engine first, then nested engines
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub exclude_legacy_addons: Vec<String>,
    /// Refer to excluded addons by absolute rewritten path
    #[serde(default)]
    pub make_absolute_path_to_rw_packages: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub package_name: String,
    pub root: PathBuf,
    /// In discovery order
    pub active_addons: Vec<ActiveAddon>,
    #[serde(default)]
    pub is_lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAddon {
    pub name: String,
    pub root: PathBuf,
    /// Resolve this addon's imports as if made from this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_resolve_from_file: Option<PathBuf>,
}

impl ResolverConfig {
    /// Read and parse `path`; any failure is a [`Error::ConfigLoad`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::config_load(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| Error::config_load(path, e))?;
        if config.engines.is_empty() {
            return Err(Error::config_load(path, "no engines configured"));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// The engine rooted at the app
    pub fn app_engine(&self) -> Option<&EngineConfig> {
        self.engines
            .iter()
            .find(|e| e.root == self.app_root)
            .or_else(|| self.engines.first())
    }

    pub fn is_app_engine(&self, engine: &EngineConfig) -> bool {
        engine.root == self.app_root
    }

    /// Engine whose root is the longest prefix of `file`, else the app engine
    ///
    /// Purely lexical, so it works for identities that do not exist.
    pub fn engine_for_file(&self, file: &Path) -> Option<&EngineConfig> {
        self.engines
            .iter()
            .filter(|e| file.starts_with(&e.root))
            .max_by_key(|e| e.root.components().count())
            .or_else(|| self.app_engine())
    }

    /// The engine a package belongs to, by engine root or active addon root
    pub fn owning_engine(&self, pkg_root: &Path) -> Result<&EngineConfig> {
        self.engines
            .iter()
            .find(|e| e.root == pkg_root)
            .or_else(|| {
                self.engines
                    .iter()
                    .find(|e| e.active_addons.iter().any(|a| a.root == pkg_root))
            })
            .ok_or_else(|| Error::NoOwningEngine {
                root: pkg_root.to_path_buf(),
            })
    }

    /// Module prefix used for an engine's runtime names
    pub fn prefix_of<'a>(&'a self, engine: &'a EngineConfig) -> &'a str {
        if self.is_app_engine(engine) {
            &self.module_prefix
        } else {
            &engine.package_name
        }
    }

    /// First active addon across engines rooted at `root`
    pub fn active_addon(&self, root: &Path) -> Option<&ActiveAddon> {
        self.engines
            .iter()
            .flat_map(|e| e.active_addons.iter())
            .find(|a| a.root == root)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_legacy_addons.iter().any(|n| n == name)
    }
}
