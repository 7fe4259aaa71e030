// src/settings.rs

//! Build settings from `compat.toml`
//!
//! ```toml
//! module_prefix = "my-app"
//! resolvable_extensions = [".js", ".ts", ".hbs"]
//! exclude_legacy_addons = ["ember-fetch"]
//! absolute_paths_for_excluded = true
//! working_dir = "node_modules/.embroider"
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file name, looked up in the app root
pub const SETTINGS_FILE: &str = "compat.toml";

/// Default working directory, relative to the app root
pub const DEFAULT_WORKING_DIR: &str = "node_modules/.embroider";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatSettings {
    /// Runtime module prefix; the app's package name when unset
    pub module_prefix: Option<String>,

    /// Extensions tried when resolving extensionless specifiers
    pub resolvable_extensions: Vec<String>,

    /// Legacy addons left outside the module graph
    pub exclude_legacy_addons: Vec<String>,

    /// Refer to excluded addons by absolute rewritten path instead of name
    pub absolute_paths_for_excluded: bool,

    /// Working directory override, relative to the app root
    pub working_dir: Option<PathBuf>,
}

impl Default for CompatSettings {
    fn default() -> Self {
        Self {
            module_prefix: None,
            resolvable_extensions: default_extensions(),
            exclude_legacy_addons: Vec::new(),
            absolute_paths_for_excluded: false,
            working_dir: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".mjs", ".gjs", ".js", ".mts", ".gts", ".ts", ".hbs", ".json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CompatSettings {
    /// Load `compat.toml` from `app_root`, or defaults if absent
    pub fn load(app_root: &Path) -> Result<Self> {
        let path = app_root.join(SETTINGS_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loading settings from {:?}", path);
                Self::parse(&content).map_err(|reason| Error::Settings { path, reason })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Absolute working directory for `app_root`
    pub fn working_dir(&self, app_root: &Path) -> PathBuf {
        app_root.join(self.working_dir.as_deref().unwrap_or(Path::new(DEFAULT_WORKING_DIR)))
    }
}
