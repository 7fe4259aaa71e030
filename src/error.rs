// src/error.rs

//! Crate-wide error type
//!
//! A request that nothing can resolve is not an error: it comes back as
//! [`crate::resolver::Resolution::NotFound`]. The variants here are the
//! structural failures that stop a build or a resolver from being created.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file has no discoverable owning package where one is required
    #[error("Failed to find a valid owner for {}", path.display())]
    OwnerLookup { path: PathBuf },

    /// resolver.json or index.json is missing or malformed
    #[error("Failed to load {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("Failed to parse settings {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    #[error("No engine owns package at {}", root.display())]
    NoOwningEngine { root: PathBuf },

    #[error("Invalid package at {}: {reason}", root.display())]
    InvalidPackage { root: PathBuf, reason: String },

    #[error("Not a recognized virtual module: {id}")]
    VirtualNotFound { id: String },

    #[error("Addon {addon} declares implicit file {} which does not exist", path.display())]
    ImplicitNotFound { addon: String, path: PathBuf },

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid output tree path: {0}")]
    InvalidTreePath(String),

    #[error("Two stages wrote {}", path.display())]
    TreeConflict { path: PathBuf },

    #[error("Build graph cycle: {0}")]
    Cycle(String),

    #[error("Transform of {package} failed: {reason}")]
    Transform { package: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_package(root: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidPackage {
            root: root.into(),
            reason: reason.to_string(),
        }
    }
}
