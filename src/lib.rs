// src/lib.rs

//! Legacy addon rewriting and module resolution
//!
//! Rewrites the legacy addons an app depends on into a standardized on-disk
//! layout, then answers module resolution queries against the result on
//! behalf of host build tools.
//!
//! # Architecture
//!
//! - Packages: lazily loaded `package.json` views, one registry per app root
//! - Walker: depth-first discovery of legacy addons, cycle tolerant
//! - Index: deterministic `name.hash` identities keyed by original root
//! - Rewriter: per-package transforms plus synthesized styles/vendor
//!   packages, scheduled on a typed build graph
//! - Sync: incremental commit of the merged tree, then index invalidation
//! - Resolver: virtual match, alias, fallback; one index generation per query
//! - Virtual content: generated module bodies with per-entry watch sets

pub mod app;
pub mod compat;
pub mod dag;
mod error;
pub mod hash;
pub mod host;
pub mod index;
pub mod package;
pub mod resolver;
pub mod rewriter;
pub mod settings;
pub mod sync;
pub mod tree;
pub mod virtual_content;
pub mod walker;

pub use app::{AppContext, AppRegistry};
pub use compat::{CompatAddons, CompatReport};
pub use error::{Error, Result};
pub use host::{FileChange, Host};
pub use index::{RewrittenPackageCache, RewrittenPackageIndex, build_index};
pub use package::{MovedPackage, Package, PackageRegistry};
pub use resolver::{
    FallbackResolver, FsFallback, ModuleRequest, RequestKind, Resolution, ResolvedModule,
    Resolver, ResolverConfig, ResolverLoader,
};
pub use settings::CompatSettings;
pub use tree::OutputTree;
pub use virtual_content::{VirtualContentResult, render};
pub use walker::find_legacy_packages;
