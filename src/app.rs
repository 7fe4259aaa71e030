// src/app.rs

//! Per-app-root state
//!
//! An [`AppRegistry`] is created once by the host and threaded through;
//! there is no process-wide singleton. Registering a root that is already
//! known returns the existing [`AppContext`], so every caller in a process
//! shares one package registry, one index cache and one resolver loader per
//! app.

use crate::error::{Error, Result};
use crate::index::RewrittenPackageCache;
use crate::package::PackageRegistry;
use crate::resolver::{RESOLVER_CONFIG_FILE, ResolverLoader};
use crate::settings::CompatSettings;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Rewritten packages directory, inside the working dir
pub const REWRITTEN_DIR: &str = "rewritten-packages";

/// Everything one app root needs
pub struct AppContext {
    root: PathBuf,
    settings: CompatSettings,
    working_dir: PathBuf,
    packages: Arc<PackageRegistry>,
    rewritten: Arc<RewrittenPackageCache>,
    loader: Arc<ResolverLoader>,
}

impl AppContext {
    fn new(root: PathBuf, settings: CompatSettings) -> Result<Self> {
        let working_dir = settings.working_dir(&root);
        let packages = Arc::new(PackageRegistry::new(&root)?);
        let rewritten = Arc::new(RewrittenPackageCache::new(&root, working_dir.join(REWRITTEN_DIR)));
        let loader = Arc::new(ResolverLoader::new(
            &working_dir,
            Arc::clone(&packages),
            Arc::clone(&rewritten),
        ));
        Ok(Self {
            root,
            settings,
            working_dir,
            packages,
            rewritten,
            loader,
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn settings(&self) -> &CompatSettings {
        &self.settings
    }

    #[inline]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn rewritten_dir(&self) -> PathBuf {
        self.working_dir.join(REWRITTEN_DIR)
    }

    /// Where the rewritten packages dir is linked so `node_modules` nesting
    /// finds it as `@embroider/rewritten-packages`
    pub fn resolvable_link(&self) -> PathBuf {
        self.working_dir
            .parent()
            .unwrap_or(&self.root)
            .join("@embroider")
            .join("rewritten-packages")
    }

    pub fn resolver_config_file(&self) -> PathBuf {
        self.working_dir.join(RESOLVER_CONFIG_FILE)
    }

    pub fn packages(&self) -> &Arc<PackageRegistry> {
        &self.packages
    }

    pub fn rewritten(&self) -> &Arc<RewrittenPackageCache> {
        &self.rewritten
    }

    pub fn loader(&self) -> &Arc<ResolverLoader> {
        &self.loader
    }
}

#[derive(Default)]
pub struct AppRegistry {
    apps: RwLock<HashMap<PathBuf, Arc<AppContext>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `root`, created with the settings found in it
    pub fn register(&self, root: impl AsRef<Path>) -> Result<Arc<AppContext>> {
        let root = canonical_root(root.as_ref())?;
        if let Some(ctx) = self.apps.read().get(&root) {
            return Ok(Arc::clone(ctx));
        }
        let settings = CompatSettings::load(&root)?;
        self.insert(root, settings)
    }

    fn insert(&self, root: PathBuf, settings: CompatSettings) -> Result<Arc<AppContext>> {
        let mut apps = self.apps.write();
        if let Some(ctx) = apps.get(&root) {
            return Ok(Arc::clone(ctx));
        }
        let ctx = Arc::new(AppContext::new(root.clone(), settings)?);
        debug!("Registered app at {:?}", root);
        apps.insert(root, Arc::clone(&ctx));
        Ok(ctx)
    }

    pub fn get(&self, root: &Path) -> Option<Arc<AppContext>> {
        let root = fs::canonicalize(root).ok()?;
        self.apps.read().get(&root).cloned()
    }

    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    fs::canonicalize(root).map_err(|e| Error::invalid_package(root, e))
}
