// src/resolver/loader.rs

//! Lazy resolver generations
//!
//! The loader builds a [`Resolver`] from `resolver.json` on first use and
//! hands out `Arc`s to it. Dropping the cached generation (config file
//! change, shared config update, [`close`](ResolverLoader::close)) is a
//! single pointer swap: callers holding the old `Arc` finish against the
//! old generation, the next caller builds the new one.

use super::{RESOLVER_CONFIG_FILE, Resolver, ResolverConfig};
use crate::error::Result;
use crate::index::RewrittenPackageCache;
use crate::package::PackageRegistry;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

type Generation = Arc<RwLock<Option<Arc<Resolver>>>>;

/// Host-side overrides applied to every generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedConfig {
    /// Replaces the configured excluded addon list when set
    pub exclude_legacy_addons: Option<Vec<String>>,
}

pub struct ResolverLoader {
    config_file: PathBuf,
    packages: Arc<PackageRegistry>,
    rewritten: Arc<RewrittenPackageCache>,
    current: Generation,
    shared: RwLock<SharedConfig>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    loads: AtomicU64,
}

impl ResolverLoader {
    pub fn new(
        working_dir: &Path,
        packages: Arc<PackageRegistry>,
        rewritten: Arc<RewrittenPackageCache>,
    ) -> Self {
        Self {
            config_file: working_dir.join(RESOLVER_CONFIG_FILE),
            packages,
            rewritten,
            current: Arc::new(RwLock::new(None)),
            shared: RwLock::new(SharedConfig::default()),
            watcher: Mutex::new(None),
            loads: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    #[inline]
    pub fn packages(&self) -> &Arc<PackageRegistry> {
        &self.packages
    }

    /// The current generation, building it if none is cached
    pub fn resolver(&self) -> Result<Arc<Resolver>> {
        if let Some(resolver) = self.current.read().as_ref() {
            return Ok(Arc::clone(resolver));
        }

        let mut current = self.current.write();
        if let Some(resolver) = current.as_ref() {
            return Ok(Arc::clone(resolver));
        }
        let mut config = ResolverConfig::load(&self.config_file)?;
        if let Some(excluded) = &self.shared.read().exclude_legacy_addons {
            config.exclude_legacy_addons = excluded.clone();
        }
        let resolver = Arc::new(Resolver::new(
            config,
            Arc::clone(&self.packages),
            Arc::clone(&self.rewritten),
        ));
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Loaded resolver generation {} from {:?}", n, self.config_file);
        *current = Some(Arc::clone(&resolver));
        Ok(resolver)
    }

    /// Number of generations built so far
    pub fn generations(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn shared_config(&self) -> SharedConfig {
        self.shared.read().clone()
    }

    /// Replace the shared overrides; takes effect from the next generation
    pub fn set_shared_config(&self, shared: SharedConfig) {
        *self.shared.write() = shared;
        self.handle_config_change();
    }

    /// Drop the cached generation
    pub fn handle_config_change(&self) {
        drop_generation(&self.current);
    }

    /// Drop the generation whenever the config file changes on disk
    pub fn watch(&self) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let dir = self
            .config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        fs::create_dir_all(&dir)?;

        let current = Arc::clone(&self.current);
        let file_name = self.config_file.file_name().map(|n| n.to_os_string());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                {
                    drop_generation(&current);
                }
            }
            Err(e) => warn!("Resolver config watch error: {}", e),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!("Watching {:?}", self.config_file);
        *slot = Some(watcher);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop watching and drop the cached generation
    pub fn close(&self) {
        if self.watcher.lock().take().is_some() {
            debug!("Stopped watching {:?}", self.config_file);
        }
        self.handle_config_change();
    }
}

fn drop_generation(current: &RwLock<Option<Arc<Resolver>>>) {
    if current.write().take().is_some() {
        debug!("Dropped resolver generation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::resolver::EngineConfig;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ResolverLoader) {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        fs::write(root.join("package.json"), r#"{"name":"app"}"#).unwrap();
        let working = root.join("node_modules/.embroider");
        fs::create_dir_all(&working).unwrap();
        let packages = Arc::new(PackageRegistry::new(&root).unwrap());
        let rewritten = Arc::new(RewrittenPackageCache::new(&root, working.join("rewritten-packages")));
        let loader = ResolverLoader::new(&working, packages, rewritten);
        (temp, loader)
    }

    fn write_config(loader: &ResolverLoader, excluded: &[&str]) {
        let app_root = loader.packages.app_root().to_path_buf();
        let config = ResolverConfig {
            app_root: app_root.clone(),
            module_prefix: "app".into(),
            pod_module_prefix: None,
            resolvable_extensions: vec![".js".into()],
            engines: vec![EngineConfig {
                package_name: "app".into(),
                root: app_root,
                active_addons: Vec::new(),
                is_lazy: false,
            }],
            exclude_legacy_addons: excluded.iter().map(|s| s.to_string()).collect(),
            make_absolute_path_to_rw_packages: false,
        };
        fs::write(loader.config_file(), config.to_json().unwrap()).unwrap();
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let (_temp, loader) = setup();
        assert!(matches!(loader.resolver(), Err(Error::ConfigLoad { .. })));
    }

    #[test]
    fn test_generation_cached_until_change() {
        let (_temp, loader) = setup();
        write_config(&loader, &[]);
        let a = loader.resolver().unwrap();
        let b = loader.resolver().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.generations(), 1);

        write_config(&loader, &["ember-fetch"]);
        // Not watching: the old generation stays until told otherwise
        assert!(loader.resolver().unwrap().config().exclude_legacy_addons.is_empty());
        loader.handle_config_change();
        let c = loader.resolver().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.config().exclude_legacy_addons, vec!["ember-fetch"]);
        // The old generation is still complete for whoever holds it
        assert!(a.config().exclude_legacy_addons.is_empty());
    }

    #[test]
    fn test_shared_config_overrides_excluded() {
        let (_temp, loader) = setup();
        write_config(&loader, &["from-file"]);
        loader.set_shared_config(SharedConfig {
            exclude_legacy_addons: Some(vec!["from-host".into()]),
        });
        assert_eq!(
            loader.resolver().unwrap().config().exclude_legacy_addons,
            vec!["from-host"]
        );
    }

    #[test]
    fn test_close_stops_watch() {
        let (_temp, loader) = setup();
        write_config(&loader, &[]);
        loader.watch().unwrap();
        assert!(loader.is_watching());
        loader.resolver().unwrap();
        loader.close();
        assert!(!loader.is_watching());
        loader.resolver().unwrap();
        assert_eq!(loader.generations(), 2);
    }
}
