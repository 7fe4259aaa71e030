// src/compat.rs

//! The legacy addon build stage
//!
//! First build: walk the app's dependency graph, assign new names, and wire
//! one transform node per legacy package into a build graph feeding the
//! merge node. Every build: run the graph, sync the merged tree when it is
//! the first build or the merge output changed, then refresh
//! `resolver.json` if its content changed.

use crate::app::AppContext;
use crate::dag::{BuildGraph, BuildReport, NodeId};
use crate::error::{Error, Result};
use crate::index::{RewrittenPackageIndex, build_index};
use crate::package::Package;
use crate::resolver::{ActiveAddon, EngineConfig, ResolverConfig};
use crate::rewriter::{PackageTransform, PassthroughTransform, add_rewrite_nodes};
use crate::sync::{SyncReport, TreeSync, write_atomic};
use crate::walker::find_ecosystem_packages;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of one [`CompatAddons::build`]
#[derive(Debug, Clone)]
pub struct CompatReport {
    pub legacy_packages: usize,
    pub build: BuildReport,
    pub sync: SyncReport,
    pub config_written: bool,
}

struct Prepared {
    graph: BuildGraph,
    merge: NodeId,
    config: ResolverConfig,
}

pub struct CompatAddons {
    ctx: Arc<AppContext>,
    transform: Arc<dyn PackageTransform>,
    prepared: Option<Prepared>,
    sync: TreeSync,
    legacy_count: usize,
}

impl CompatAddons {
    /// Stage using the pass-through transform
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self::with_transform(ctx, Arc::new(PassthroughTransform))
    }

    pub fn with_transform(ctx: Arc<AppContext>, transform: Arc<dyn PackageTransform>) -> Self {
        let sync = TreeSync::new(ctx.rewritten_dir())
            .with_link(ctx.resolvable_link())
            .with_cache(Arc::clone(ctx.rewritten()));
        Self {
            ctx,
            transform,
            prepared: None,
            sync,
            legacy_count: 0,
        }
    }

    #[inline]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn build(&mut self) -> Result<CompatReport> {
        let first = self.prepared.is_none();
        if first {
            self.prepared = Some(self.prepare()?);
        }
        let Some(prepared) = self.prepared.as_mut() else {
            return Err(Error::Transform {
                package: self.ctx.root().display().to_string(),
                reason: "build graph missing".to_string(),
            });
        };

        let build = prepared.graph.build()?;
        let merged = prepared.graph.output(prepared.merge).ok_or_else(|| Error::Transform {
            package: prepared.graph.label(prepared.merge),
            reason: "merge node produced no output".to_string(),
        })?;
        let sync = self.sync.sync(&merged, build.changed(prepared.merge))?;
        if sync.touched() {
            // Rewritten manifests may differ from what the registry cached
            self.ctx.packages().invalidate_under(&self.ctx.rewritten_dir());
        }

        let config_written = write_if_changed(&self.ctx.resolver_config_file(), &prepared.config.to_json()?)?;
        if config_written {
            self.ctx.loader().handle_config_change();
        }

        info!(
            "Compat build: {} legacy packages, {} nodes recomputed, {} files written",
            self.legacy_count,
            build.recomputed.len(),
            sync.written
        );
        Ok(CompatReport {
            legacy_packages: self.legacy_count,
            build,
            sync,
            config_written,
        })
    }

    /// Forward a file change to the build graph; returns nodes invalidated
    pub fn file_changed(&mut self, path: &Path) -> usize {
        match self.prepared.as_mut() {
            Some(prepared) => prepared.graph.invalidate_path(path),
            None => 0,
        }
    }

    fn prepare(&mut self) -> Result<Prepared> {
        let packages = self.ctx.packages();
        let app = packages.app()?;
        let ecosystem = find_ecosystem_packages(packages, &app)?;
        let legacy: Vec<Arc<Package>> = ecosystem.iter().filter(|p| p.is_legacy()).cloned().collect();
        self.legacy_count = legacy.len();

        let index = build_index(packages, &app, &legacy)?;
        let mut graph = BuildGraph::new();
        let merge = add_rewrite_nodes(&mut graph, &index, &legacy, Arc::clone(&self.transform))?;
        let config = self.resolver_config(&app, &ecosystem, &index);
        debug!(
            "Prepared compat build for {}: {} ecosystem packages, {} legacy",
            app.name(),
            ecosystem.len(),
            legacy.len()
        );
        Ok(Prepared { graph, merge, config })
    }

    fn resolver_config(
        &self,
        app: &Package,
        ecosystem: &[Arc<Package>],
        index: &RewrittenPackageIndex,
    ) -> ResolverConfig {
        let rewritten_dir = self.ctx.rewritten_dir();
        let active_addons = ecosystem
            .iter()
            .map(|pkg| ActiveAddon {
                name: pkg.name().to_string(),
                root: match index.new_name_of(pkg.root()) {
                    Some(new_name) => rewritten_dir.join(new_name),
                    None => pkg.root().to_path_buf(),
                },
                can_resolve_from_file: None,
            })
            .collect();
        let settings = self.ctx.settings();
        ResolverConfig {
            app_root: app.root().to_path_buf(),
            module_prefix: settings
                .module_prefix
                .clone()
                .unwrap_or_else(|| app.name().to_string()),
            pod_module_prefix: None,
            resolvable_extensions: settings.resolvable_extensions.clone(),
            engines: vec![EngineConfig {
                package_name: app.name().to_string(),
                root: app.root().to_path_buf(),
                active_addons,
                is_lazy: false,
            }],
            exclude_legacy_addons: settings.exclude_legacy_addons.clone(),
            make_absolute_path_to_rw_packages: settings.absolute_paths_for_excluded,
        }
    }
}

/// Write `content` unless the file already holds exactly it
fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    match fs::read_to_string(path) {
        Ok(existing) if existing == content => Ok(false),
        _ => {
            write_atomic(path, content.as_bytes())?;
            debug!("Wrote {:?}", path);
            Ok(true)
        }
    }
}
