// src/resolver/mod.rs

//! Module resolution against the rewritten package graph
//!
//! [`Resolver::resolve`] answers one request in a fixed order:
//!
//! 1. virtual match: synthesized module specifiers resolve to a virtual
//!    identity without touching disk
//! 2. scope adjustment: an addon configured to resolve from another file is
//!    rehomed there
//! 3. alias: bare names of moved packages are pointed at the rewritten
//!    packages dir, excluded packages become externals
//! 4. fallback: the host resolver, with one template-extension retry
//!
//! Anything left over is [`Resolution::NotFound`], a normal value.
//!
//! A resolve reads exactly one generation of the rewritten index, taken at
//! its start, so a concurrent invalidation never produces a mixed answer.

mod config;
mod fallback;
mod loader;
mod request;

pub use config::{ActiveAddon, EngineConfig, RESOLVER_CONFIG_FILE, ResolverConfig};
pub use fallback::{FallbackResolver, FsFallback, clean_path, split_bare};
pub use loader::{ResolverLoader, SharedConfig};
pub use request::{ModuleRequest, RequestKind, Resolution, ResolveFailure, ResolvedModule};

use crate::error::Result;
use crate::index::{IndexOwner, RewrittenIndexView, RewrittenPackageCache};
use crate::package::{Package, PackageRegistry};
use crate::rewriter::REWRITTEN_PACKAGES;
use crate::virtual_content::{EngineModule, TEMPLATE_ONLY_DIR, VIRTUAL_SPECIFIER_PREFIX, VirtualId};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Extension tried when a script specifier fails
pub const TEMPLATE_EXTENSION: &str = ".hbs";

pub struct Resolver {
    config: ResolverConfig,
    packages: Arc<PackageRegistry>,
    rewritten: Arc<RewrittenPackageCache>,
}

impl Resolver {
    pub fn new(
        config: ResolverConfig,
        packages: Arc<PackageRegistry>,
        rewritten: Arc<RewrittenPackageCache>,
    ) -> Self {
        Self {
            config,
            packages,
            rewritten,
        }
    }

    #[inline]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[inline]
    pub fn packages(&self) -> &PackageRegistry {
        &self.packages
    }

    #[inline]
    pub fn rewritten(&self) -> &RewrittenPackageCache {
        &self.rewritten
    }

    /// The engine `pkg` belongs to
    pub fn owning_engine(&self, pkg: &Package) -> Result<&EngineConfig> {
        self.config.owning_engine(pkg.root())
    }

    pub fn resolve(&self, request: &ModuleRequest, fallback: &dyn FallbackResolver) -> Result<Resolution> {
        if request.is_external() {
            return Ok(Resolution::Ignored(ResolvedModule::external(request.specifier())));
        }

        if let Some(id) = self.match_virtual(request) {
            debug!("{} is virtual: {}", request, id);
            return Ok(Resolution::Found(ResolvedModule::virtual_module(id)));
        }

        let request = self.adjust_importer(request)?;

        let aliased = self.resolve_alias(&request)?;
        if aliased.is_external() {
            debug!("{} left external as {}", request, aliased.specifier());
            return Ok(Resolution::Ignored(ResolvedModule::external(aliased.specifier())));
        }
        if aliased.specifier() != request.specifier() {
            debug!("{} aliased to {}", request, aliased.specifier());
        }

        Ok(match self.fallback_with_extensions(&aliased, fallback) {
            Ok(found) => Resolution::Found(self.maybe_template_only(&aliased, found)),
            Err(failure) => {
                debug!("{} not found: {}", aliased, failure.message);
                Resolution::NotFound(failure)
            }
        })
    }

    /// Virtual identity for `request`, if it names a synthesized module
    fn match_virtual(&self, request: &ModuleRequest) -> Option<String> {
        if request.is_virtual() {
            return Some(request.specifier().to_string());
        }
        let spec = request.specifier();

        if let Some(name) = spec.strip_prefix(VIRTUAL_SPECIFIER_PREFIX) {
            let module = EngineModule::from_virtual_name(name)?;
            let engine = self.config.engine_for_file(request.from_file())?;
            return Some(VirtualId::engine(&engine.root, module));
        }

        let last = spec.rsplit('/').next().unwrap_or(spec);
        if let Some(module) = EngineModule::from_file_name(last) {
            let engine = self.config.engine_for_file(request.from_file())?;
            return Some(VirtualId::engine(&engine.root, module));
        }

        if spec.contains(&format!("/{}/", TEMPLATE_ONLY_DIR)) {
            let path = if request.is_absolute() {
                clean_path(Path::new(spec))
            } else if request.is_relative() {
                clean_path(&request.from_dir().join(spec))
            } else {
                return None;
            };
            let id = path.to_string_lossy().into_owned();
            return VirtualId::decode(&id).map(|_| id);
        }
        None
    }

    /// Rehome requests made from virtual modules or from addons configured
    /// to resolve as another file
    fn adjust_importer(&self, request: &ModuleRequest) -> Result<ModuleRequest> {
        let mut request = request.clone();

        let from = request.from_file().to_string_lossy().into_owned();
        if let Some(VirtualId::TemplateOnly { template }) = VirtualId::decode(&from) {
            request = request.rehome(template);
        }

        // Files outside every package keep their importer
        let Some(owner) = self.packages.owner_of_file(request.from_file())? else {
            return Ok(request);
        };
        if let Some(file) = self
            .config
            .active_addon(owner.root())
            .and_then(|a| a.can_resolve_from_file.as_ref())
        {
            debug!("{} resolves as if from {:?}", request, file);
            request = request.rehome(file.clone());
        }
        Ok(request)
    }

    /// Rewrite a request that targets a moved or excluded package
    ///
    /// Reads only the in-memory index generation and cached package
    /// metadata. Applying it to its own output returns that output.
    pub fn resolve_alias(&self, request: &ModuleRequest) -> Result<ModuleRequest> {
        if request.is_virtual() || request.is_external() {
            return Ok(request.clone());
        }
        let view = self.rewritten.view()?;
        self.alias_with(&view, request)
    }

    fn alias_with(&self, view: &RewrittenIndexView, request: &ModuleRequest) -> Result<ModuleRequest> {
        let spec = request.specifier();

        if request.is_absolute() {
            return Ok(match view.relocate(Path::new(spec)) {
                Some(moved) => request.alias(moved.to_string_lossy()),
                None => request.clone(),
            });
        }
        if request.is_relative() || spec.starts_with(VIRTUAL_SPECIFIER_PREFIX) {
            return Ok(request.clone());
        }

        let (name, subpath) = split_bare(spec);
        if name == REWRITTEN_PACKAGES {
            return Ok(request.clone());
        }

        let owner = view.owner(request.from_file());
        let importer_moved = matches!(owner, Some(IndexOwner::Moved { .. }));
        let location = view.original_location(request.from_file());
        let location_dir = location.parent().unwrap_or(&location);

        let extra = self.extra_target(view, owner.as_ref(), name)?;
        let via_extra = extra.is_some();
        let target = match extra {
            Some(pkg) => Some(pkg),
            None => match self.packages.owner_of_file(&location)? {
                // Self reference by package name
                Some(own) if own.name() == name && !own.is_app() => Some(own),
                _ => self.packages.resolve_dependency(location_dir, name)?,
            },
        };
        let Some(target) = target else {
            return Ok(request.clone());
        };

        let with_subpath = |root: &Path| match subpath {
            Some(sub) => root.join(sub),
            None => root.to_path_buf(),
        };
        let moved_name = view.moved_name(target.root());

        if self.config.is_excluded(name) {
            let external = if self.config.make_absolute_path_to_rw_packages {
                let root = moved_name
                    .map(|n| view.moved_root(n))
                    .unwrap_or_else(|| target.root().to_path_buf());
                with_subpath(&root).to_string_lossy().into_owned()
            } else {
                spec.to_string()
            };
            return Ok(request.externalize(external));
        }

        if let Some(new_name) = moved_name {
            let aliased = match subpath {
                Some(sub) => format!("{}/{}/{}", REWRITTEN_PACKAGES, new_name, sub),
                None => format!("{}/{}", REWRITTEN_PACKAGES, new_name),
            };
            return Ok(request.alias(aliased));
        }

        // Nesting from the rewritten dir cannot see what the original
        // location could, so point at the package directly
        if importer_moved || via_extra {
            return Ok(request.alias(with_subpath(target.root()).to_string_lossy()));
        }
        Ok(request.clone())
    }

    fn extra_target(
        &self,
        view: &RewrittenIndexView,
        owner: Option<&IndexOwner>,
        name: &str,
    ) -> Result<Option<Arc<Package>>> {
        let Some(owner) = owner else {
            return Ok(None);
        };
        for root in view.extra_roots(owner) {
            let pkg = self.packages.get(root)?;
            if pkg.name() == name {
                return Ok(Some(pkg));
            }
        }
        Ok(None)
    }

    /// Run the fallback; on failure retry once with the template extension
    ///
    /// Only the first failure is reported.
    fn fallback_with_extensions(
        &self,
        request: &ModuleRequest,
        fallback: &dyn FallbackResolver,
    ) -> std::result::Result<ResolvedModule, ResolveFailure> {
        let first = match fallback.resolve(request) {
            Ok(found) => return Ok(found),
            Err(failure) => failure,
        };
        if let Some(candidate) = template_candidate(request) {
            debug!("Retrying {} as {}", request, candidate);
            if let Ok(found) = fallback.resolve(&request.alias(candidate)) {
                return Ok(found);
            }
        }
        Err(first)
    }

    /// Swap a lone component template for a template-only stub
    fn maybe_template_only(&self, request: &ModuleRequest, found: ResolvedModule) -> ResolvedModule {
        if found.is_virtual || found.external || request.specifier().ends_with(TEMPLATE_EXTENSION) {
            return found;
        }
        let path = Path::new(&found.id);
        if path.extension().is_none_or(|e| e != "hbs") || path.file_name().is_some_and(|n| n == "template.hbs") {
            return found;
        }
        if !path
            .ancestors()
            .skip(1)
            .any(|dir| dir.file_name().is_some_and(|n| n == "components"))
        {
            return found;
        }
        if ["js", "ts"].iter().any(|ext| path.with_extension(ext).is_file()) {
            return found;
        }
        match VirtualId::template_only(path) {
            Some(id) => {
                debug!("{} is a template-only component: {}", request, id);
                ResolvedModule::virtual_module(id)
            }
            None => found,
        }
    }
}

/// `./x.js` -> `./x.hbs`, `./x` -> `./x.hbs`
fn template_candidate(request: &ModuleRequest) -> Option<String> {
    let spec = request.specifier();
    if spec.ends_with(TEMPLATE_EXTENSION) {
        return None;
    }
    if request.is_bare() && split_bare(spec).1.is_none() {
        return None;
    }
    if let Some(stem) = spec.strip_suffix(".js") {
        return Some(format!("{}{}", stem, TEMPLATE_EXTENSION));
    }
    let last = spec.rsplit('/').next().unwrap_or(spec);
    if last.contains('.') {
        return None;
    }
    Some(format!("{}{}", spec, TEMPLATE_EXTENSION))
}
