// src/host.rs

//! Bridge for host build tools
//!
//! Hosts call [`Host::resolve`] from their resolve hook, [`Host::load`] from
//! their load hook and [`Host::file_changed`] from their watcher. The host
//! keeps the fallback resolver; this side keeps track of which virtual
//! entries each changed file stales.

use crate::error::Result;
use crate::package::MANIFEST_FILE;
use crate::resolver::{FallbackResolver, ModuleRequest, Resolution, ResolverLoader};
use crate::virtual_content::{self, VirtualId, WatchTable};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What a changed file invalidated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChange {
    /// Virtual identities the host must reload
    pub virtual_ids: Vec<String>,
    /// The change was the resolver configuration itself
    pub config_changed: bool,
}

pub struct Host {
    loader: Arc<ResolverLoader>,
    watches: WatchTable,
}

impl Host {
    pub fn new(loader: Arc<ResolverLoader>) -> Self {
        Self {
            loader,
            watches: WatchTable::new(),
        }
    }

    #[inline]
    pub fn loader(&self) -> &ResolverLoader {
        &self.loader
    }

    #[inline]
    pub fn watches(&self) -> &WatchTable {
        &self.watches
    }

    pub fn resolve(&self, request: &ModuleRequest, fallback: &dyn FallbackResolver) -> Result<Resolution> {
        self.loader.resolver()?.resolve(request, fallback)
    }

    /// Load a module by id, virtual or real
    pub fn load(&self, id: &str) -> Result<String> {
        if VirtualId::decode(id).is_some() {
            self.load_virtual(id)
        } else {
            self.load_real(Path::new(id))
        }
    }

    /// Render a virtual module and remember what it watches
    pub fn load_virtual(&self, id: &str) -> Result<String> {
        let resolver = self.loader.resolver()?;
        let rendered = virtual_content::render(id, &resolver)?;
        self.watches.record(id, rendered.watches);
        Ok(rendered.src)
    }

    pub fn load_real(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    /// Fan a watcher event out to the virtual entries and the loader
    ///
    /// A changed `package.json` also drops that package's cached metadata so
    /// re-rendered entries see the new implicit lists.
    pub fn file_changed(&self, path: &Path) -> FileChange {
        let config_changed = path == self.loader.config_file();
        if config_changed {
            debug!("Resolver config changed: {:?}", path);
            self.loader.handle_config_change();
        }
        if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
            if let Some(root) = path.parent() {
                self.loader.packages().invalidate(root);
            }
        }
        FileChange {
            virtual_ids: self.watches.on_file_change(path),
            config_changed,
        }
    }
}
