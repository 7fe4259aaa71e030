// src/walker.rs

//! Legacy addon discovery
//!
//! Depth-first walk over the dependency graph starting at the app. Every
//! distinct package is visited at most once, so diamonds and cycles through
//! the app terminate in O(packages). Traversal continues through packages
//! that are not collected: a standardized addon can still depend on legacy
//! ones.

use crate::error::Result;
use crate::package::{Package, PackageRegistry};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Legacy packages reachable from `app`, in depth-first discovery order
pub fn find_legacy_packages(registry: &PackageRegistry, app: &Arc<Package>) -> Result<Vec<Arc<Package>>> {
    let legacy: Vec<Arc<Package>> = find_ecosystem_packages(registry, app)?
        .into_iter()
        .filter(|pkg| pkg.is_legacy())
        .collect();
    debug!("Found {} legacy packages under {}", legacy.len(), app.name());
    Ok(legacy)
}

/// Every ecosystem package reachable from `app`, legacy or not, in the same
/// discovery order
pub fn find_ecosystem_packages(registry: &PackageRegistry, app: &Arc<Package>) -> Result<Vec<Arc<Package>>> {
    let mut walk = Walk {
        registry,
        seen: HashSet::new(),
        output: Vec::new(),
    };
    // The app itself is never revisited through a cycle
    walk.seen.insert(app.root().to_path_buf());
    walk.visit(app)?;
    Ok(walk.output)
}

struct Walk<'a> {
    registry: &'a PackageRegistry,
    seen: HashSet<PathBuf>,
    output: Vec<Arc<Package>>,
}

impl Walk<'_> {
    fn visit(&mut self, pkg: &Package) -> Result<()> {
        for dep in self.registry.dependencies(pkg)? {
            if !self.seen.insert(dep.root().to_path_buf()) {
                continue;
            }
            if !dep.is_ecosystem_package() {
                continue;
            }
            self.output.push(Arc::clone(&dep));
            self.visit(&dep)?;
        }
        Ok(())
    }
}
