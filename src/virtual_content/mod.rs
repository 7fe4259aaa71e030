// src/virtual_content/mod.rs

//! Synthesized modules
//!
//! A virtual identity is an absolute path that never exists on disk. Its
//! file name says what to generate and its directory says for which engine:
//!
//! ```text
//! /proj/-embroider-vendor.js                       implicit scripts
//! /proj/-embroider-test-support.js                 implicit test scripts
//! /proj/-embroider-vendor-styles.css               implicit styles
//! /proj/-embroider-test-support-styles.css         implicit test styles
//! /proj/-embroider-implicit-modules.js             implicit modules table
//! /proj/-embroider-implicit-test-modules.js        implicit test modules table
//! /proj/-embroider-define-table.js                 runtime registrations for app/
//! /proj/components/-embroider-template-only/x.js   template-only component stub
//! ```
//!
//! Rendering reads real files and reports exactly those paths as the
//! entry's watches.

mod watch;

pub use watch::WatchTable;

use crate::error::{Error, Result};
use crate::package::{ImplicitKind, MANIFEST_FILE, Package};
use crate::resolver::{EngineConfig, Resolver, clean_path};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Bare specifier prefix for requesting an engine's virtual modules by name
pub const VIRTUAL_SPECIFIER_PREFIX: &str = "@embroider/virtual/";

/// Directory segment marking template-only component stubs
pub const TEMPLATE_ONLY_DIR: &str = "-embroider-template-only";

const TEMPLATE_ONLY_STUB: &str =
    "import templateOnly from '@ember/component/template-only';\nexport default templateOnly();\n";

/// Per-engine synthesized modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineModule {
    ImplicitModules,
    ImplicitTestModules,
    Vendor,
    TestSupport,
    VendorStyles,
    TestSupportStyles,
    DefineTable,
}

impl EngineModule {
    pub const ALL: [EngineModule; 7] = [
        Self::ImplicitModules,
        Self::ImplicitTestModules,
        Self::Vendor,
        Self::TestSupport,
        Self::VendorStyles,
        Self::TestSupportStyles,
        Self::DefineTable,
    ];

    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::ImplicitModules => "-embroider-implicit-modules.js",
            Self::ImplicitTestModules => "-embroider-implicit-test-modules.js",
            Self::Vendor => "-embroider-vendor.js",
            Self::TestSupport => "-embroider-test-support.js",
            Self::VendorStyles => "-embroider-vendor-styles.css",
            Self::TestSupportStyles => "-embroider-test-support-styles.css",
            Self::DefineTable => "-embroider-define-table.js",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.file_name() == name)
    }

    /// `vendor.js` in `@embroider/virtual/vendor.js`
    pub fn from_virtual_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.file_name().strip_prefix("-embroider-") == Some(name))
    }

    const fn implicit_kind(&self) -> Option<ImplicitKind> {
        match self {
            Self::ImplicitModules => Some(ImplicitKind::Modules),
            Self::ImplicitTestModules => Some(ImplicitKind::TestModules),
            Self::Vendor => Some(ImplicitKind::Scripts),
            Self::TestSupport => Some(ImplicitKind::TestScripts),
            Self::VendorStyles => Some(ImplicitKind::Styles),
            Self::TestSupportStyles => Some(ImplicitKind::TestStyles),
            Self::DefineTable => None,
        }
    }
}

/// A decoded virtual identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualId {
    Engine { module: EngineModule, engine_root: PathBuf },
    /// Stub for the template at `template`
    TemplateOnly { template: PathBuf },
}

impl VirtualId {
    /// Decode an identity; `None` if it names no synthesized module
    pub fn decode(id: &str) -> Option<Self> {
        let path = Path::new(id);
        if !path.is_absolute() {
            return None;
        }
        let name = path.file_name()?.to_str()?;
        let parent = path.parent()?;
        if let Some(module) = EngineModule::from_file_name(name) {
            return Some(Self::Engine {
                module,
                engine_root: parent.to_path_buf(),
            });
        }
        if parent.file_name()? == TEMPLATE_ONLY_DIR {
            let stem = name.strip_suffix(".js")?;
            return Some(Self::TemplateOnly {
                template: parent.parent()?.join(format!("{}.hbs", stem)),
            });
        }
        None
    }

    pub fn engine(engine_root: &Path, module: EngineModule) -> String {
        engine_root.join(module.file_name()).to_string_lossy().into_owned()
    }

    /// Identity of the stub standing in for `template` (`x.hbs`)
    pub fn template_only(template: &Path) -> Option<String> {
        let stem = template.file_stem()?.to_str()?;
        let dir = template.parent()?;
        Some(
            dir.join(TEMPLATE_ONLY_DIR)
                .join(format!("{}.js", stem))
                .to_string_lossy()
                .into_owned(),
        )
    }
}

/// Generated source and the real paths it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualContentResult {
    pub src: String,
    pub watches: Vec<PathBuf>,
}

/// Generate the content behind a virtual identity
pub fn render(id: &str, resolver: &Resolver) -> Result<VirtualContentResult> {
    let decoded = VirtualId::decode(id).ok_or_else(|| Error::VirtualNotFound { id: id.to_string() })?;
    debug!("Rendering virtual {}", id);
    match decoded {
        VirtualId::TemplateOnly { .. } => Ok(VirtualContentResult {
            src: TEMPLATE_ONLY_STUB.to_string(),
            watches: Vec::new(),
        }),
        VirtualId::Engine { module, engine_root } => {
            let owner = resolver.packages().require_owner(&engine_root.join(module.file_name()))?;
            let engine = resolver.config().owning_engine(owner.root())?;
            match module.implicit_kind() {
                Some(kind @ (ImplicitKind::Modules | ImplicitKind::TestModules)) => {
                    render_implicit_modules(resolver, engine, kind)
                }
                Some(kind @ (ImplicitKind::Scripts | ImplicitKind::TestScripts)) => {
                    concat_implicit(resolver, engine, kind, ";\n")
                }
                Some(kind) => concat_implicit(resolver, engine, kind, ""),
                None => render_define_table(resolver, engine),
            }
        }
    }
}

/// Sort rank: the module loader first, the runtime second, then the rest
fn priority(name: &str) -> u32 {
    match name {
        "loader.js" => 0,
        "ember-source" => 10,
        _ => 1000,
    }
}

/// Active addons of `engine` in render order
fn ordered_addons(resolver: &Resolver, engine: &EngineConfig) -> Result<Vec<Arc<Package>>> {
    let mut addons = engine
        .active_addons
        .iter()
        .map(|a| resolver.packages().get(&a.root))
        .collect::<Result<Vec<_>>>()?;
    addons.sort_by_key(|p| priority(p.name()));
    Ok(addons)
}

fn concat_implicit(
    resolver: &Resolver,
    engine: &EngineConfig,
    kind: ImplicitKind,
    separator: &str,
) -> Result<VirtualContentResult> {
    let mut parts = Vec::new();
    let mut watches = Vec::new();
    for addon in ordered_addons(resolver, engine)? {
        let declared = addon.implicit(kind);
        if declared.is_empty() {
            continue;
        }
        watches.push(addon.root().join(MANIFEST_FILE));
        for rel in declared {
            let file = clean_path(&addon.root().join(rel.trim_start_matches("./")));
            if !file.is_file() {
                return Err(Error::ImplicitNotFound {
                    addon: addon.name().to_string(),
                    path: file,
                });
            }
            parts.push(fs::read_to_string(&file)?);
            watches.push(file);
        }
    }
    Ok(VirtualContentResult {
        src: parts.join(separator),
        watches,
    })
}

fn render_implicit_modules(
    resolver: &Resolver,
    engine: &EngineConfig,
    kind: ImplicitKind,
) -> Result<VirtualContentResult> {
    let mut imports = String::new();
    let mut table = String::new();
    let mut watches = Vec::new();
    let mut n = 0;
    for addon in ordered_addons(resolver, engine)? {
        watches.push(addon.root().join(MANIFEST_FILE));
        for rel in addon.implicit(kind) {
            let name = runtime_name(addon.name(), rel);
            let _ = writeln!(imports, "import * as i{} from \"{}\";", n, name);
            let _ = writeln!(table, "  \"{}\": i{},", name, n);
            n += 1;
        }
    }
    Ok(VirtualContentResult {
        src: format!("{}export default {{\n{}}};\n", imports, table),
        watches,
    })
}

/// `foo` + `./components/x.js` -> `foo/components/x`
fn runtime_name(package: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches("./");
    let rel = Path::new(rel).with_extension("");
    format!("{}/{}", package, rel.to_string_lossy())
}

fn render_define_table(resolver: &Resolver, engine: &EngineConfig) -> Result<VirtualContentResult> {
    let config = resolver.config();
    let prefix = config.prefix_of(engine);
    let app_dir = engine.root.join("app");
    let mut src = String::new();
    let mut defines = String::new();
    let mut seen = std::collections::HashSet::new();

    if app_dir.is_dir() {
        let mut n = 0;
        for entry in WalkDir::new(&app_dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !config.resolvable_extensions.iter().any(|e| e.trim_start_matches('.') == ext) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&app_dir) else {
                continue;
            };
            let module = rel.with_extension("").to_string_lossy().replace('\\', "/");
            // x.hbs and x.js name the same module; the first one wins
            if !seen.insert(module.clone()) {
                continue;
            }
            let _ = writeln!(
                src,
                "import * as m{} from \"./app/{}\";",
                n,
                rel.to_string_lossy().replace('\\', "/")
            );
            let _ = writeln!(defines, "define(\"{}/{}\", function () {{ return m{}; }});", prefix, module, n);
            n += 1;
        }
    }
    src.push_str(&defines);
    Ok(VirtualContentResult {
        src,
        watches: vec![app_dir],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_engine_modules() {
        let decoded = VirtualId::decode("/proj/-embroider-vendor-styles.css").unwrap();
        assert_eq!(
            decoded,
            VirtualId::Engine {
                module: EngineModule::VendorStyles,
                engine_root: "/proj".into()
            }
        );
        assert!(VirtualId::decode("/proj/vendor.js").is_none());
        assert!(VirtualId::decode("-embroider-vendor.js").is_none());
    }

    #[test]
    fn test_template_only_identity_round_trip() {
        let id = VirtualId::template_only(Path::new("/proj/app/components/card.hbs")).unwrap();
        assert_eq!(id, "/proj/app/components/-embroider-template-only/card.js");
        assert_eq!(
            VirtualId::decode(&id).unwrap(),
            VirtualId::TemplateOnly {
                template: "/proj/app/components/card.hbs".into()
            }
        );
    }

    #[test]
    fn test_virtual_names() {
        assert_eq!(EngineModule::from_virtual_name("vendor.js"), Some(EngineModule::Vendor));
        assert_eq!(
            EngineModule::from_virtual_name("define-table.js"),
            Some(EngineModule::DefineTable)
        );
        assert_eq!(EngineModule::from_virtual_name("nope.js"), None);
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut names = vec!["b", "ember-source", "a", "loader.js"];
        names.sort_by_key(|n| priority(n));
        assert_eq!(names, vec!["loader.js", "ember-source", "b", "a"]);
    }

    #[test]
    fn test_runtime_name() {
        assert_eq!(runtime_name("foo", "./components/x.js"), "foo/components/x");
        assert_eq!(runtime_name("@s/foo", "helpers/y.ts"), "@s/foo/helpers/y");
    }
}
