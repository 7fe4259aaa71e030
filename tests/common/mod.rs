// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use rewrite_resolver::{AppContext, AppRegistry, CompatAddons, CompatReport};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// An app root on disk with a builder for its packages.
///
/// Keep the fixture alive for as long as the tree is needed.
pub struct AppFixture {
    _temp: TempDir,
    root: PathBuf,
}

impl AppFixture {
    /// An app named `app` depending on `deps` (all at version "1").
    pub fn new(deps: &[&str]) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let fixture = Self { _temp: temp, root };
        fixture.manifest(".", &manifest_json("app", deps, None));
        fixture.file("app/app.js", "import Application from 'x';\n");
        fixture
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn manifest(&self, dir: &str, json: &str) {
        self.file(&format!("{}/package.json", dir), json);
    }

    /// A legacy addon at `dir`, with an `index.js`.
    pub fn legacy_addon(&self, dir: &str, name: &str, deps: &[&str]) {
        self.manifest(dir, &manifest_json(name, deps, Some("{}")));
        self.file(&format!("{}/index.js", dir), &format!("export default '{}';\n", name));
    }

    /// A legacy addon with an explicit `ember-addon` section.
    pub fn legacy_addon_with(&self, dir: &str, name: &str, addon: &str) {
        self.manifest(dir, &manifest_json(name, &[], Some(addon)));
        self.file(&format!("{}/index.js", dir), &format!("export default '{}';\n", name));
    }

    /// A standardized (v2) addon at `dir`.
    pub fn v2_addon(&self, dir: &str, name: &str) {
        self.manifest(dir, &manifest_json(name, &[], Some(r#"{"version":2}"#)));
        self.file(&format!("{}/index.js", dir), "export default 2;\n");
    }

    pub fn register(&self) -> Arc<AppContext> {
        AppRegistry::new().register(&self.root).unwrap()
    }

    /// Register the app and run one full compat build.
    pub fn build(&self) -> (Arc<AppContext>, CompatAddons, CompatReport) {
        let ctx = self.register();
        let mut stage = CompatAddons::new(Arc::clone(&ctx));
        let report = stage.build().unwrap();
        (ctx, stage, report)
    }
}

fn manifest_json(name: &str, deps: &[&str], addon: Option<&str>) -> String {
    let deps: Vec<String> = deps.iter().map(|d| format!("\"{}\":\"1\"", d)).collect();
    match addon {
        Some(addon) => format!(
            r#"{{"name":"{}","keywords":["ember-addon"],"dependencies":{{{}}},"ember-addon":{}}}"#,
            name,
            deps.join(","),
            addon
        ),
        None => format!(r#"{{"name":"{}","dependencies":{{{}}}}}"#, name, deps.join(",")),
    }
}
