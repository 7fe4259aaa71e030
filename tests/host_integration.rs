// tests/host_integration.rs

//! Integration tests for the host bridge: loading virtual content and
//! reacting to file changes.

mod common;

use common::AppFixture;
use rewrite_resolver::virtual_content::{EngineModule, VirtualId};
use rewrite_resolver::{Error, FsFallback, Host, ModuleRequest};
use std::sync::Arc;

fn vendor_app() -> AppFixture {
    let app = AppFixture::new(&["foo", "loader.js"]);
    app.legacy_addon_with(
        "node_modules/foo",
        "foo",
        r#"{"implicit-scripts":["./vendor/foo.js"],"implicit-styles":["./vendor/foo.css"]}"#,
    );
    app.file("node_modules/foo/vendor/foo.js", "window.foo = 1");
    app.file("node_modules/foo/vendor/foo.css", ".foo{}");
    app.legacy_addon_with(
        "node_modules/loader.js",
        "loader.js",
        r#"{"implicit-scripts":["./dist/loader.js"]}"#,
    );
    app.file("node_modules/loader.js/dist/loader.js", "var define");
    app
}

#[test]
fn test_vendor_concatenates_rewritten_scripts_in_priority_order() {
    let app = vendor_app();
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));

    let id = VirtualId::engine(ctx.root(), EngineModule::Vendor);
    let src = host.load(&id).unwrap();
    assert_eq!(src, "var define;\nwindow.foo = 1");

    let styles = host.load(&VirtualId::engine(ctx.root(), EngineModule::VendorStyles)).unwrap();
    assert_eq!(styles, ".foo{}");

    // Watches point into the rewritten copies
    let watches = host.watches().watches(&id).unwrap();
    assert!(!watches.is_empty());
    assert!(watches.iter().all(|w| w.starts_with(ctx.rewritten_dir())));
}

#[test]
fn test_file_change_reports_stale_virtual_entries() {
    let app = vendor_app();
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));
    let vendor = VirtualId::engine(ctx.root(), EngineModule::Vendor);
    host.load_virtual(&vendor).unwrap();
    let watched = host.watches().watches(&vendor).unwrap();
    let script = watched
        .iter()
        .find(|w| w.ends_with("vendor/foo.js"))
        .unwrap()
        .clone();

    let change = host.file_changed(&script);
    assert_eq!(change.virtual_ids, vec![vendor.clone()]);
    assert!(!change.config_changed);

    let unrelated = host.file_changed(&app.path("app/app.js"));
    assert!(unrelated.virtual_ids.is_empty());
}

#[test]
fn test_config_change_drops_resolver_generation() {
    let app = vendor_app();
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));
    let fallback = FsFallback::new(vec![".js".into()]);

    host.resolve(&ModuleRequest::new("foo", app.path("app/app.js")), &fallback)
        .unwrap();
    assert_eq!(host.loader().generations(), 1);

    let change = host.file_changed(&ctx.resolver_config_file());
    assert!(change.config_changed);
    host.resolve(&ModuleRequest::new("foo", app.path("app/app.js")), &fallback)
        .unwrap();
    assert_eq!(host.loader().generations(), 2);
}

#[test]
fn test_define_table_lists_app_modules() {
    let app = AppFixture::new(&[]);
    app.file("app/router.js", "export default 1;\n");
    app.file("app/components/card.hbs", "<div></div>\n");
    app.file("app/components/card.js", "export default 2;\n");
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));

    let src = host
        .load(&VirtualId::engine(ctx.root(), EngineModule::DefineTable))
        .unwrap();
    assert!(src.contains("define(\"app/router\""));
    assert!(src.contains("define(\"app/components/card\""));
    assert_eq!(src.matches("define(\"app/components/card\"").count(), 1);
}

#[test]
fn test_load_real_and_missing_virtual() {
    let app = AppFixture::new(&[]);
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));

    let real = host.load(&app.path("app/app.js").to_string_lossy()).unwrap();
    assert!(real.contains("import Application"));

    let bogus = app.path("not-virtual.js").to_string_lossy().into_owned();
    assert!(matches!(host.load_virtual(&bogus), Err(Error::VirtualNotFound { .. })));
}

#[test]
fn test_missing_implicit_script_is_reported() {
    let app = vendor_app();
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));

    // The rewritten copy disappears after the build committed it
    let vendor = VirtualId::engine(ctx.root(), EngineModule::Vendor);
    host.load_virtual(&vendor).unwrap();
    let committed = host
        .watches()
        .watches(&vendor)
        .unwrap()
        .into_iter()
        .find(|w| w.ends_with("vendor/foo.js"))
        .unwrap();
    std::fs::remove_file(&committed).unwrap();

    let err = host
        .load(&VirtualId::engine(ctx.root(), EngineModule::Vendor))
        .unwrap_err();
    assert!(matches!(err, Error::ImplicitNotFound { ref addon, .. } if addon == "foo"));
}

#[test]
fn test_rerender_after_rewritten_manifest_change_reads_new_lists() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon_with("node_modules/foo", "foo", r#"{"implicit-scripts":["./a.js"]}"#);
    app.file("node_modules/foo/a.js", "A");
    app.file("node_modules/foo/b.js", "B");
    let (ctx, mut stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));
    let vendor = VirtualId::engine(ctx.root(), EngineModule::Vendor);
    assert_eq!(host.load_virtual(&vendor).unwrap(), "A");

    app.legacy_addon_with(
        "node_modules/foo",
        "foo",
        r#"{"implicit-scripts":["./a.js","./b.js"]}"#,
    );
    stage.file_changed(&app.path("node_modules/foo/package.json"));
    assert!(stage.build().unwrap().sync.touched());

    let manifest = host
        .watches()
        .watches(&vendor)
        .unwrap()
        .into_iter()
        .find(|w| w.ends_with("package.json"))
        .unwrap();
    assert_eq!(host.file_changed(&manifest).virtual_ids, vec![vendor.clone()]);
    assert_eq!(host.load_virtual(&vendor).unwrap(), "A;\nB");
}

#[test]
fn test_manifest_change_refreshes_cached_package() {
    let app = AppFixture::new(&["v2"]);
    let v2 = |scripts: &str| {
        format!(
            r#"{{"name":"v2","keywords":["ember-addon"],"ember-addon":{{"version":2,"implicit-scripts":[{}]}}}}"#,
            scripts
        )
    };
    app.manifest("node_modules/v2", &v2(r#""./a.js""#));
    app.file("node_modules/v2/a.js", "A");
    app.file("node_modules/v2/b.js", "B");
    let (ctx, _stage, _report) = app.build();
    let host = Host::new(Arc::clone(ctx.loader()));
    let vendor = VirtualId::engine(ctx.root(), EngineModule::Vendor);
    assert_eq!(host.load_virtual(&vendor).unwrap(), "A");

    // Standardized addons are served from where they are, not rewritten
    app.manifest("node_modules/v2", &v2(r#""./b.js""#));
    let change = host.file_changed(&app.path("node_modules/v2/package.json"));
    assert_eq!(change.virtual_ids, vec![vendor.clone()]);
    assert_eq!(host.load_virtual(&vendor).unwrap(), "B");
}
