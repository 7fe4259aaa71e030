// tests/rewrite_integration.rs

//! Integration tests for the rewrite stage: walking, indexing, merging and
//! committing the rewritten packages to disk.

mod common;

use common::AppFixture;
use rewrite_resolver::dag::BuildGraph;
use rewrite_resolver::index::{INDEX_FILE, build_index};
use rewrite_resolver::rewriter::{PassthroughTransform, add_rewrite_nodes};
use rewrite_resolver::{CompatAddons, ResolverConfig, RewrittenPackageIndex, find_legacy_packages};
use std::fs;
use std::sync::Arc;

#[test]
fn test_same_name_at_distinct_roots_gets_distinct_names() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    app.legacy_addon("node_modules/.staging/foo", "foo", &[]);
    let ctx = app.register();
    let packages = ctx.packages();

    let legacy = vec![
        packages.get(app.path("node_modules/foo")).unwrap(),
        packages.get(app.path("node_modules/.staging/foo")).unwrap(),
    ];
    let index = build_index(packages, &packages.app().unwrap(), &legacy).unwrap();
    let first = index.new_name_of(&app.path("node_modules/foo")).unwrap().to_string();
    let second = index
        .new_name_of(&app.path("node_modules/.staging/foo"))
        .unwrap()
        .to_string();
    assert_ne!(first, second);
    assert!(first.starts_with("foo."));
    assert!(second.starts_with("foo."));

    // Both land in the merged tree without a conflict
    let mut graph = BuildGraph::new();
    let merge = add_rewrite_nodes(&mut graph, &index, &legacy, Arc::new(PassthroughTransform)).unwrap();
    graph.build().unwrap();
    let merged = graph.output(merge).unwrap();
    assert!(merged.contains(format!("{}/index.js", first)));
    assert!(merged.contains(format!("{}/index.js", second)));
}

#[test]
fn test_index_is_deterministic() {
    let app = AppFixture::new(&["foo", "bar"]);
    app.legacy_addon("node_modules/foo", "foo", &["bar"]);
    app.legacy_addon("node_modules/bar", "bar", &[]);

    let build = || {
        let ctx = app.register();
        let packages = ctx.packages();
        let root = packages.app().unwrap();
        let legacy = find_legacy_packages(packages, &root).unwrap();
        build_index(packages, &root, &legacy).unwrap().to_json().unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_app_extra_resolutions_under_both_identities() {
    let app = AppFixture::new(&[]);
    app.manifest(
        ".",
        r#"{"name":"app","keywords":["ember-addon"],"ember-addon":{"paths":["lib/local"]}}"#,
    );
    app.legacy_addon("lib/local", "local", &[]);
    let (ctx, _stage, report) = app.build();
    assert_eq!(report.legacy_packages, 1);

    let index = RewrittenPackageIndex::load(&ctx.rewritten_dir().join(INDEX_FILE)).unwrap();
    let local = vec![app.path("lib/local")];
    assert_eq!(index.extra_resolutions.get("app"), Some(&local));
    assert_eq!(
        index.extra_resolutions.get(app.root().to_string_lossy().as_ref()),
        Some(&local)
    );
    assert_eq!(index.new_name_of(app.root()), Some("app"));
}

#[test]
fn test_build_commits_layout_and_link() {
    let app = AppFixture::new(&["foo", "v2"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    app.v2_addon("node_modules/v2", "v2");
    let (ctx, _stage, report) = app.build();

    assert_eq!(report.legacy_packages, 1);
    let index = RewrittenPackageIndex::load(&ctx.rewritten_dir().join(INDEX_FILE)).unwrap();
    let new_name = index.new_name_of(&app.path("node_modules/foo")).unwrap();
    assert_eq!(index.new_name_of(&app.path("node_modules/v2")), None);

    let manifest = fs::read_to_string(ctx.rewritten_dir().join(new_name).join("package.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["ember-addon"]["version"], 2);

    #[cfg(unix)]
    {
        let link = ctx.resolvable_link();
        assert_eq!(fs::read_link(&link).unwrap(), ctx.rewritten_dir());
        assert!(link.join(new_name).join("index.js").is_file());
    }
}

#[test]
fn test_resolver_config_round_trip() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    let (ctx, _stage, _report) = app.build();

    let raw = fs::read_to_string(ctx.resolver_config_file()).unwrap();
    let config = ResolverConfig::load(&ctx.resolver_config_file()).unwrap();
    assert_eq!(config.to_json().unwrap(), raw);
    assert_eq!(config.app_root, app.root());
    assert_eq!(config.engines.len(), 1);
    assert!(!config.engines[0].is_lazy);
}

#[test]
fn test_sync_invalidates_only_on_change() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    let ctx = app.register();
    let mut stage = CompatAddons::new(Arc::clone(&ctx));

    stage.build().unwrap();
    let after_first = ctx.rewritten().invalidations();
    assert_eq!(after_first, 1);

    // Nothing changed: no writes, no invalidation
    let report = stage.build().unwrap();
    assert!(!report.sync.touched());
    assert_eq!(ctx.rewritten().invalidations(), after_first);

    // Touching a file without changing it recomputes but commits nothing
    let index_js = app.path("node_modules/foo/index.js");
    let same = fs::read_to_string(&index_js).unwrap();
    fs::write(&index_js, &same).unwrap();
    stage.file_changed(&index_js);
    let report = stage.build().unwrap();
    assert!(!report.build.recomputed.is_empty());
    assert!(report.build.changed.is_empty());
    assert!(!report.sync.touched());
    assert_eq!(ctx.rewritten().invalidations(), after_first);

    app.file("node_modules/foo/index.js", "export default 'changed';\n");
    stage.file_changed(&index_js);
    let report = stage.build().unwrap();
    assert_eq!(report.sync.written, 1);
    assert_eq!(ctx.rewritten().invalidations(), after_first + 1);
}

#[test]
fn test_removed_file_is_removed_from_disk() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    let extra = app.file("node_modules/foo/addon/extra.js", "export default 1;\n");
    let (ctx, mut stage, _report) = app.build();

    let index = RewrittenPackageIndex::load(&ctx.rewritten_dir().join(INDEX_FILE)).unwrap();
    let new_name = index.new_name_of(&app.path("node_modules/foo")).unwrap();
    let committed = ctx.rewritten_dir().join(new_name).join("addon/extra.js");
    assert!(committed.is_file());

    fs::remove_file(&extra).unwrap();
    stage.file_changed(&extra);
    let report = stage.build().unwrap();
    assert_eq!(report.sync.removed, 1);
    assert!(!committed.exists());
    assert!(!committed.parent().unwrap().exists());
}

#[test]
fn test_interrupted_sync_resumes_on_next_build() {
    let app = AppFixture::new(&["foo"]);
    app.legacy_addon("node_modules/foo", "foo", &[]);
    let (ctx, mut stage, _report) = app.build();

    let index = RewrittenPackageIndex::load(&ctx.rewritten_dir().join(INDEX_FILE)).unwrap();
    let committed = ctx
        .rewritten_dir()
        .join(index.new_name_of(&app.path("node_modules/foo")).unwrap())
        .join("index.js");

    let source = app.file("node_modules/foo/index.js", "export default 'edited';\n");
    stage.file_changed(&source);

    // Something else occupies the committed path, so the write fails
    fs::remove_file(&committed).unwrap();
    fs::create_dir_all(committed.join("blocker")).unwrap();
    assert!(stage.build().is_err());

    fs::remove_dir_all(&committed).unwrap();
    let report = stage.build().unwrap();
    assert!(report.build.recomputed.is_empty());
    assert_eq!(report.sync.written, 1);
    assert_eq!(fs::read_to_string(&committed).unwrap(), "export default 'edited';\n");

    // Settled again: nothing left to resume
    let report = stage.build().unwrap();
    assert!(!report.sync.touched());
}
