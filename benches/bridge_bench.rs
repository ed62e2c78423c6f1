use criterion::{criterion_group, criterion_main, Criterion};

// Render round-trips through a trivial shell adapter. Unix only; elsewhere the
// suite is a no-op.
#[cfg(unix)]
fn write_adapter(dir: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    let adapter = dir.join("adapter");
    std::fs::write(&adapter, "#!/bin/sh\ncat > \"$3\"\n").expect("write adapter");
    std::fs::set_permissions(&adapter, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}

#[cfg(unix)]
fn bench_render(c: &mut Criterion) {
    use tilt_bridge::{BridgeConfig, RenderBridge, TemplateContext};

    let templates = tempfile::tempdir().unwrap();
    write_adapter(templates.path());
    let bridge = RenderBridge::new(templates.path(), BridgeConfig::default()).unwrap();

    let mut small = TemplateContext::new();
    small.insert("title".into(), "Bench".into());

    let mut large = TemplateContext::new();
    let rows: Vec<_> = (0..2_000)
        .map(|i| serde_json::json!({ "id": i, "name": format!("row {}", i) }))
        .collect();
    large.insert("rows".into(), rows.into());

    c.bench_function("render_small_context", |b| {
        b.iter(|| bridge.render("index.tmpl", &small).unwrap())
    });

    c.bench_function("render_large_context", |b| {
        b.iter(|| bridge.render("index.tmpl", &large).unwrap())
    });
}

#[cfg(not(unix))]
fn bench_render(_c: &mut Criterion) {}

criterion_group!(benches, bench_render);
criterion_main!(benches);
