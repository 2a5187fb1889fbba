mod common;

use aether_schema::hash_world_state;
use aether_sim::{
    build_headless_app, with_world_store, CellCoord, CorruptionTelemetry, GridHost,
    MarkerPlacement, WorldStore,
};

fn run_simulation(steps: usize) -> anyhow::Result<(u64, CorruptionTelemetry, Vec<MarkerPlacement>)> {
    common::ensure_test_config();
    let host = GridHost::new()
        .with_density("ash", &[("terra", 2), ("aqua", 1), ("vitium", 4)])
        .with_density("forest", &[("herba", 6), ("aer", 3)])
        .with_area("ash", (0, 4), (0, 4))
        .with_area("forest", (4, 10), (0, 6));
    let mut app = build_headless_app(host);
    with_world_store(&mut app, |store, host: &GridHost| {
        store.inject_vitium(host, CellCoord::new(6, 2), 12)
    })?;

    common::run_steps(&mut app, steps, 10);

    let hash = hash_world_state(&app.world.resource::<WorldStore>().to_state())?;
    let telemetry = app.world.resource::<CorruptionTelemetry>().clone();
    let markers = app.world.resource::<GridHost>().markers().to_vec();
    Ok((hash, telemetry, markers))
}

#[test]
fn identical_runs_produce_identical_worlds() -> anyhow::Result<()> {
    let (hash_a, telemetry_a, markers_a) = run_simulation(300)?;
    let (hash_b, telemetry_b, markers_b) = run_simulation(300)?;

    assert_eq!(hash_a, hash_b);
    assert_eq!(telemetry_a, telemetry_b);
    assert_eq!(markers_a, markers_b);
    assert!(telemetry_a.windows_total > 0);
    Ok(())
}

#[test]
fn different_lengths_diverge() -> anyhow::Result<()> {
    let (short, _, _) = run_simulation(20)?;
    let (long, _, _) = run_simulation(200)?;
    assert_ne!(short, long);
    Ok(())
}
