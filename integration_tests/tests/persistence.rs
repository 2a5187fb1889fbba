mod common;

use aether_schema::{decode_corruption_table, hash_world_state};
use aether_sim::{
    build_persistent_app, save_now, with_world_store, CellCoord, CorruptionStatus, FileBackend,
    GridHost, MemoryBackend, Quantities, ResourceKind, StateBackend, WorldStore,
};

fn world_host() -> GridHost {
    GridHost::new()
        .with_density("ash", &[("terra", 1), ("vitium", 3)])
        .with_density("forest", &[("herba", 6), ("aer", 3)])
        .with_area("ash", (0, 3), (0, 2))
        .with_area("forest", (5, 9), (0, 4))
}

fn harvest(app: &mut bevy::prelude::App, cell: CellCoord, kind: &str, amount: i64) -> bool {
    let request: Quantities = [(ResourceKind::new(kind), amount)].into_iter().collect();
    with_world_store(app, |store, host: &GridHost| store.harvest(host, cell, &request))
}

#[test]
fn restart_restores_the_saved_world() -> anyhow::Result<()> {
    let config = common::test_config()?;
    let scratch = common::scratch_dir("restart")?;
    let dir = scratch.path().join("state");

    let mut app = build_persistent_app(world_host(), config.clone(), FileBackend::new(&dir))?;
    assert!(harvest(&mut app, CellCoord::new(6, 1), "herba", 5));
    with_world_store(&mut app, |store, _: &GridHost| {
        store.create_permanent_dead_zone(CellCoord::new(8, 3), 0);
    });
    common::run_steps(&mut app, 45, 10);
    save_now(&mut app)?;

    let before = app.world.resource::<WorldStore>().to_state();
    assert!(!before.corruption.entries.is_empty());
    assert!(!before.ledgers.entries.is_empty());
    assert!(!before.dead_zones.entries.is_empty());

    let restarted = build_persistent_app(world_host(), config, FileBackend::new(&dir))?;
    let store = restarted.world.resource::<WorldStore>();
    let after = store.to_state();
    assert_eq!(after, before);
    assert_eq!(hash_world_state(&after)?, hash_world_state(&before)?);
    assert!(!store.is_dirty());
    assert!(store.is_permanent_dead_zone(CellCoord::new(8, 3)));
    assert_eq!(
        store.status(CellCoord::new(0, 0)),
        app.world.resource::<WorldStore>().status(CellCoord::new(0, 0))
    );
    Ok(())
}

#[test]
fn autosave_writes_dirty_state_on_its_interval() -> anyhow::Result<()> {
    let config = common::test_config()?;
    let backend = MemoryBackend::new();
    let mut app = build_persistent_app(world_host(), config, backend.clone())?;

    common::run_steps(&mut app, 1, 10);
    let key = "testworld.aether_corruption";
    let first = backend
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("first dirty tick is saved"))?;
    assert!(!app.world.resource::<WorldStore>().is_dirty());

    common::run_steps(&mut app, 6, 10);
    let second = backend
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("table still present"))?;
    assert_ne!(first, second, "later windows were saved again");

    let decoded = decode_corruption_table(&second);
    assert!(decoded.is_clean());
    for entry in &decoded.value.entries {
        assert_ne!(
            (entry.status, entry.resource_deltas.is_empty(), entry.corruption_events),
            (CorruptionStatus::Pure, true, 0),
            "clean records never reach disk"
        );
    }
    Ok(())
}

#[test]
fn damaged_tables_load_with_repairs() -> anyhow::Result<()> {
    let config = common::test_config()?;
    let backend = MemoryBackend::new();
    backend.insert(
        "testworld.aether_dead_zones",
        r#"{"version": 1, "entries": [
            {"pos": 0, "kind": "permanent"},
            {"pos": 1, "kind": "temporary", "drain_remaining": "lots", "recovery_target": 10},
            "garbage"
        ]}"#,
    );
    backend.insert("testworld.aether_ledgers", "{ truncated");

    let app = build_persistent_app(world_host(), config, backend)?;
    let store = app.world.resource::<WorldStore>();
    assert!(store.is_permanent_dead_zone(CellCoord::new(0, 0)));
    assert!(store.is_dead_zone(CellCoord::new(1, 0)));
    assert_eq!(store.dead_zones().len(), 2);
    assert_eq!(store.ledger_count(), 0);
    Ok(())
}

#[test]
fn unreadable_state_fails_the_load() -> anyhow::Result<()> {
    let config = common::test_config()?;
    let scratch = common::scratch_dir("unreadable")?;
    std::fs::create_dir_all(scratch.path().join("testworld.aether_ledgers.json"))?;

    let backend = FileBackend::new(scratch.path());
    assert!(backend.read("testworld.aether_ledgers").is_err());
    assert!(build_persistent_app(world_host(), config, backend).is_err());
    Ok(())
}
