#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use aether_sim::{run_tick, AetherConfig, CorruptionEvent, GridHost};
use bevy::ecs::event::{Events, ManualEventReader};
use bevy::prelude::App;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_aether_config.json")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();

        debug_assert!(
            config_path.exists(),
            "missing test aether config at {}",
            config_path.display()
        );

        std::env::set_var(aether_sim::AETHER_CONFIG_ENV, &config_path);
    });
}

pub fn test_config() -> anyhow::Result<Arc<AetherConfig>> {
    ensure_test_config();
    Ok(Arc::new(AetherConfig::from_file(&fixture_path())?))
}

/// Advances the host clock by `step` and runs one update, `count` times.
/// Returns every corruption event emitted along the way.
pub fn run_steps(app: &mut App, count: usize, step: u64) -> Vec<CorruptionEvent> {
    let mut reader = ManualEventReader::<CorruptionEvent>::default();
    let mut seen = Vec::new();
    for _ in 0..count {
        app.world.resource_mut::<GridHost>().advance(step);
        run_tick(app);
        let events = app.world.resource::<Events<CorruptionEvent>>();
        seen.extend(reader.read(events).cloned());
    }
    seen
}

/// Fresh temp directory, removed when the guard drops (including on panic).
pub fn scratch_dir(name: &str) -> anyhow::Result<TempDir> {
    Ok(tempfile::Builder::new()
        .prefix(&format!("aether-it-{name}-"))
        .tempdir()?)
}
