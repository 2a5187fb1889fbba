//! Aether ledger and vitium corruption simulation, driven as a Bevy app by
//! the host world's tick.

pub mod aether_config;
pub mod capabilities;
mod components;
pub mod corruption;
pub mod dead_zone;
pub mod driver;
mod hashing;
pub mod host;
pub mod ledger;
pub mod metrics;
mod modifiers;
pub mod persistence;
pub mod region;
mod resources;
mod store;
mod systems;

use std::sync::Arc;

use bevy::prelude::*;

pub use aether_config::{
    load_aether_config_from_env, AetherConfig, AetherConfigError, AetherConfigHandle,
    AetherConfigMetadata, AetherDrainPolicy, AETHER_CONFIG_ENV, BUILTIN_AETHER_CONFIG,
};
pub use capabilities::{capability_enabled, AetherCapabilities};
pub use components::{
    quantities_from_state, quantities_to_state, CellCoord, ClassificationId, Quantities,
    ResourceKind,
};
pub use corruption::{classify_vitium, corruption_ratio, CorruptionRecord, CorruptionStatus};
pub use dead_zone::{DeadZone, DeadZoneEntry, DeadZoneTable};
pub use driver::{CorruptionDriver, DriverState, WindowReport};
pub use hashing::world_seed;
pub use host::{GridHost, HostWorld, MarkerPlacement, MarkerPosition};
pub use ledger::{ExhaustionTrigger, HarvestReceipt, HarvestRejection, ResourceLedger};
pub use metrics::AetherMetrics;
pub use modifiers::ClassificationModifiers;
pub use persistence::{
    FileBackend, MemoryBackend, PersistenceBackend, PersistenceError, StateBackend,
};
pub use region::{discover_region, Region, RegionBounds, RegionFault};
pub use resources::{
    AetherSchedule, CorruptionEvent, CorruptionEventKind, CorruptionTelemetry, IntervalGate,
    SimulationTick,
};
pub use store::{CorruptedRegion, StoreSettings, WorldStore};

/// Builds an app over `host` using the configuration named by
/// `AETHER_CONFIG_PATH` (or the builtin one). Nothing is persisted.
pub fn build_headless_app<H: HostWorld>(host: H) -> App {
    let (config, metadata) = load_aether_config_from_env();
    let store = WorldStore::new(&config);
    build_app(host, config, metadata, store, None)
}

/// Builds an app whose store is first loaded from `backend` and then
/// autosaved back to it.
pub fn build_persistent_app<H: HostWorld>(
    host: H,
    config: Arc<AetherConfig>,
    backend: impl StateBackend,
) -> Result<App, PersistenceError> {
    let store = WorldStore::load(&config, &backend)?;
    Ok(build_app(
        host,
        config,
        AetherConfigMetadata::default(),
        store,
        Some(PersistenceBackend::new(backend)),
    ))
}

fn build_app<H: HostWorld>(
    host: H,
    config: Arc<AetherConfig>,
    metadata: AetherConfigMetadata,
    store: WorldStore,
    backend: Option<PersistenceBackend>,
) -> App {
    let mut app = App::new();
    let tick = SimulationTick(host.current_tick());
    let driver = DriverState::new(&config);

    app.insert_resource(AetherConfigHandle::new(config))
        .insert_resource(metadata)
        .insert_resource(AetherCapabilities::default())
        .insert_resource(tick)
        .insert_resource(AetherSchedule::default())
        .insert_resource(CorruptionTelemetry::default())
        .insert_resource(AetherMetrics::default())
        .insert_resource(driver)
        .insert_resource(store)
        .insert_resource(host)
        .add_event::<CorruptionEvent>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                systems::sync_tick::<H>,
                systems::sweep_dead_zones
                    .run_if(capability_enabled(AetherCapabilities::DEAD_ZONES)),
                systems::recover_aether::<H>
                    .run_if(capability_enabled(AetherCapabilities::RECOVERY)),
                systems::process_corruption::<H>
                    .run_if(capability_enabled(AetherCapabilities::CORRUPTION)),
                metrics::collect_metrics,
                systems::autosave.run_if(capability_enabled(AetherCapabilities::PERSISTENCE)),
            )
                .chain(),
        );
    if let Some(backend) = backend {
        app.insert_resource(backend);
    }
    app
}

/// Runs the chained systems once for the host's current tick
/// (tick sync → dead-zone sweep → ledger recovery → corruption window →
/// metrics → autosave).
pub fn run_tick(app: &mut App) {
    app.update();
}

/// Saves immediately if a backend is installed and the store is dirty.
pub fn save_now(app: &mut App) -> Result<bool, PersistenceError> {
    if !app.world.contains_resource::<PersistenceBackend>() {
        return Ok(false);
    }
    app.world
        .resource_scope(|world, backend: Mut<PersistenceBackend>| {
            world.resource_mut::<WorldStore>().save(backend.0.as_ref())
        })
}

/// Borrows the store together with the host, for queries and harvests made
/// between ticks.
pub fn with_world_store<H: HostWorld, R>(
    app: &mut App,
    f: impl FnOnce(&mut WorldStore, &H) -> R,
) -> R {
    app.world
        .resource_scope(|world, mut store: Mut<WorldStore>| f(&mut store, world.resource::<H>()))
}
