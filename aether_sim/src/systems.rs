use bevy::prelude::*;

use crate::aether_config::AetherConfigHandle;
use crate::driver::{CorruptionDriver, DriverState};
use crate::host::HostWorld;
use crate::persistence::PersistenceBackend;
use crate::resources::{AetherSchedule, CorruptionEvent, CorruptionTelemetry, SimulationTick};
use crate::store::WorldStore;

/// Copies the host clock into [`SimulationTick`] before anything else runs.
pub fn sync_tick<H: HostWorld>(host: Res<H>, mut tick: ResMut<SimulationTick>) {
    tick.0 = host.current_tick();
}

pub fn sweep_dead_zones(
    config: Res<AetherConfigHandle>,
    tick: Res<SimulationTick>,
    mut schedule: ResMut<AetherSchedule>,
    mut store: ResMut<WorldStore>,
) {
    let interval = config.config().dead_zones().sweep_interval();
    if !schedule.dead_zone_sweep.ready(tick.0, interval) {
        return;
    }
    store.sweep_dead_zones(tick.0);
}

pub fn recover_aether<H: HostWorld>(
    config: Res<AetherConfigHandle>,
    tick: Res<SimulationTick>,
    host: Res<H>,
    mut schedule: ResMut<AetherSchedule>,
    mut store: ResMut<WorldStore>,
) {
    let interval = config.config().ledger().recovery_sweep_interval();
    if !schedule.ledger_recovery.ready(tick.0, interval) {
        return;
    }
    let restored = store.recover_loaded(&*host);
    if restored > 0 {
        log::debug!("ledger recovery at tick {} restored {restored} units", tick.0);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn process_corruption<H: HostWorld>(
    config: Res<AetherConfigHandle>,
    tick: Res<SimulationTick>,
    mut host: ResMut<H>,
    mut schedule: ResMut<AetherSchedule>,
    mut store: ResMut<WorldStore>,
    mut state: ResMut<DriverState>,
    mut telemetry: ResMut<CorruptionTelemetry>,
    mut events: EventWriter<CorruptionEvent>,
) {
    let config = config.get();
    if !schedule
        .corruption_window
        .ready(tick.0, config.corruption().check_interval())
    {
        return;
    }
    let mut report =
        CorruptionDriver::new(&config, &mut store, &mut *host, &mut state).run_window(tick.0);
    telemetry.record_window(&report);
    for event in report.events.drain(..) {
        events.send(event);
    }
}

pub fn autosave(
    config: Res<AetherConfigHandle>,
    tick: Res<SimulationTick>,
    backend: Option<Res<PersistenceBackend>>,
    mut schedule: ResMut<AetherSchedule>,
    mut store: ResMut<WorldStore>,
) {
    let Some(backend) = backend else {
        return;
    };
    let interval = config.config().persistence().autosave_interval();
    if interval == 0 || !store.is_dirty() {
        return;
    }
    if !schedule.autosave.ready(tick.0, interval) {
        return;
    }
    if let Err(err) = store.save(backend.0.as_ref()) {
        tracing::warn!(
            target: "aether::persistence",
            world = %store.world_id(),
            error = %err,
            "state.autosave_failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bevy::prelude::World;
    use bevy_ecs::system::RunSystemOnce;

    use super::*;
    use crate::aether_config::AetherConfig;
    use crate::components::{CellCoord, Quantities, ResourceKind};
    use crate::host::GridHost;
    use crate::persistence::MemoryBackend;

    fn world_with(config_json: &str) -> World {
        let config = Arc::new(AetherConfig::from_json_str(config_json).expect("config"));
        let mut world = World::default();
        world.insert_resource(WorldStore::new(&config));
        world.insert_resource(DriverState::new(&config));
        world.insert_resource(AetherConfigHandle::new(config));
        world.insert_resource(AetherSchedule::default());
        world.insert_resource(SimulationTick(0));
        world
    }

    #[test]
    fn autosave_writes_only_when_dirty_and_due() {
        let mut world = world_with(r#"{"persistence": {"autosave_interval": 50}}"#);
        let backend = MemoryBackend::new();
        world.insert_resource(PersistenceBackend::new(backend.clone()));

        world.run_system_once(autosave);
        assert!(backend.keys().is_empty(), "clean store is never written");

        world
            .resource_mut::<WorldStore>()
            .create_permanent_dead_zone(CellCoord::new(0, 0), 0);
        world.run_system_once(autosave);
        assert_eq!(backend.keys().len(), 4);
        assert!(!world.resource::<WorldStore>().is_dirty());

        world
            .resource_mut::<WorldStore>()
            .create_permanent_dead_zone(CellCoord::new(1, 0), 10);
        world.resource_mut::<SimulationTick>().0 = 10;
        world.run_system_once(autosave);
        assert!(world.resource::<WorldStore>().is_dirty(), "interval not yet elapsed");

        world.resource_mut::<SimulationTick>().0 = 60;
        world.run_system_once(autosave);
        assert!(!world.resource::<WorldStore>().is_dirty());
    }

    #[test]
    fn recovery_sweep_refills_loaded_ledgers() {
        let mut world = world_with(r#"{"ledger": {"cell_volume": 10, "recovery_rate": 2.0}}"#);
        let host = GridHost::new()
            .with_density("forest", &[("herba", 5)])
            .with_area("forest", (0, 1), (0, 1));
        world.insert_resource(host);
        let cell = CellCoord::new(0, 0);
        let herba = ResourceKind::new("herba");

        world.resource_scope(|world, mut store: Mut<WorldStore>| {
            let host = world.resource::<GridHost>();
            let request: Quantities = [(herba.clone(), 6)].into_iter().collect();
            assert!(store.harvest(host, cell, &request));
        });

        world.resource_mut::<GridHost>().set_tick(24_000 * 2);
        world.run_system_once(sync_tick::<GridHost>);
        world.run_system_once(recover_aether::<GridHost>);

        let store = world.resource::<WorldStore>();
        assert_eq!(store.ledger(cell).map(|ledger| ledger.current(&herba)), Some(48));
    }

    #[test]
    fn dead_zone_sweep_respects_its_interval() {
        let mut world = world_with(
            r#"{"dead_zones": {"recovery_interval_ticks": 10, "temporary_drain": 1.0, "sweep_interval": 100}}"#,
        );
        let cell = CellCoord::new(4, 4);
        world
            .resource_mut::<WorldStore>()
            .create_temporary_dead_zone(cell, None, 0);

        world.run_system_once(sweep_dead_zones);
        assert!(world.resource::<WorldStore>().is_dead_zone(cell));

        world.resource_mut::<SimulationTick>().0 = 50;
        world.run_system_once(sweep_dead_zones);
        assert!(world.resource::<WorldStore>().is_dead_zone(cell), "sweep not due yet");

        world.resource_mut::<SimulationTick>().0 = 100;
        world.run_system_once(sweep_dead_zones);
        assert!(!world.resource::<WorldStore>().is_dead_zone(cell));
    }
}
