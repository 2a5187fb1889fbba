use bevy::prelude::*;

use crate::corruption::CorruptionStatus;
use crate::resources::SimulationTick;
use crate::store::WorldStore;

#[derive(Resource, Default, Debug, Clone, PartialEq, Eq)]
pub struct AetherMetrics {
    pub tick: u64,
    pub updates: u64,
    pub ledgers: usize,
    pub temporary_dead_zones: usize,
    pub permanent_dead_zones: usize,
    pub corruption_records: usize,
    pub tainted_cells: usize,
    pub corrupted_cells: usize,
    pub regenerating_cells: usize,
    pub dirty: bool,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    store: Res<WorldStore>,
    mut metrics: ResMut<AetherMetrics>,
) {
    metrics.updates += 1;
    metrics.tick = tick.0;
    metrics.ledgers = store.ledger_count();

    let zones = store.dead_zones();
    metrics.permanent_dead_zones = zones.permanent_count();
    metrics.temporary_dead_zones = zones.len() - metrics.permanent_dead_zones;

    let counts = store.status_counts();
    let count = |status: CorruptionStatus| counts.get(&status).copied().unwrap_or(0);
    metrics.corruption_records = store.record_count();
    metrics.tainted_cells = count(CorruptionStatus::Tainted);
    metrics.corrupted_cells = count(CorruptionStatus::Corrupted);
    metrics.regenerating_cells = count(CorruptionStatus::Regenerating);
    metrics.dirty = store.is_dirty();
}
