//! Tick-window corruption controller.
//!
//! One window walks the loaded cells, groups them into regions and runs the
//! corruption state machine once per region. Everything durable lives in
//! [`WorldStore`]; the driver only keeps its RNG, interval gates and a
//! fairness cursor.

use std::collections::{HashMap, HashSet};

use bevy::prelude::Resource;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::aether_config::{AetherConfig, AetherDrainPolicy};
use crate::components::{CellCoord, ClassificationId, Quantities, ResourceKind};
use crate::corruption::{classify_vitium, split_vitium, CorruptionRecord, CorruptionStatus};
use crate::hashing::world_seed;
use crate::host::{HostWorld, MarkerPlacement, MarkerPosition};
use crate::ledger::ExhaustionTrigger;
use crate::region::{discover_region, Region, RegionFault};
use crate::resources::{CorruptionEvent, CorruptionEventKind, IntervalGate};
use crate::store::WorldStore;

/// Transient driver state. Safe to discard; a restart only reshuffles the RNG.
#[derive(Resource)]
pub struct DriverState {
    rng: SmallRng,
    transfer_gate: IntervalGate,
    consumption_gate: IntervalGate,
    marker_ids: Vec<String>,
    marker_weights: Option<WeightedIndex<u32>>,
    seed_cursor: usize,
}

impl DriverState {
    pub fn new(config: &AetherConfig) -> Self {
        let seed = world_seed(config.rng_seed(), config.world_id(), "driver");
        let table = config.markers().table();
        let marker_weights = WeightedIndex::new(table.iter().map(|entry| entry.weight)).ok();
        Self {
            rng: SmallRng::seed_from_u64(seed),
            transfer_gate: IntervalGate::default(),
            consumption_gate: IntervalGate::default(),
            marker_ids: table.iter().map(|entry| entry.id.clone()).collect(),
            marker_weights,
            seed_cursor: 0,
        }
    }
}

/// What one corruption window did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowReport {
    pub tick: u64,
    pub regions_processed: u32,
    pub cells_skipped: u32,
    pub region_faults: u32,
    pub deferred_seeds: u32,
    pub markers_placed: u32,
    pub transfers: u32,
    pub aether_consumed: u32,
    pub dead_zones_created: u32,
    pub events: Vec<CorruptionEvent>,
}

impl WindowReport {
    fn push(&mut self, region: &Region, kind: CorruptionEventKind) {
        self.events.push(CorruptionEvent {
            tick: self.tick,
            representative: region.representative(),
            classification: region.classification().clone(),
            kind,
        });
    }
}

pub struct CorruptionDriver<'a> {
    config: &'a AetherConfig,
    store: &'a mut WorldStore,
    host: &'a mut dyn HostWorld,
    state: &'a mut DriverState,
}

impl<'a> CorruptionDriver<'a> {
    pub fn new(
        config: &'a AetherConfig,
        store: &'a mut WorldStore,
        host: &'a mut dyn HostWorld,
        state: &'a mut DriverState,
    ) -> Self {
        Self {
            config,
            store,
            host,
            state,
        }
    }

    /// Runs one window at `tick`. Faults in one region never stop the rest.
    pub fn run_window(&mut self, tick: u64) -> WindowReport {
        let corruption = self.config.corruption();
        let transfer_due = self
            .state
            .transfer_gate
            .ready(tick, corruption.aspect_transfer_interval());
        let consumption_due = self
            .state
            .consumption_gate
            .ready(tick, corruption.aether_consumption_interval());
        let max_regions = corruption.max_regions_per_window();
        let bounds = self.store.settings().region_bounds;

        let mut report = WindowReport {
            tick,
            ..WindowReport::default()
        };

        let mut seeds = self.host.loaded_cells();
        seeds.sort_unstable();
        seeds.dedup();
        if seeds.is_empty() {
            return report;
        }
        let start = self.state.seed_cursor % seeds.len();
        seeds.rotate_left(start);

        let mut cache: HashMap<CellCoord, Option<ClassificationId>> = HashMap::new();
        let mut assigned: HashSet<CellCoord> = HashSet::new();
        let mut attempted = 0usize;

        for (index, seed) in seeds.iter().copied().enumerate() {
            if assigned.contains(&seed) {
                continue;
            }
            if attempted >= max_regions {
                report.deferred_seeds = seeds[index..]
                    .iter()
                    .filter(|cell| !assigned.contains(*cell))
                    .count() as u32;
                self.state.seed_cursor = (start + index) % seeds.len();
                break;
            }

            let host: &dyn HostWorld = &*self.host;
            let classification = cache
                .entry(seed)
                .or_insert_with(|| host.terrain_classification(seed))
                .clone();
            let Some(classification) = classification else {
                report.cells_skipped += 1;
                log::debug!("skipping cell {seed}: classification unresolved");
                continue;
            };

            let region = discover_region(
                seed,
                &classification,
                bounds,
                |cell| host.is_cell_loaded(cell),
                |cell| {
                    cache
                        .entry(cell)
                        .or_insert_with(|| host.terrain_classification(cell))
                        .clone()
                },
            );
            assigned.extend(region.cells().iter().copied());
            attempted += 1;

            match self.process_region(&region, transfer_due, consumption_due, &mut report) {
                Ok(()) => report.regions_processed += 1,
                Err(fault) => {
                    report.region_faults += 1;
                    log::warn!(
                        "corruption window at tick {tick} skipped region {}: {fault}",
                        region.representative()
                    );
                }
            }
        }
        report
    }

    fn process_region(
        &mut self,
        region: &Region,
        transfer_due: bool,
        consumption_due: bool,
        report: &mut WindowReport,
    ) -> Result<(), RegionFault> {
        let representative = region.representative();
        if !self.host.is_cell_loaded(representative) {
            return Err(RegionFault::CellUnloaded(representative));
        }
        let classification = region.classification();
        let vitium_kind = self.store.vitium_kind().clone();
        let quantities = self
            .store
            .quantities_for(&*self.host, representative, classification);
        let (vitium, others) = split_vitium(&quantities, &vitium_kind);
        let status = classify_vitium(vitium, others);
        log::debug!(
            "region {representative} ({classification}, {} cells): vitium {vitium}, others {others} -> {status}",
            region.len()
        );

        if status == CorruptionStatus::Pure {
            for cell in region.cells() {
                let recovering = self.store.dead_zones().is_temporary(*cell)
                    && self
                        .store
                        .record(*cell)
                        .is_some_and(CorruptionRecord::has_corruption_history);
                let settled = if recovering {
                    CorruptionStatus::Regenerating
                } else {
                    CorruptionStatus::Pure
                };
                self.set_status(region, *cell, settled, report);
            }
            return Ok(());
        }

        for cell in region.cells() {
            self.set_status(region, *cell, status, report);
        }
        if status != CorruptionStatus::Corrupted {
            return Ok(());
        }

        self.spread_marker(region, report);
        if transfer_due && others > 0 {
            self.transfer_aspect(region, &quantities, &vitium_kind, report);
        }
        let drain_open = match self.config.corruption().aether_drain_policy() {
            AetherDrainPolicy::OnlyVitiumRemains => others == 0,
            AetherDrainPolicy::OnCorrupted => true,
        };
        if drain_open && consumption_due {
            self.consume_aether(region, &vitium_kind, report)?;
        }
        Ok(())
    }

    fn set_status(
        &mut self,
        region: &Region,
        cell: CellCoord,
        status: CorruptionStatus,
        report: &mut WindowReport,
    ) {
        let transition =
            self.store
                .update_status(cell, region.classification(), status, report.tick);
        if let Some(transition) = transition {
            if cell == region.representative() {
                report.push(
                    region,
                    CorruptionEventKind::StatusChanged {
                        from: transition.from,
                        to: transition.to,
                    },
                );
            }
        }
    }

    /// Rolls the marker chance and tries a bounded number of spots.
    fn spread_marker(&mut self, region: &Region, report: &mut WindowReport) {
        let markers = self.config.markers();
        let Some(weights) = self.state.marker_weights.as_ref() else {
            return;
        };
        if region.is_empty() || !self.state.rng.gen_bool(markers.chance()) {
            return;
        }
        let edge = markers.cell_edge().max(1);
        for _ in 0..markers.attempts() {
            let cell = region.cells()[self.state.rng.gen_range(0..region.len())];
            if self.store.marker_count(cell) >= markers.max_per_cell() {
                continue;
            }
            let position = MarkerPosition {
                cell,
                local_x: self.state.rng.gen_range(0..edge),
                local_z: self.state.rng.gen_range(0..edge),
            };
            let marker = self.state.marker_ids[weights.sample(&mut self.state.rng)].clone();
            let placement = MarkerPlacement { position, marker };
            if self.host.place_decay_marker(&placement) {
                self.host.emit_ambient_effect(position);
                self.store
                    .record_marker(cell, region.classification(), report.tick);
                report.markers_placed += 1;
                report.push(region, CorruptionEventKind::MarkerPlaced(placement));
                return;
            }
        }
    }

    /// Moves one unit of a random non-vitium kind into vitium on every cell.
    fn transfer_aspect(
        &mut self,
        region: &Region,
        quantities: &Quantities,
        vitium_kind: &ResourceKind,
        report: &mut WindowReport,
    ) {
        let candidates: Vec<&ResourceKind> = quantities
            .iter()
            .filter(|(kind, amount)| *kind != vitium_kind && **amount > 0)
            .map(|(kind, _)| kind)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let kind = candidates[self.state.rng.gen_range(0..candidates.len())].clone();

        let mut moved = false;
        for cell in region.cells() {
            let available = self
                .store
                .quantities_for(&*self.host, *cell, region.classification())
                .get(&kind)
                .copied()
                .unwrap_or(0);
            let taken = available.min(1);
            if taken <= 0 {
                continue;
            }
            let deltas: Quantities = [(kind.clone(), -taken), (vitium_kind.clone(), taken)]
                .into_iter()
                .collect();
            self.store
                .record_bulk_delta(*cell, region.classification(), &deltas, report.tick);
            moved = true;
        }
        if moved {
            report.transfers += 1;
            report.push(region, CorruptionEventKind::AspectTransferred { kind });
        }
    }

    /// Drains one unit from the representative ledger, or collapses the
    /// region when nothing is left.
    fn consume_aether(
        &mut self,
        region: &Region,
        vitium_kind: &ResourceKind,
        report: &mut WindowReport,
    ) -> Result<(), RegionFault> {
        let tick = report.tick;
        let representative = region.representative();
        let classification = region.classification();

        let next_kind = if self.store.is_dead_zone(representative) {
            None
        } else {
            let ledger = self
                .store
                .ledger_or_seed(&*self.host, representative)
                .ok_or(RegionFault::ClassificationUnresolved(representative))?;
            let preferred = ledger
                .stock()
                .find(|(kind, stock)| *kind != vitium_kind && stock.current > 0)
                .map(|(kind, _)| kind.clone());
            preferred.or_else(|| (ledger.current(vitium_kind) > 0).then(|| vitium_kind.clone()))
        };

        match next_kind {
            Some(kind) => {
                let request: Quantities = [(kind.clone(), 1)].into_iter().collect();
                let receipt = match self
                    .store
                    .try_harvest(&*self.host, representative, &request)
                {
                    Ok(receipt) => receipt,
                    Err(rejection) => {
                        log::debug!("aether drain at {representative} rejected: {rejection}");
                        return Ok(());
                    }
                };
                for cell in region.cells() {
                    self.store
                        .record_delta(*cell, classification, vitium_kind, 1, tick);
                }
                self.store
                    .record_aether_consumption(representative, classification, &kind, 1, tick);
                report.aether_consumed += 1;
                report.push(region, CorruptionEventKind::AetherConsumed { kind });
                if receipt.exhaustion.is_some() {
                    report.dead_zones_created += 1;
                    let permanent = self.store.is_permanent_dead_zone(representative);
                    report.push(region, CorruptionEventKind::DeadZoneCreated { permanent });
                }
            }
            None => {
                if !self.store.is_dead_zone(representative) {
                    let zone =
                        self.store
                            .enter_dead_zone(representative, ExhaustionTrigger::Consumed, tick);
                    report.dead_zones_created += 1;
                    report.push(
                        region,
                        CorruptionEventKind::DeadZoneCreated {
                            permanent: zone.is_permanent(),
                        },
                    );
                }
                self.erase_region(region, report);
            }
        }
        Ok(())
    }

    /// Zeroes every quantity on every region cell and marks them regenerating.
    fn erase_region(&mut self, region: &Region, report: &mut WindowReport) {
        let classification = region.classification();
        for cell in region.cells() {
            let remaining = self
                .store
                .quantities_for(&*self.host, *cell, classification);
            let deltas: Quantities = remaining
                .into_iter()
                .map(|(kind, amount)| (kind, -amount))
                .collect();
            self.store
                .record_bulk_delta(*cell, classification, &deltas, report.tick);
            self.set_status(region, *cell, CorruptionStatus::Regenerating, report);
        }
        report.push(
            region,
            CorruptionEventKind::RegionErased {
                cells: region.len(),
            },
        );
    }
}
