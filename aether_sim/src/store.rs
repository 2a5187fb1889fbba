//! World-scoped owner of every ledger, dead zone and corruption record.
//!
//! All mutation goes through [`WorldStore`]; each mutating path marks the
//! store dirty and clean corruption records are evicted as soon as they
//! become prunable.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use bevy::prelude::Resource;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::aether_config::AetherConfig;
use crate::components::{CellCoord, ClassificationId, Quantities, ResourceKind};
use crate::corruption::{split_vitium, CorruptionRecord, CorruptionStatus, StatusTransition};
use crate::dead_zone::{DeadZone, DeadZoneTable, RecoverySweep};
use crate::hashing::world_seed;
use crate::host::HostWorld;
use crate::ledger::{
    ExhaustionTrigger, HarvestReceipt, HarvestRejection, LedgerSettings, ResourceLedger,
};
use crate::modifiers::ClassificationModifiers;
use crate::region::{discover_region, Region, RegionBounds, RegionFault};

/// Store tunables lifted out of [`AetherConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub ledger: LedgerSettings,
    pub vitium: ResourceKind,
    pub temporary_drain: f64,
    pub recovery_interval: u64,
    pub permanent_chance: f64,
    pub region_bounds: RegionBounds,
}

impl StoreSettings {
    pub fn from_config(config: &AetherConfig) -> Self {
        Self {
            ledger: LedgerSettings::from_config(config),
            vitium: config.vitium_kind(),
            temporary_drain: config.dead_zones().temporary_drain(),
            recovery_interval: config.dead_zones().recovery_interval_ticks(),
            permanent_chance: config.dead_zones().permanent_chance(),
            region_bounds: RegionBounds {
                max_radius: config.regions().max_radius(),
                max_cells: config.regions().max_cells(),
            },
        }
    }
}

/// A connected group of corrupted cells with one classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptedRegion {
    pub classification: ClassificationId,
    pub representative: CellCoord,
    pub cells: Vec<CellCoord>,
}

#[derive(Resource)]
pub struct WorldStore {
    world_id: String,
    settings: StoreSettings,
    pub(crate) ledgers: BTreeMap<CellCoord, ResourceLedger>,
    pub(crate) dead_zones: DeadZoneTable,
    pub(crate) records: BTreeMap<CellCoord, CorruptionRecord>,
    pub(crate) modifiers: ClassificationModifiers,
    collapse_rng: SmallRng,
    dirty: bool,
}

impl WorldStore {
    pub fn new(config: &AetherConfig) -> Self {
        let seed = world_seed(config.rng_seed(), config.world_id(), "collapse");
        Self {
            world_id: config.world_id().to_string(),
            settings: StoreSettings::from_config(config),
            ledgers: BTreeMap::new(),
            dead_zones: DeadZoneTable::default(),
            records: BTreeMap::new(),
            modifiers: ClassificationModifiers::default(),
            collapse_rng: SmallRng::seed_from_u64(seed),
            dirty: false,
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn vitium_kind(&self) -> &ResourceKind {
        &self.settings.vitium
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn ledger(&self, cell: CellCoord) -> Option<&ResourceLedger> {
        self.ledgers.get(&cell)
    }

    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }

    pub fn dead_zones(&self) -> &DeadZoneTable {
        &self.dead_zones
    }

    pub fn modifiers(&self) -> &ClassificationModifiers {
        &self.modifiers
    }

    pub fn records(&self) -> impl Iterator<Item = (&CellCoord, &CorruptionRecord)> {
        self.records.iter()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    // Aether ledger ----------------------------------------------------------

    /// Base density for `cell` with the classification modifiers applied.
    fn seed_density(&self, host: &dyn HostWorld, cell: CellCoord) -> Option<Quantities> {
        let classification = host.terrain_classification(cell)?;
        Some(
            self.modifiers
                .apply(&classification, &host.base_resource_density(&classification)),
        )
    }

    /// The stored ledger, or the one that would be seeded on first touch.
    fn preview_ledger(&self, host: &dyn HostWorld, cell: CellCoord) -> Option<Cow<'_, ResourceLedger>> {
        if self.dead_zones.contains(cell) {
            return None;
        }
        if let Some(ledger) = self.ledgers.get(&cell) {
            return Some(Cow::Borrowed(ledger));
        }
        let density = self.seed_density(host, cell)?;
        Some(Cow::Owned(ResourceLedger::seeded(
            &density,
            &self.settings.ledger,
            host.current_tick(),
        )))
    }

    /// Fetches the ledger for `cell`, seeding it on first touch. Dead zones
    /// and unresolvable cells have none.
    pub fn ledger_or_seed(
        &mut self,
        host: &dyn HostWorld,
        cell: CellCoord,
    ) -> Option<&mut ResourceLedger> {
        if self.dead_zones.contains(cell) {
            return None;
        }
        if !self.ledgers.contains_key(&cell) {
            let density = self.seed_density(host, cell)?;
            let ledger = ResourceLedger::seeded(&density, &self.settings.ledger, host.current_tick());
            self.ledgers.insert(cell, ledger);
            self.dirty = true;
        }
        self.ledgers.get_mut(&cell)
    }

    pub fn check_harvest(
        &self,
        host: &dyn HostWorld,
        cell: CellCoord,
        request: &Quantities,
    ) -> Result<(), HarvestRejection> {
        if self.dead_zones.contains(cell) {
            return Err(HarvestRejection::DeadZone);
        }
        let ledger = self
            .preview_ledger(host, cell)
            .ok_or(HarvestRejection::Unavailable)?;
        ledger.check_harvest(request)
    }

    pub fn can_harvest(&self, host: &dyn HostWorld, cell: CellCoord, request: &Quantities) -> bool {
        self.check_harvest(host, cell, request).is_ok()
    }

    /// Harvests the whole bundle or nothing. Exhausting the ledger moves
    /// the cell into a dead zone.
    pub fn try_harvest(
        &mut self,
        host: &dyn HostWorld,
        cell: CellCoord,
        request: &Quantities,
    ) -> Result<HarvestReceipt, HarvestRejection> {
        if self.dead_zones.contains(cell) {
            return Err(HarvestRejection::DeadZone);
        }
        let tick = host.current_tick();
        let settings = self.settings.ledger;
        let ledger = self
            .ledger_or_seed(host, cell)
            .ok_or(HarvestRejection::Unavailable)?;
        let receipt = ledger.try_harvest(request, tick, &settings)?;
        self.dirty = true;
        if let Some(trigger) = receipt.exhaustion {
            self.enter_dead_zone(cell, trigger, tick);
        }
        Ok(receipt)
    }

    pub fn harvest(&mut self, host: &dyn HostWorld, cell: CellCoord, request: &Quantities) -> bool {
        self.try_harvest(host, cell, request).is_ok()
    }

    pub fn get_current(&self, host: &dyn HostWorld, cell: CellCoord, kind: &ResourceKind) -> i64 {
        self.preview_ledger(host, cell)
            .map_or(0, |ledger| ledger.current(kind))
    }

    pub fn get_max(&self, host: &dyn HostWorld, cell: CellCoord, kind: &ResourceKind) -> i64 {
        self.preview_ledger(host, cell)
            .map_or(0, |ledger| ledger.max(kind))
    }

    pub fn get_percentage(&self, host: &dyn HostWorld, cell: CellCoord, kind: &ResourceKind) -> f64 {
        self.preview_ledger(host, cell)
            .map_or(0.0, |ledger| ledger.percentage(kind))
    }

    /// Host density scaled by the dead-zone multiplier, rounded down.
    pub fn effective_density(&self, host: &dyn HostWorld, cell: CellCoord) -> Quantities {
        let multiplier = self.dead_zones.multiplier(cell);
        let mut density = self.seed_density(host, cell).unwrap_or_default();
        for amount in density.values_mut() {
            *amount = (*amount as f64 * multiplier).floor() as i64;
        }
        density.retain(|_, amount| *amount > 0);
        density
    }

    pub fn is_dead_zone(&self, cell: CellCoord) -> bool {
        self.dead_zones.contains(cell)
    }

    pub fn is_permanent_dead_zone(&self, cell: CellCoord) -> bool {
        self.dead_zones.is_permanent(cell)
    }

    pub fn efficiency_multiplier(&self, cell: CellCoord) -> f64 {
        self.dead_zones.multiplier(cell)
    }

    /// Applies whole-day recovery to one cell. Dead zones do not recover
    /// this way.
    pub fn force_recovery(&mut self, host: &dyn HostWorld, cell: CellCoord) -> i64 {
        let tick = host.current_tick();
        let settings = self.settings.ledger;
        let Some(ledger) = self.ledger_or_seed(host, cell) else {
            return 0;
        };
        let before = ledger.last_recovery_tick();
        let restored = ledger.recover(tick, &settings);
        if restored > 0 || ledger.last_recovery_tick() != before {
            self.dirty = true;
        }
        restored
    }

    /// Recovery sweep over every loaded cell that already has a ledger.
    pub fn recover_loaded(&mut self, host: &dyn HostWorld) -> i64 {
        let tick = host.current_tick();
        let settings = self.settings.ledger;
        let mut restored = 0i64;
        for cell in host.loaded_cells() {
            let Some(ledger) = self.ledgers.get_mut(&cell) else {
                continue;
            };
            let before = ledger.last_recovery_tick();
            restored = restored.saturating_add(ledger.recover(tick, &settings));
            if ledger.last_recovery_tick() != before {
                self.dirty = true;
            }
        }
        restored
    }

    pub fn sweep_dead_zones(&mut self, tick: u64) -> RecoverySweep {
        let sweep = self.dead_zones.recover(tick, self.settings.recovery_interval);
        if sweep.changed() {
            self.dirty = true;
        }
        for cell in &sweep.lifted {
            tracing::info!(
                target: "aether::dead_zone",
                world = %self.world_id,
                %cell,
                tick,
                "dead_zone.lifted"
            );
        }
        sweep
    }

    /// Moves `cell` into a dead zone after its aether collapsed. Overharvest
    /// is always permanent; otherwise permanence is rolled once here.
    pub fn enter_dead_zone(&mut self, cell: CellCoord, trigger: ExhaustionTrigger, tick: u64) -> DeadZone {
        let permanent = match trigger {
            ExhaustionTrigger::Overharvested => true,
            ExhaustionTrigger::Depleted | ExhaustionTrigger::Consumed => {
                self.collapse_rng.gen_bool(self.settings.permanent_chance)
            }
        };
        if permanent {
            self.dead_zones.insert_permanent(cell, tick);
        } else {
            self.dead_zones.insert_temporary(
                cell,
                self.settings.temporary_drain,
                tick,
                self.settings.recovery_interval,
            );
        }
        self.ledgers.remove(&cell);
        self.dirty = true;

        let zone = self
            .dead_zones
            .get(cell)
            .map_or(DeadZone::Permanent, |entry| entry.zone.clone());
        tracing::info!(
            target: "aether::dead_zone",
            world = %self.world_id,
            %cell,
            tick,
            ?trigger,
            permanent = zone.is_permanent(),
            "dead_zone.created"
        );
        zone
    }

    pub fn create_temporary_dead_zone(&mut self, cell: CellCoord, drain: Option<f64>, tick: u64) -> bool {
        let drain = drain.unwrap_or(self.settings.temporary_drain);
        if !self
            .dead_zones
            .insert_temporary(cell, drain, tick, self.settings.recovery_interval)
        {
            return false;
        }
        self.ledgers.remove(&cell);
        self.dirty = true;
        true
    }

    pub fn create_permanent_dead_zone(&mut self, cell: CellCoord, tick: u64) {
        self.dead_zones.insert_permanent(cell, tick);
        self.ledgers.remove(&cell);
        self.dirty = true;
    }

    /// Admin override; lifts either kind of zone. The next access seeds a
    /// fresh ledger.
    pub fn remove_dead_zone(&mut self, cell: CellCoord) -> bool {
        let removed = self.dead_zones.remove(cell).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    // Corruption records -----------------------------------------------------

    pub fn record(&self, cell: CellCoord) -> Option<&CorruptionRecord> {
        self.records.get(&cell)
    }

    /// Creates the record on first touch. Always marks the store dirty.
    pub(crate) fn record_or_create(
        &mut self,
        cell: CellCoord,
        classification: Option<&ClassificationId>,
    ) -> &mut CorruptionRecord {
        self.dirty = true;
        let record = self
            .records
            .entry(cell)
            .or_insert_with(|| CorruptionRecord::new(classification.cloned()));
        if let Some(classification) = classification {
            record.set_classification(classification);
        }
        record
    }

    /// Drops the record for `cell` when it no longer carries information.
    pub fn prune_if_clean(&mut self, cell: CellCoord) -> bool {
        if self.records.get(&cell).is_some_and(CorruptionRecord::is_prunable) {
            self.records.remove(&cell);
            self.dirty = true;
            return true;
        }
        false
    }

    pub fn status(&self, cell: CellCoord) -> CorruptionStatus {
        self.records
            .get(&cell)
            .map_or(CorruptionStatus::Pure, CorruptionRecord::status)
    }

    pub fn update_status(
        &mut self,
        cell: CellCoord,
        classification: &ClassificationId,
        status: CorruptionStatus,
        tick: u64,
    ) -> Option<StatusTransition> {
        if status == CorruptionStatus::Pure && !self.records.contains_key(&cell) {
            return None;
        }
        let transition = self
            .record_or_create(cell, Some(classification))
            .set_status(status, tick);
        self.prune_if_clean(cell);
        transition
    }

    pub fn record_delta(
        &mut self,
        cell: CellCoord,
        classification: &ClassificationId,
        kind: &ResourceKind,
        delta: i64,
        tick: u64,
    ) {
        if delta == 0 {
            return;
        }
        self.record_or_create(cell, Some(classification))
            .record_delta(kind, delta, tick);
        self.prune_if_clean(cell);
    }

    pub fn record_bulk_delta(
        &mut self,
        cell: CellCoord,
        classification: &ClassificationId,
        deltas: &Quantities,
        tick: u64,
    ) {
        if deltas.values().all(|delta| *delta == 0) {
            return;
        }
        let record = self.record_or_create(cell, Some(classification));
        for (kind, delta) in deltas {
            record.record_delta(kind, *delta, tick);
        }
        self.prune_if_clean(cell);
    }

    pub fn record_aether_consumption(
        &mut self,
        cell: CellCoord,
        classification: &ClassificationId,
        kind: &ResourceKind,
        amount: i64,
        tick: u64,
    ) {
        if amount <= 0 {
            return;
        }
        self.record_or_create(cell, Some(classification))
            .record_aether_consumed(kind, amount, tick);
        self.prune_if_clean(cell);
    }

    pub fn record_marker(&mut self, cell: CellCoord, classification: &ClassificationId, tick: u64) {
        self.record_or_create(cell, Some(classification))
            .record_marker(tick);
    }

    pub fn marker_count(&self, cell: CellCoord) -> u32 {
        self.records
            .get(&cell)
            .map_or(0, CorruptionRecord::marker_placements)
    }

    /// Corruption-side quantities of one cell: base density, classification
    /// modifiers and the cell's accumulated deltas, floored at zero.
    pub fn quantities_for(
        &self,
        host: &dyn HostWorld,
        cell: CellCoord,
        classification: &ClassificationId,
    ) -> Quantities {
        let mut quantities = self
            .modifiers
            .apply(classification, &host.base_resource_density(classification));
        if let Some(record) = self.records.get(&cell) {
            for (kind, delta) in record.resource_deltas() {
                let entry = quantities.entry(kind.clone()).or_insert(0);
                *entry = entry.saturating_add(*delta);
            }
        }
        quantities.retain(|_, amount| *amount > 0);
        quantities
    }

    pub fn cell_quantities(
        &self,
        host: &dyn HostWorld,
        cell: CellCoord,
    ) -> Result<(ClassificationId, Quantities), RegionFault> {
        let classification = host
            .terrain_classification(cell)
            .ok_or(RegionFault::ClassificationUnresolved(cell))?;
        let quantities = self.quantities_for(host, cell, &classification);
        Ok((classification, quantities))
    }

    pub fn vitium_level(&self, host: &dyn HostWorld, cell: CellCoord) -> i64 {
        self.cell_quantities(host, cell)
            .map_or(0, |(_, quantities)| split_vitium(&quantities, &self.settings.vitium).0)
    }

    pub fn corruption_ratio(&self, host: &dyn HostWorld, cell: CellCoord) -> f64 {
        self.cell_quantities(host, cell).map_or(0.0, |(_, quantities)| {
            let (vitium, others) = split_vitium(&quantities, &self.settings.vitium);
            crate::corruption::corruption_ratio(vitium, others)
        })
    }

    /// Region containing `seed`, found with the configured bounds.
    pub fn discover_region_at(&self, host: &dyn HostWorld, seed: CellCoord) -> Result<Region, RegionFault> {
        if !host.is_cell_loaded(seed) {
            return Err(RegionFault::CellUnloaded(seed));
        }
        let classification = host
            .terrain_classification(seed)
            .ok_or(RegionFault::ClassificationUnresolved(seed))?;
        Ok(discover_region(
            seed,
            &classification,
            self.settings.region_bounds,
            |cell| host.is_cell_loaded(cell),
            |cell| host.terrain_classification(cell),
        ))
    }

    /// Adds `amount` vitium to every cell of the region around `cell`.
    /// Returns the number of cells touched.
    pub fn inject_vitium(
        &mut self,
        host: &dyn HostWorld,
        cell: CellCoord,
        amount: i64,
    ) -> Result<usize, RegionFault> {
        if amount <= 0 {
            return Ok(0);
        }
        let region = self.discover_region_at(host, cell)?;
        let tick = host.current_tick();
        let vitium = self.settings.vitium.clone();
        for member in region.cells() {
            self.record_delta(*member, region.classification(), &vitium, amount, tick);
        }
        Ok(region.len())
    }

    /// Strips all vitium from the region around `cell` and marks it Pure.
    pub fn purify_region(&mut self, host: &dyn HostWorld, cell: CellCoord) -> Result<usize, RegionFault> {
        let region = self.discover_region_at(host, cell)?;
        let tick = host.current_tick();
        let vitium = self.settings.vitium.clone();
        for member in region.cells() {
            let present = self
                .quantities_for(host, *member, region.classification())
                .get(&vitium)
                .copied()
                .unwrap_or(0);
            if present > 0 {
                self.record_delta(*member, region.classification(), &vitium, -present, tick);
            }
            self.update_status(*member, region.classification(), CorruptionStatus::Pure, tick);
        }
        Ok(region.len())
    }

    /// Raises vitium across a whole classification.
    pub fn force_corruption(&mut self, classification: &ClassificationId, amount: i64) -> bool {
        let vitium = self.settings.vitium.clone();
        let changed = self.modifiers.add(classification, &vitium, amount);
        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Removes the classification-wide vitium modifier and returns it.
    pub fn purify_classification(&mut self, classification: &ClassificationId) -> i64 {
        let vitium = self.settings.vitium.clone();
        let removed = self.modifiers.clear_kind(classification, &vitium);
        if removed != 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn add_classification_modifier(
        &mut self,
        classification: &ClassificationId,
        kind: &ResourceKind,
        amount: i64,
    ) -> bool {
        let changed = self.modifiers.add(classification, kind, amount);
        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Corrupted cells grouped into connected same-classification regions.
    pub fn list_corrupted_regions(&self) -> Vec<CorruptedRegion> {
        let corrupted: BTreeMap<CellCoord, ClassificationId> = self
            .records
            .iter()
            .filter(|(_, record)| record.status() == CorruptionStatus::Corrupted)
            .map(|(cell, record)| {
                let classification = record
                    .classification()
                    .cloned()
                    .unwrap_or_else(|| ClassificationId::new("unknown"));
                (*cell, classification)
            })
            .collect();

        let bounds = RegionBounds {
            max_radius: u32::MAX,
            max_cells: corrupted.len().max(1),
        };
        let mut assigned = BTreeSet::new();
        let mut regions = Vec::new();
        for (seed, classification) in &corrupted {
            if assigned.contains(seed) {
                continue;
            }
            let region = discover_region(
                *seed,
                classification,
                bounds,
                |cell| corrupted.contains_key(&cell),
                |cell| corrupted.get(&cell).cloned(),
            );
            let mut cells = region.cells().to_vec();
            assigned.extend(cells.iter().copied());
            cells.sort_unstable();
            regions.push(CorruptedRegion {
                classification: classification.clone(),
                representative: *seed,
                cells,
            });
        }
        regions
    }

    pub fn status_counts(&self) -> BTreeMap<CorruptionStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.status()).or_insert(0) += 1;
        }
        counts
    }
}
