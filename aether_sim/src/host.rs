//! The capabilities the simulation borrows from the world it runs inside.

use std::collections::{BTreeSet, HashMap, HashSet};

use bevy::prelude::Resource;

use crate::components::{CellCoord, ClassificationId, Quantities, ResourceKind};

/// A spot inside a cell, in cell-local block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerPosition {
    pub cell: CellCoord,
    pub local_x: u32,
    pub local_z: u32,
}

/// A request to show one decay marker from the weighted marker table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPlacement {
    pub position: MarkerPosition,
    pub marker: String,
}

/// Host world services consumed by the simulation.
///
/// Classification and density lookups may fail transiently; a `None`
/// classification means the cell is skipped until a later window.
pub trait HostWorld: Resource {
    fn terrain_classification(&self, cell: CellCoord) -> Option<ClassificationId>;

    /// Seed quantities for new ledgers of this classification.
    fn base_resource_density(&self, classification: &ClassificationId) -> Quantities;

    fn is_cell_loaded(&self, cell: CellCoord) -> bool;

    /// Every loaded cell; corruption windows seed regions from this list.
    fn loaded_cells(&self) -> Vec<CellCoord>;

    fn current_tick(&self) -> u64;

    /// Best effort. Returning false just means nothing was placed.
    fn place_decay_marker(&mut self, placement: &MarkerPlacement) -> bool;

    fn emit_ambient_effect(&mut self, _position: MarkerPosition) {}
}

/// In-memory host backed by a classification grid.
#[derive(Resource, Debug, Clone, Default)]
pub struct GridHost {
    classifications: HashMap<CellCoord, ClassificationId>,
    densities: HashMap<ClassificationId, Quantities>,
    loaded: BTreeSet<CellCoord>,
    unresolvable: HashSet<CellCoord>,
    occupied: HashSet<MarkerPosition>,
    markers: Vec<MarkerPlacement>,
    effects: Vec<MarkerPosition>,
    tick: u64,
}

impl GridHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_density(mut self, classification: &str, density: &[(&str, i64)]) -> Self {
        self.set_density(classification, density);
        self
    }

    pub fn set_density(&mut self, classification: &str, density: &[(&str, i64)]) {
        let quantities = density
            .iter()
            .map(|(kind, amount)| (ResourceKind::new(*kind), *amount))
            .collect();
        self.densities
            .insert(ClassificationId::new(classification), quantities);
    }

    /// Classifies and loads every cell in `[x0, x1) x [z0, z1)`.
    pub fn with_area(mut self, classification: &str, x: (i32, i32), z: (i32, i32)) -> Self {
        self.fill(classification, x, z);
        self
    }

    pub fn fill(&mut self, classification: &str, x: (i32, i32), z: (i32, i32)) {
        let id = ClassificationId::new(classification);
        for cz in z.0..z.1 {
            for cx in x.0..x.1 {
                let cell = CellCoord::new(cx, cz);
                self.classifications.insert(cell, id.clone());
                self.loaded.insert(cell);
            }
        }
    }

    pub fn set_classification(&mut self, cell: CellCoord, classification: &str) {
        self.classifications
            .insert(cell, ClassificationId::new(classification));
        self.loaded.insert(cell);
    }

    pub fn load(&mut self, cell: CellCoord) {
        if self.classifications.contains_key(&cell) {
            self.loaded.insert(cell);
        }
    }

    pub fn unload(&mut self, cell: CellCoord) {
        self.loaded.remove(&cell);
    }

    /// Makes classification lookups for `cell` fail until restored.
    pub fn break_classification(&mut self, cell: CellCoord) {
        self.unresolvable.insert(cell);
    }

    pub fn restore_classification(&mut self, cell: CellCoord) {
        self.unresolvable.remove(&cell);
    }

    pub fn advance(&mut self, ticks: u64) {
        self.tick = self.tick.wrapping_add(ticks);
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn markers(&self) -> &[MarkerPlacement] {
        &self.markers
    }

    pub fn effects(&self) -> &[MarkerPosition] {
        &self.effects
    }
}

impl HostWorld for GridHost {
    fn terrain_classification(&self, cell: CellCoord) -> Option<ClassificationId> {
        if self.unresolvable.contains(&cell) {
            return None;
        }
        self.classifications.get(&cell).cloned()
    }

    fn base_resource_density(&self, classification: &ClassificationId) -> Quantities {
        self.densities
            .get(classification)
            .cloned()
            .unwrap_or_default()
    }

    fn is_cell_loaded(&self, cell: CellCoord) -> bool {
        self.loaded.contains(&cell)
    }

    fn loaded_cells(&self) -> Vec<CellCoord> {
        self.loaded.iter().copied().collect()
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn place_decay_marker(&mut self, placement: &MarkerPlacement) -> bool {
        if !self.loaded.contains(&placement.position.cell) {
            return false;
        }
        if !self.occupied.insert(placement.position) {
            return false;
        }
        self.markers.push(placement.clone());
        true
    }

    fn emit_ambient_effect(&mut self, position: MarkerPosition) {
        self.effects.push(position);
    }
}
