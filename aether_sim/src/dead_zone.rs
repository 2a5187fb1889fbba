use std::collections::BTreeMap;

use crate::components::CellCoord;

pub const TEMPORARY_AETHER_MULTIPLIER: f64 = 0.1;
pub const PERMANENT_AETHER_MULTIPLIER: f64 = 0.0;

/// A cell whose aether has collapsed.
#[derive(Debug, Clone, PartialEq)]
pub enum DeadZone {
    /// Loses one unit of drain per recovery interval and lifts at zero.
    Temporary {
        drain_remaining: f64,
        initial_drain: f64,
        recovery_target: u64,
    },
    /// Terminal.
    Permanent,
}

impl DeadZone {
    pub fn temporary(drain: f64, now: u64, recovery_interval: u64) -> Self {
        let drain = if drain.is_finite() { drain.max(0.0) } else { 0.0 };
        DeadZone::Temporary {
            drain_remaining: drain,
            initial_drain: drain,
            recovery_target: now.saturating_add(recovery_interval),
        }
    }

    pub fn aether_multiplier(&self) -> f64 {
        match self {
            DeadZone::Temporary { .. } => TEMPORARY_AETHER_MULTIPLIER,
            DeadZone::Permanent => PERMANENT_AETHER_MULTIPLIER,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, DeadZone::Permanent)
    }

    /// Fraction of the initial drain already recovered, in `[0, 1]`.
    pub fn recovery_progress(&self) -> f64 {
        match self {
            DeadZone::Temporary {
                drain_remaining,
                initial_drain,
                ..
            } if *initial_drain > 0.0 => (1.0 - drain_remaining / initial_drain).clamp(0.0, 1.0),
            DeadZone::Temporary { .. } => 1.0,
            DeadZone::Permanent => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadZoneEntry {
    pub zone: DeadZone,
    pub created_tick: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySweep {
    pub lifted: Vec<CellCoord>,
    /// Temporary zones that lost drain during the sweep.
    pub advanced: usize,
}

impl RecoverySweep {
    pub fn changed(&self) -> bool {
        self.advanced > 0 || !self.lifted.is_empty()
    }
}

/// Dead zones of one world, keyed by cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeadZoneTable {
    zones: BTreeMap<CellCoord, DeadZoneEntry>,
}

impl DeadZoneTable {
    pub fn get(&self, cell: CellCoord) -> Option<&DeadZoneEntry> {
        self.zones.get(&cell)
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        self.zones.contains_key(&cell)
    }

    pub fn is_permanent(&self, cell: CellCoord) -> bool {
        self.zones
            .get(&cell)
            .is_some_and(|entry| entry.zone.is_permanent())
    }

    pub fn is_temporary(&self, cell: CellCoord) -> bool {
        self.zones
            .get(&cell)
            .is_some_and(|entry| !entry.zone.is_permanent())
    }

    /// Multiplier applied to aether in `cell`; 1.0 outside dead zones.
    pub fn multiplier(&self, cell: CellCoord) -> f64 {
        self.zones
            .get(&cell)
            .map_or(1.0, |entry| entry.zone.aether_multiplier())
    }

    /// Marks `cell` temporary. A permanent zone is never downgraded.
    pub fn insert_temporary(
        &mut self,
        cell: CellCoord,
        drain: f64,
        now: u64,
        recovery_interval: u64,
    ) -> bool {
        if self.is_permanent(cell) {
            return false;
        }
        self.zones.insert(
            cell,
            DeadZoneEntry {
                zone: DeadZone::temporary(drain, now, recovery_interval),
                created_tick: now,
            },
        );
        true
    }

    pub fn insert_permanent(&mut self, cell: CellCoord, now: u64) {
        self.zones.insert(
            cell,
            DeadZoneEntry {
                zone: DeadZone::Permanent,
                created_tick: now,
            },
        );
    }

    pub(crate) fn insert_entry(&mut self, cell: CellCoord, entry: DeadZoneEntry) {
        self.zones.insert(cell, entry);
    }

    pub fn remove(&mut self, cell: CellCoord) -> Option<DeadZoneEntry> {
        self.zones.remove(&cell)
    }

    /// Applies every recovery step due by `now` and lifts recovered zones.
    pub fn recover(&mut self, now: u64, recovery_interval: u64) -> RecoverySweep {
        let interval = recovery_interval.max(1);
        let mut lifted = Vec::new();
        let mut advanced = 0;
        for (cell, entry) in self.zones.iter_mut() {
            let DeadZone::Temporary {
                drain_remaining,
                recovery_target,
                ..
            } = &mut entry.zone
            else {
                continue;
            };
            if now >= *recovery_target {
                let steps = (now - *recovery_target) / interval + 1;
                *drain_remaining = (*drain_remaining - steps as f64).max(0.0);
                *recovery_target = recovery_target.saturating_add(steps.saturating_mul(interval));
                advanced += 1;
            }
            if *drain_remaining <= 0.0 {
                lifted.push(*cell);
            }
        }
        for cell in &lifted {
            self.zones.remove(cell);
        }
        RecoverySweep { lifted, advanced }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellCoord, &DeadZoneEntry)> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn permanent_count(&self) -> usize {
        self.zones
            .values()
            .filter(|entry| entry.zone.is_permanent())
            .count()
    }
}
