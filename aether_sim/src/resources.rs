use bevy::prelude::*;

use crate::components::{CellCoord, ClassificationId, ResourceKind};
use crate::corruption::CorruptionStatus;
use crate::host::MarkerPlacement;

/// Host tick observed at the start of the current update.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

/// Fires at most once per `interval` ticks. A clock that moves backwards
/// re-arms the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalGate {
    last_run: Option<u64>,
}

impl IntervalGate {
    pub fn ready(&mut self, tick: u64, interval: u64) -> bool {
        let due = match self.last_run {
            Some(last) => tick < last || tick - last >= interval,
            None => true,
        };
        if due {
            self.last_run = Some(tick);
        }
        due
    }

    pub fn last_run(&self) -> Option<u64> {
        self.last_run
    }
}

/// Gates for the periodic systems. Transient; rebuilt on restart.
#[derive(Resource, Debug, Clone, Default)]
pub struct AetherSchedule {
    pub ledger_recovery: IntervalGate,
    pub dead_zone_sweep: IntervalGate,
    pub corruption_window: IntervalGate,
    pub autosave: IntervalGate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorruptionEventKind {
    StatusChanged {
        from: CorruptionStatus,
        to: CorruptionStatus,
    },
    MarkerPlaced(MarkerPlacement),
    AspectTransferred { kind: ResourceKind },
    AetherConsumed { kind: ResourceKind },
    DeadZoneCreated { permanent: bool },
    RegionErased { cells: usize },
}

/// Something notable the corruption driver did to a region.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct CorruptionEvent {
    pub tick: u64,
    pub representative: CellCoord,
    pub classification: ClassificationId,
    pub kind: CorruptionEventKind,
}

/// Counters for the most recent corruption window plus running totals.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct CorruptionTelemetry {
    pub last_window_tick: Option<u64>,
    pub regions_this_window: u32,
    pub cells_skipped_this_window: u32,
    pub faults_this_window: u32,
    pub deferred_this_window: u32,
    pub markers_this_window: u32,
    pub transfers_this_window: u32,
    pub aether_consumed_this_window: u32,
    pub dead_zones_this_window: u32,
    pub windows_total: u64,
    pub markers_total: u64,
    pub transfers_total: u64,
    pub aether_consumed_total: u64,
    pub dead_zones_total: u64,
    pub faults_total: u64,
}

impl CorruptionTelemetry {
    pub fn reset_window(&mut self, tick: u64) {
        self.last_window_tick = Some(tick);
        self.regions_this_window = 0;
        self.cells_skipped_this_window = 0;
        self.faults_this_window = 0;
        self.deferred_this_window = 0;
        self.markers_this_window = 0;
        self.transfers_this_window = 0;
        self.aether_consumed_this_window = 0;
        self.dead_zones_this_window = 0;
    }

    pub fn record_window(&mut self, report: &crate::driver::WindowReport) {
        self.reset_window(report.tick);
        self.regions_this_window = report.regions_processed;
        self.cells_skipped_this_window = report.cells_skipped;
        self.faults_this_window = report.region_faults;
        self.deferred_this_window = report.deferred_seeds;
        self.markers_this_window = report.markers_placed;
        self.transfers_this_window = report.transfers;
        self.aether_consumed_this_window = report.aether_consumed;
        self.dead_zones_this_window = report.dead_zones_created;

        self.windows_total += 1;
        self.markers_total += u64::from(report.markers_placed);
        self.transfers_total += u64::from(report.transfers);
        self.aether_consumed_total += u64::from(report.aether_consumed);
        self.dead_zones_total += u64::from(report.dead_zones_created);
        self.faults_total += u64::from(report.region_faults);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_fires_once_per_interval() {
        let mut gate = IntervalGate::default();
        assert!(gate.ready(0, 200));
        assert!(!gate.ready(150, 200));
        assert!(gate.ready(200, 200));
        assert!(!gate.ready(399, 200));
        assert!(gate.ready(450, 200));
        assert_eq!(gate.last_run(), Some(450));
    }

    #[test]
    fn gate_rearms_when_clock_rewinds() {
        let mut gate = IntervalGate::default();
        assert!(gate.ready(1_000, 200));
        assert!(gate.ready(10, 200));
        assert!(!gate.ready(100, 200));
    }
}
