//! Per-cell corruption records and the vitium threshold rule.

pub use aether_schema::CorruptionStatus;

use crate::components::{ClassificationId, Quantities, ResourceKind};

/// Status implied by a region's vitium against everything else.
///
/// Equal quantities stay `Tainted`; only a strict majority corrupts.
pub fn classify_vitium(vitium: i64, other_total: i64) -> CorruptionStatus {
    if vitium <= 0 {
        CorruptionStatus::Pure
    } else if vitium > other_total {
        CorruptionStatus::Corrupted
    } else {
        CorruptionStatus::Tainted
    }
}

/// Share of vitium among all quantities, in `[0, 1]`.
pub fn corruption_ratio(vitium: i64, other_total: i64) -> f64 {
    if vitium <= 0 {
        return 0.0;
    }
    if other_total <= 0 {
        return 1.0;
    }
    (vitium as f64 / (vitium as f64 + other_total as f64)).clamp(0.0, 1.0)
}

/// Splits quantities into (vitium, sum of every other kind).
pub fn split_vitium(quantities: &Quantities, vitium_kind: &ResourceKind) -> (i64, i64) {
    quantities
        .iter()
        .fold((0i64, 0i64), |(vitium, others), (kind, amount)| {
            let amount = (*amount).max(0);
            if kind == vitium_kind {
                (vitium.saturating_add(amount), others)
            } else {
                (vitium, others.saturating_add(amount))
            }
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: CorruptionStatus,
    pub to: CorruptionStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorruptionRecord {
    pub(crate) status: CorruptionStatus,
    pub(crate) classification: Option<ClassificationId>,
    pub(crate) last_updated: u64,
    pub(crate) last_corrupted: u64,
    pub(crate) last_regenerated: u64,
    pub(crate) last_clean: u64,
    pub(crate) corruption_events: u32,
    pub(crate) regeneration_events: u32,
    pub(crate) marker_placements: u32,
    pub(crate) resource_deltas: Quantities,
    pub(crate) aether_consumed: Quantities,
}

impl CorruptionRecord {
    pub fn new(classification: Option<ClassificationId>) -> Self {
        Self {
            classification,
            ..Default::default()
        }
    }

    pub fn status(&self) -> CorruptionStatus {
        self.status
    }

    pub fn classification(&self) -> Option<&ClassificationId> {
        self.classification.as_ref()
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    pub fn last_corrupted(&self) -> u64 {
        self.last_corrupted
    }

    pub fn last_regenerated(&self) -> u64 {
        self.last_regenerated
    }

    pub fn last_clean(&self) -> u64 {
        self.last_clean
    }

    pub fn corruption_events(&self) -> u32 {
        self.corruption_events
    }

    pub fn regeneration_events(&self) -> u32 {
        self.regeneration_events
    }

    pub fn marker_placements(&self) -> u32 {
        self.marker_placements
    }

    pub fn resource_deltas(&self) -> &Quantities {
        &self.resource_deltas
    }

    pub fn aether_consumed(&self) -> &Quantities {
        &self.aether_consumed
    }

    pub fn delta(&self, kind: &ResourceKind) -> i64 {
        self.resource_deltas.get(kind).copied().unwrap_or(0)
    }

    pub fn set_classification(&mut self, classification: &ClassificationId) {
        if self.classification.as_ref() != Some(classification) {
            self.classification = Some(classification.clone());
        }
    }

    /// Moves to `status`, updating timestamps and event counters. Returns the
    /// transition when the status actually changed.
    pub fn set_status(&mut self, status: CorruptionStatus, tick: u64) -> Option<StatusTransition> {
        self.last_updated = tick;
        let previous = self.status;
        if previous == status {
            return None;
        }
        if status == CorruptionStatus::Corrupted {
            self.corruption_events = self.corruption_events.saturating_add(1);
            self.last_corrupted = tick;
        }
        if previous == CorruptionStatus::Corrupted {
            self.regeneration_events = self.regeneration_events.saturating_add(1);
            self.last_regenerated = tick;
        }
        if status == CorruptionStatus::Pure {
            self.last_clean = tick;
        }
        self.status = status;
        Some(StatusTransition {
            from: previous,
            to: status,
        })
    }

    /// Adds `delta` to the net change for `kind`; a net of zero drops the key.
    pub fn record_delta(&mut self, kind: &ResourceKind, delta: i64, tick: u64) {
        if delta == 0 {
            return;
        }
        let next = self.delta(kind).saturating_add(delta);
        if next == 0 {
            self.resource_deltas.remove(kind);
        } else {
            self.resource_deltas.insert(kind.clone(), next);
        }
        self.last_updated = tick;
    }

    pub fn record_aether_consumed(&mut self, kind: &ResourceKind, amount: i64, tick: u64) {
        if amount <= 0 {
            return;
        }
        let entry = self.aether_consumed.entry(kind.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
        self.last_updated = tick;
    }

    pub fn record_marker(&mut self, tick: u64) {
        self.marker_placements = self.marker_placements.saturating_add(1);
        self.last_updated = tick;
    }

    /// True once the cell has been corrupted, regenerated or erased.
    pub fn has_corruption_history(&self) -> bool {
        self.corruption_events > 0
            || self.regeneration_events > 0
            || !self.resource_deltas.is_empty()
    }

    /// Clean records carry no information and are evicted.
    pub fn is_prunable(&self) -> bool {
        self.status == CorruptionStatus::Pure
            && self.resource_deltas.is_empty()
            && self.marker_placements == 0
            && self.corruption_events == 0
            && self.regeneration_events == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_quantities_stay_tainted() {
        assert_eq!(classify_vitium(15, 15), CorruptionStatus::Tainted);
        assert_eq!(classify_vitium(16, 15), CorruptionStatus::Corrupted);
        assert_eq!(classify_vitium(0, 15), CorruptionStatus::Pure);
        assert_eq!(classify_vitium(1, 0), CorruptionStatus::Corrupted);
    }

    #[test]
    fn ratio_is_bounded() {
        assert_eq!(corruption_ratio(0, 10), 0.0);
        assert_eq!(corruption_ratio(5, 0), 1.0);
        assert_eq!(corruption_ratio(5, 15), 0.25);
        assert_eq!(corruption_ratio(i64::MAX, i64::MAX), 0.5);
    }

    #[test]
    fn split_ignores_negative_leftovers() {
        let vitium = ResourceKind::new("vitium");
        let quantities: Quantities = [
            (vitium.clone(), 7),
            (ResourceKind::new("aer"), 3),
            (ResourceKind::new("terra"), -2),
        ]
        .into_iter()
        .collect();
        assert_eq!(split_vitium(&quantities, &vitium), (7, 3));
    }

    #[test]
    fn transitions_maintain_counters_and_timestamps() {
        let mut record = CorruptionRecord::new(Some(ClassificationId::new("swamp")));

        let transition = record.set_status(CorruptionStatus::Tainted, 100);
        assert_eq!(
            transition,
            Some(StatusTransition {
                from: CorruptionStatus::Pure,
                to: CorruptionStatus::Tainted
            })
        );
        assert_eq!(record.corruption_events(), 0);

        record.set_status(CorruptionStatus::Corrupted, 200);
        assert_eq!(record.corruption_events(), 1);
        assert_eq!(record.last_corrupted(), 200);

        assert_eq!(record.set_status(CorruptionStatus::Corrupted, 400), None);
        assert_eq!(record.corruption_events(), 1);
        assert_eq!(record.last_updated(), 400);

        record.set_status(CorruptionStatus::Regenerating, 600);
        assert_eq!(record.regeneration_events(), 1);
        assert_eq!(record.last_regenerated(), 600);

        record.set_status(CorruptionStatus::Pure, 800);
        assert_eq!(record.regeneration_events(), 1, "only leaving Corrupted counts");
        assert_eq!(record.last_clean(), 800);
        assert!(!record.is_prunable(), "event history keeps the record alive");
    }

    #[test]
    fn deltas_that_cancel_out_leave_no_trace() {
        let vitium = ResourceKind::new("vitium");
        let mut record = CorruptionRecord::default();

        record.record_delta(&vitium, 3, 10);
        assert!(!record.is_prunable());
        record.record_delta(&vitium, -3, 20);
        assert!(record.resource_deltas().is_empty());
        assert!(record.is_prunable());
    }

    #[test]
    fn non_positive_consumption_is_ignored() {
        let aer = ResourceKind::new("aer");
        let mut record = CorruptionRecord::default();
        record.record_aether_consumed(&aer, 0, 5);
        record.record_aether_consumed(&aer, -4, 5);
        assert!(record.aether_consumed().is_empty());
        record.record_aether_consumed(&aer, 2, 6);
        record.record_aether_consumed(&aer, 1, 7);
        assert_eq!(record.aether_consumed().get(&aer), Some(&3));
    }

    #[test]
    fn markers_block_pruning() {
        let mut record = CorruptionRecord::default();
        assert!(record.is_prunable());
        record.record_marker(1);
        assert!(!record.is_prunable());
    }
}
