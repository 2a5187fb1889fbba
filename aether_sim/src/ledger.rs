//! Per-cell aether stock: harvest, recovery and exhaustion detection.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::aether_config::AetherConfig;
use crate::components::{Quantities, ResourceKind};

/// Ledger tunables lifted out of [`AetherConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub cell_volume: i64,
    pub recovery_rate: f64,
    pub ticks_per_day: u64,
    pub expenditure_window_ticks: u64,
    pub permanent_expenditure_threshold: f64,
    pub depletion_ratio: f64,
}

impl LedgerSettings {
    pub fn from_config(config: &AetherConfig) -> Self {
        let ledger = config.ledger();
        Self {
            cell_volume: ledger.cell_volume(),
            recovery_rate: ledger.recovery_rate(),
            ticks_per_day: config.ticks_per_day().max(1),
            expenditure_window_ticks: ledger.expenditure_window_ticks(),
            permanent_expenditure_threshold: ledger.permanent_expenditure_threshold(),
            depletion_ratio: ledger.depletion_ratio(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from_config(&AetherConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stock {
    pub current: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestRejection {
    #[error("harvest request is empty")]
    EmptyRequest,
    #[error("negative amount {amount} requested for {kind}")]
    NegativeAmount { kind: ResourceKind, amount: i64 },
    #[error("{kind} is not tracked by this cell")]
    UnknownKind { kind: ResourceKind },
    #[error("insufficient {kind}: requested {requested}, available {available}")]
    Insufficient {
        kind: ResourceKind,
        requested: i64,
        available: i64,
    },
    #[error("cell is a dead zone")]
    DeadZone,
    #[error("cell is not available")]
    Unavailable,
}

/// What pushed a ledger into the dead-zone path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionTrigger {
    /// Every tracked kind fell to the depletion ratio or below.
    Depleted,
    /// Expenditure inside one window crossed the permanent threshold.
    Overharvested,
    /// Corruption drained the last unit of aether.
    Consumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReceipt {
    pub harvested: i64,
    pub exhaustion: Option<ExhaustionTrigger>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLedger {
    stock: BTreeMap<ResourceKind, Stock>,
    last_recovery_tick: u64,
    expended_this_window: f64,
    window_start_tick: u64,
}

impl ResourceLedger {
    /// Fills every kind with positive density to capacity.
    pub fn seeded(density: &Quantities, settings: &LedgerSettings, tick: u64) -> Self {
        let stock = density
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(kind, amount)| {
                let max = amount.saturating_mul(settings.cell_volume);
                (kind.clone(), Stock { current: max, max })
            })
            .collect();
        Self {
            stock,
            last_recovery_tick: tick,
            expended_this_window: 0.0,
            window_start_tick: tick,
        }
    }

    /// Rebuilds a ledger from persisted parts, clamping anything that breaks
    /// `0 <= current <= max`. The flag reports whether a clamp happened.
    pub fn from_parts(
        current: &Quantities,
        max: &Quantities,
        last_recovery_tick: u64,
        expended_this_window: f64,
        window_start_tick: u64,
    ) -> (Self, bool) {
        let mut repaired = false;
        let mut stock = BTreeMap::new();
        for kind in current.keys().chain(max.keys()) {
            if stock.contains_key(kind) {
                continue;
            }
            let raw_max = max.get(kind).copied().unwrap_or(0);
            let raw_current = current.get(kind).copied().unwrap_or(0);
            let clamped_max = raw_max.max(0);
            let clamped_current = raw_current.clamp(0, clamped_max);
            repaired |= clamped_max != raw_max || clamped_current != raw_current;
            stock.insert(
                kind.clone(),
                Stock {
                    current: clamped_current,
                    max: clamped_max,
                },
            );
        }
        let expended = if expended_this_window.is_finite() && expended_this_window >= 0.0 {
            expended_this_window
        } else {
            repaired = true;
            0.0
        };
        (
            Self {
                stock,
                last_recovery_tick,
                expended_this_window: expended,
                window_start_tick,
            },
            repaired,
        )
    }

    pub fn stock(&self) -> impl Iterator<Item = (&ResourceKind, &Stock)> {
        self.stock.iter()
    }

    pub fn current(&self, kind: &ResourceKind) -> i64 {
        self.stock.get(kind).map_or(0, |stock| stock.current)
    }

    pub fn max(&self, kind: &ResourceKind) -> i64 {
        self.stock.get(kind).map_or(0, |stock| stock.max)
    }

    /// Fill level of one kind in percent; zero when the kind has no capacity.
    pub fn percentage(&self, kind: &ResourceKind) -> f64 {
        match self.stock.get(kind) {
            Some(stock) if stock.max > 0 => stock.current as f64 / stock.max as f64 * 100.0,
            _ => 0.0,
        }
    }

    pub fn total_current(&self) -> i64 {
        self.stock
            .values()
            .fold(0i64, |sum, stock| sum.saturating_add(stock.current))
    }

    pub fn current_quantities(&self) -> Quantities {
        self.stock
            .iter()
            .map(|(kind, stock)| (kind.clone(), stock.current))
            .collect()
    }

    pub fn max_quantities(&self) -> Quantities {
        self.stock
            .iter()
            .map(|(kind, stock)| (kind.clone(), stock.max))
            .collect()
    }

    pub fn last_recovery_tick(&self) -> u64 {
        self.last_recovery_tick
    }

    pub fn expended_this_window(&self) -> f64 {
        self.expended_this_window
    }

    pub fn window_start_tick(&self) -> u64 {
        self.window_start_tick
    }

    /// Checks a whole bundle without touching the stock.
    pub fn check_harvest(&self, request: &Quantities) -> Result<(), HarvestRejection> {
        if request.is_empty() {
            return Err(HarvestRejection::EmptyRequest);
        }
        for (kind, &amount) in request {
            if amount < 0 {
                return Err(HarvestRejection::NegativeAmount {
                    kind: kind.clone(),
                    amount,
                });
            }
            let Some(stock) = self.stock.get(kind) else {
                return Err(HarvestRejection::UnknownKind { kind: kind.clone() });
            };
            if stock.current < amount {
                return Err(HarvestRejection::Insufficient {
                    kind: kind.clone(),
                    requested: amount,
                    available: stock.current,
                });
            }
        }
        Ok(())
    }

    pub fn can_harvest(&self, request: &Quantities) -> bool {
        self.check_harvest(request).is_ok()
    }

    /// Takes the whole bundle or nothing.
    pub fn try_harvest(
        &mut self,
        request: &Quantities,
        tick: u64,
        settings: &LedgerSettings,
    ) -> Result<HarvestReceipt, HarvestRejection> {
        self.check_harvest(request)?;

        if tick.saturating_sub(self.window_start_tick) > settings.expenditure_window_ticks
            || tick < self.window_start_tick
        {
            self.expended_this_window = 0.0;
            self.window_start_tick = tick;
        }

        let mut harvested = 0i64;
        for (kind, &amount) in request {
            if let Some(stock) = self.stock.get_mut(kind) {
                stock.current -= amount;
                harvested = harvested.saturating_add(amount);
            }
        }
        self.expended_this_window += harvested as f64;

        let exhaustion = if self.expended_this_window > settings.permanent_expenditure_threshold {
            Some(ExhaustionTrigger::Overharvested)
        } else if harvested > 0 && self.is_depleted(settings.depletion_ratio) {
            Some(ExhaustionTrigger::Depleted)
        } else {
            None
        };

        Ok(HarvestReceipt {
            harvested,
            exhaustion,
        })
    }

    /// True when every kind with capacity sits at `ratio` of max or below.
    pub fn is_depleted(&self, ratio: f64) -> bool {
        let mut tracked = self.stock.values().filter(|stock| stock.max > 0).peekable();
        if tracked.peek().is_none() {
            return false;
        }
        tracked.all(|stock| stock.current as f64 <= stock.max as f64 * ratio)
    }

    /// Restores `recovery_rate` units per kind for each whole day since the
    /// last recovery. The partial day is kept for the next call.
    pub fn recover(&mut self, tick: u64, settings: &LedgerSettings) -> i64 {
        let day = settings.ticks_per_day.max(1);
        let elapsed = tick.saturating_sub(self.last_recovery_tick);
        let cycles = elapsed / day;
        if cycles == 0 {
            return 0;
        }
        self.last_recovery_tick = tick - elapsed % day;

        let amount = (settings.recovery_rate * cycles as f64).floor();
        let amount = if amount >= i64::MAX as f64 {
            i64::MAX
        } else {
            amount as i64
        };

        let mut restored = 0i64;
        for stock in self.stock.values_mut() {
            let next = stock.current.saturating_add(amount).min(stock.max);
            restored = restored.saturating_add(next - stock.current);
            stock.current = next;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(id: &str) -> ResourceKind {
        ResourceKind::new(id)
    }

    fn bundle(entries: &[(&str, i64)]) -> Quantities {
        entries
            .iter()
            .map(|(id, amount)| (kind(id), *amount))
            .collect()
    }

    fn settings() -> LedgerSettings {
        LedgerSettings {
            cell_volume: 10,
            recovery_rate: 1.0,
            ticks_per_day: 24_000,
            expenditure_window_ticks: 72_000,
            permanent_expenditure_threshold: 10_000.0,
            depletion_ratio: 0.1,
        }
    }

    fn assert_within_bounds(ledger: &ResourceLedger) {
        for (kind, stock) in ledger.stock() {
            assert!(
                0 <= stock.current && stock.current <= stock.max,
                "{kind} out of bounds: {stock:?}"
            );
        }
    }

    #[test]
    fn seeding_scales_density_by_cell_volume() {
        let ledger = ResourceLedger::seeded(&bundle(&[("aer", 4), ("ordo", 0)]), &settings(), 50);
        assert_eq!(ledger.max(&kind("aer")), 40);
        assert_eq!(ledger.current(&kind("aer")), 40);
        assert_eq!(ledger.max(&kind("ordo")), 0, "zero density is not tracked");
        assert_eq!(ledger.last_recovery_tick(), 50);
    }

    #[test]
    fn bundle_harvest_is_all_or_nothing() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 10), ("b", 10)]), &settings(), 0);
        let before = ledger.clone();

        let result = ledger.try_harvest(&bundle(&[("a", 5), ("b", 1000)]), 10, &settings());

        assert!(matches!(
            result,
            Err(HarvestRejection::Insufficient { ref kind, .. }) if kind.as_str() == "b"
        ));
        assert_eq!(ledger, before, "failed bundle must leave the ledger untouched");

        let receipt = ledger
            .try_harvest(&bundle(&[("a", 5), ("b", 7)]), 10, &settings())
            .expect("both kinds are sufficient");
        assert_eq!(receipt.harvested, 12);
        assert_eq!(ledger.current(&kind("a")), 95);
        assert_eq!(ledger.current(&kind("b")), 93);
        assert_eq!(ledger.expended_this_window(), 12.0);
    }

    #[test]
    fn invalid_requests_are_rejected_without_mutation() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 1)]), &settings(), 0);
        let before = ledger.clone();

        assert_eq!(
            ledger.try_harvest(&Quantities::new(), 0, &settings()),
            Err(HarvestRejection::EmptyRequest)
        );
        assert!(matches!(
            ledger.try_harvest(&bundle(&[("a", -1)]), 0, &settings()),
            Err(HarvestRejection::NegativeAmount { amount: -1, .. })
        ));
        assert!(matches!(
            ledger.try_harvest(&bundle(&[("a", 1), ("ghost", 1)]), 0, &settings()),
            Err(HarvestRejection::UnknownKind { .. })
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn draining_below_ratio_reports_depletion() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 10), ("b", 10)]), &settings(), 0);

        let receipt = ledger
            .try_harvest(&bundle(&[("a", 95)]), 1, &settings())
            .expect("harvest");
        assert_eq!(receipt.exhaustion, None, "b is still full");

        let receipt = ledger
            .try_harvest(&bundle(&[("b", 90)]), 2, &settings())
            .expect("harvest");
        assert_eq!(receipt.exhaustion, Some(ExhaustionTrigger::Depleted));
        assert_within_bounds(&ledger);
    }

    #[test]
    fn overharvesting_within_window_is_flagged_permanent() {
        let mut tuned = settings();
        tuned.permanent_expenditure_threshold = 50.0;
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 100)]), &tuned, 0);

        for tick in 0..5 {
            let receipt = ledger
                .try_harvest(&bundle(&[("a", 10)]), tick, &tuned)
                .expect("harvest");
            assert_eq!(receipt.exhaustion, None);
        }
        let receipt = ledger
            .try_harvest(&bundle(&[("a", 1)]), 6, &tuned)
            .expect("harvest");
        assert_eq!(receipt.exhaustion, Some(ExhaustionTrigger::Overharvested));
    }

    #[test]
    fn expenditure_window_resets_after_it_lapses() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 100)]), &settings(), 0);
        ledger
            .try_harvest(&bundle(&[("a", 30)]), 10, &settings())
            .expect("harvest");
        assert_eq!(ledger.expended_this_window(), 30.0);

        ledger
            .try_harvest(&bundle(&[("a", 5)]), 72_011, &settings())
            .expect("harvest");
        assert_eq!(ledger.expended_this_window(), 5.0);
        assert_eq!(ledger.window_start_tick(), 72_011);
    }

    #[test]
    fn recovery_counts_whole_days_and_carries_the_rest() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 1)]), &settings(), 0);
        ledger
            .try_harvest(&bundle(&[("a", 9)]), 0, &settings())
            .expect("harvest");
        assert_eq!(ledger.current(&kind("a")), 1);

        assert_eq!(ledger.recover(23_999, &settings()), 0);
        assert_eq!(ledger.last_recovery_tick(), 0);

        assert_eq!(ledger.recover(60_000, &settings()), 2);
        assert_eq!(ledger.current(&kind("a")), 3);
        assert_eq!(ledger.last_recovery_tick(), 48_000);

        // 12_000 carried ticks plus 12_000 new ones make one more day.
        assert_eq!(ledger.recover(72_000, &settings()), 1);
        assert_eq!(ledger.current(&kind("a")), 4);
    }

    #[test]
    fn recovery_without_elapsed_time_is_idempotent() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 2)]), &settings(), 0);
        ledger
            .try_harvest(&bundle(&[("a", 15)]), 0, &settings())
            .expect("harvest");
        ledger.recover(48_000, &settings());
        let snapshot = ledger.clone();

        for _ in 0..5 {
            assert_eq!(ledger.recover(48_000, &settings()), 0);
        }
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn recovery_never_exceeds_capacity() {
        let mut ledger = ResourceLedger::seeded(&bundle(&[("a", 1)]), &settings(), 0);
        ledger
            .try_harvest(&bundle(&[("a", 2)]), 0, &settings())
            .expect("harvest");
        assert_eq!(ledger.recover(24_000 * 50, &settings()), 2);
        assert_eq!(ledger.current(&kind("a")), ledger.max(&kind("a")));
        assert_within_bounds(&ledger);
    }

    #[test]
    fn rebuilding_from_damaged_parts_restores_bounds() {
        let (ledger, repaired) = ResourceLedger::from_parts(
            &bundle(&[("a", 50), ("b", -3), ("orphan", 4)]),
            &bundle(&[("a", 20), ("b", 10)]),
            0,
            f64::NAN,
            0,
        );
        assert!(repaired);
        assert_eq!(ledger.current(&kind("a")), 20);
        assert_eq!(ledger.current(&kind("b")), 0);
        assert_eq!(ledger.current(&kind("orphan")), 0);
        assert_eq!(ledger.expended_this_window(), 0.0);
        assert_within_bounds(&ledger);
    }

    #[test]
    fn percentage_handles_empty_capacity() {
        let ledger = ResourceLedger::seeded(&bundle(&[("a", 4)]), &settings(), 0);
        assert_eq!(ledger.percentage(&kind("a")), 100.0);
        assert_eq!(ledger.percentage(&kind("missing")), 0.0);
    }
}
