use std::collections::BTreeMap;

use crate::components::{ClassificationId, Quantities, ResourceKind};

/// Per-world adjustments layered over the host's base density for a whole
/// terrain classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationModifiers {
    by_classification: BTreeMap<ClassificationId, Quantities>,
}

impl ClassificationModifiers {
    pub fn get(&self, classification: &ClassificationId) -> Option<&Quantities> {
        self.by_classification.get(classification)
    }

    pub fn amount(&self, classification: &ClassificationId, kind: &ResourceKind) -> i64 {
        self.get(classification)
            .and_then(|deltas| deltas.get(kind))
            .copied()
            .unwrap_or(0)
    }

    /// Returns false when the call changed nothing.
    pub fn add(&mut self, classification: &ClassificationId, kind: &ResourceKind, amount: i64) -> bool {
        if amount == 0 {
            return false;
        }
        let deltas = self
            .by_classification
            .entry(classification.clone())
            .or_default();
        let next = deltas.get(kind).copied().unwrap_or(0).saturating_add(amount);
        if next == 0 {
            deltas.remove(kind);
        } else {
            deltas.insert(kind.clone(), next);
        }
        if deltas.is_empty() {
            self.by_classification.remove(classification);
        }
        true
    }

    /// Drops the modifier for one kind and returns what it held.
    pub fn clear_kind(&mut self, classification: &ClassificationId, kind: &ResourceKind) -> i64 {
        let Some(deltas) = self.by_classification.get_mut(classification) else {
            return 0;
        };
        let removed = deltas.remove(kind).unwrap_or(0);
        if deltas.is_empty() {
            self.by_classification.remove(classification);
        }
        removed
    }

    /// Base density plus this classification's modifiers, floored at zero.
    pub fn apply(&self, classification: &ClassificationId, base: &Quantities) -> Quantities {
        let mut combined = base.clone();
        if let Some(deltas) = self.get(classification) {
            for (kind, delta) in deltas {
                let entry = combined.entry(kind.clone()).or_insert(0);
                *entry = entry.saturating_add(*delta);
            }
        }
        combined.retain(|_, amount| *amount > 0);
        combined
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClassificationId, &Quantities)> {
        self.by_classification.iter()
    }

    pub fn insert(&mut self, classification: ClassificationId, deltas: Quantities) {
        let deltas: Quantities = deltas.into_iter().filter(|(_, amount)| *amount != 0).collect();
        if deltas.is_empty() {
            self.by_classification.remove(&classification);
        } else {
            self.by_classification.insert(classification, deltas);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_classification.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_layer_over_base_and_floor_at_zero() {
        let swamp = ClassificationId::new("swamp");
        let aqua = ResourceKind::new("aqua");
        let vitium = ResourceKind::new("vitium");
        let mut modifiers = ClassificationModifiers::default();
        modifiers.add(&swamp, &vitium, 6);
        modifiers.add(&swamp, &aqua, -10);

        let base: Quantities = [(aqua.clone(), 4)].into_iter().collect();
        let combined = modifiers.apply(&swamp, &base);

        assert_eq!(combined.get(&vitium), Some(&6));
        assert!(!combined.contains_key(&aqua));
        assert_eq!(
            modifiers.apply(&ClassificationId::new("desert"), &base),
            base
        );
    }

    #[test]
    fn cancelling_modifiers_leave_no_entry() {
        let plains = ClassificationId::new("plains");
        let vitium = ResourceKind::new("vitium");
        let mut modifiers = ClassificationModifiers::default();

        assert!(modifiers.add(&plains, &vitium, 3));
        assert!(!modifiers.add(&plains, &vitium, 0));
        modifiers.add(&plains, &vitium, -3);
        assert!(modifiers.is_empty());

        modifiers.add(&plains, &vitium, 9);
        assert_eq!(modifiers.clear_kind(&plains, &vitium), 9);
        assert!(modifiers.is_empty());
    }
}
