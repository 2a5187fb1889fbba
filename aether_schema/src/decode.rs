//! Lenient JSON decoding for persisted tables.
//!
//! A damaged document never fails the load. Unreadable entries are skipped,
//! unreadable fields fall back to their zero value, and every repair is
//! reported as a [`DecodeIssue`] so the caller can log it.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::{
    CorruptionRecordState, CorruptionStatus, DeadZoneKindState, DeadZoneState, LedgerState,
    ModifierState, Table,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeIssue {
    Document(String),
    SkippedEntry { index: usize, reason: String },
    DefaultedField { index: usize, field: &'static str },
}

impl fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeIssue::Document(message) => write!(f, "document unreadable: {message}"),
            DecodeIssue::SkippedEntry { index, reason } => {
                write!(f, "entry {index} skipped: {reason}")
            }
            DecodeIssue::DefaultedField { index, field } => {
                write!(f, "entry {index} field `{field}` defaulted")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub issues: Vec<DecodeIssue>,
}

impl<T> Decoded<T> {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn decode_ledger_table(json: &str) -> Decoded<Table<LedgerState>> {
    decode_table(json, |fields| {
        let pos = fields.pos()?;
        Some(LedgerState {
            pos,
            current: fields.quantities("current"),
            max: fields.quantities("max"),
            last_recovery_tick: fields.u64("last_recovery_tick"),
            expended_this_window: fields.f64("expended_this_window"),
            window_start_tick: fields.u64("window_start_tick"),
        })
    })
}

pub fn decode_dead_zone_table(json: &str) -> Decoded<Table<DeadZoneState>> {
    decode_table(json, |fields| {
        let pos = fields.pos()?;
        Some(DeadZoneState {
            pos,
            kind: fields.dead_zone_kind("kind"),
            drain_remaining: fields.f64("drain_remaining"),
            initial_drain: fields.f64("initial_drain"),
            recovery_target: fields.u64("recovery_target"),
            created_tick: fields.u64("created_tick"),
        })
    })
}

pub fn decode_corruption_table(json: &str) -> Decoded<Table<CorruptionRecordState>> {
    decode_table(json, |fields| {
        let pos = fields.pos()?;
        Some(CorruptionRecordState {
            pos,
            status: fields.status("status"),
            classification: fields.string("classification"),
            last_updated: fields.u64("last_updated"),
            last_corrupted: fields.u64("last_corrupted"),
            last_regenerated: fields.u64("last_regenerated"),
            last_clean: fields.u64("last_clean"),
            corruption_events: fields.u32("corruption_events"),
            regeneration_events: fields.u32("regeneration_events"),
            marker_placements: fields.u32("marker_placements"),
            resource_deltas: fields.quantities("resource_deltas"),
            aether_consumed: fields.quantities("aether_consumed"),
        })
    })
}

pub fn decode_modifier_table(json: &str) -> Decoded<Table<ModifierState>> {
    decode_table(json, |fields| {
        let classification = fields.string("classification");
        if classification.is_empty() {
            fields.skip("missing classification");
            return None;
        }
        Some(ModifierState {
            classification,
            deltas: fields.quantities("deltas"),
        })
    })
}

fn decode_table<T>(
    json: &str,
    mut decode_entry: impl FnMut(&mut Fields<'_>) -> Option<T>,
) -> Decoded<Table<T>> {
    let mut issues = Vec::new();
    let root: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            issues.push(DecodeIssue::Document(err.to_string()));
            return Decoded {
                value: Table::default(),
                issues,
            };
        }
    };

    let Some(raw_entries) = root.get("entries").and_then(Value::as_array) else {
        issues.push(DecodeIssue::Document("missing `entries` array".to_string()));
        return Decoded {
            value: Table::default(),
            issues,
        };
    };

    let mut entries = Vec::with_capacity(raw_entries.len());
    for (index, raw) in raw_entries.iter().enumerate() {
        let Some(map) = raw.as_object() else {
            issues.push(DecodeIssue::SkippedEntry {
                index,
                reason: "not an object".to_string(),
            });
            continue;
        };
        let mut fields = Fields {
            index,
            map,
            issues: &mut issues,
        };
        if let Some(entry) = decode_entry(&mut fields) {
            entries.push(entry);
        }
    }

    Decoded {
        value: Table::new(entries),
        issues,
    }
}

struct Fields<'a> {
    index: usize,
    map: &'a Map<String, Value>,
    issues: &'a mut Vec<DecodeIssue>,
}

impl Fields<'_> {
    fn defaulted(&mut self, field: &'static str) {
        self.issues.push(DecodeIssue::DefaultedField {
            index: self.index,
            field,
        });
    }

    fn skip(&mut self, reason: &str) {
        self.issues.push(DecodeIssue::SkippedEntry {
            index: self.index,
            reason: reason.to_string(),
        });
    }

    /// The cell key is the one field an entry cannot live without.
    fn pos(&mut self) -> Option<u64> {
        let pos = self.map.get("pos").and_then(Value::as_u64);
        if pos.is_none() {
            self.skip("missing or invalid `pos`");
        }
        pos
    }

    fn u64(&mut self, field: &'static str) -> u64 {
        match self.map.get(field).and_then(Value::as_u64) {
            Some(value) => value,
            None => {
                self.defaulted(field);
                0
            }
        }
    }

    fn u32(&mut self, field: &'static str) -> u32 {
        match self
            .map
            .get(field)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
        {
            Some(value) => value,
            None => {
                self.defaulted(field);
                0
            }
        }
    }

    fn f64(&mut self, field: &'static str) -> f64 {
        match self.map.get(field).and_then(Value::as_f64) {
            Some(value) if value.is_finite() => value,
            _ => {
                self.defaulted(field);
                0.0
            }
        }
    }

    fn string(&mut self, field: &'static str) -> String {
        match self.map.get(field).and_then(Value::as_str) {
            Some(value) => value.to_string(),
            None => {
                self.defaulted(field);
                String::new()
            }
        }
    }

    fn status(&mut self, field: &'static str) -> CorruptionStatus {
        let parsed = match self.map.get(field) {
            Some(Value::String(name)) => name.parse().ok(),
            Some(Value::Number(ordinal)) => {
                ordinal.as_u64().and_then(CorruptionStatus::from_ordinal)
            }
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            self.defaulted(field);
            CorruptionStatus::Pure
        })
    }

    fn dead_zone_kind(&mut self, field: &'static str) -> DeadZoneKindState {
        match self.map.get(field).and_then(Value::as_str) {
            Some("temporary") => DeadZoneKindState::Temporary,
            Some("permanent") => DeadZoneKindState::Permanent,
            _ => {
                self.defaulted(field);
                DeadZoneKindState::Temporary
            }
        }
    }

    fn quantities(&mut self, field: &'static str) -> BTreeMap<String, i64> {
        let map = self.map;
        let Some(object) = map.get(field).and_then(Value::as_object) else {
            self.defaulted(field);
            return BTreeMap::new();
        };
        let mut quantities = BTreeMap::new();
        let mut damaged = false;
        for (kind, amount) in object {
            match amount.as_i64() {
                Some(amount) => {
                    quantities.insert(kind.clone(), amount);
                }
                None => damaged = true,
            }
        }
        if damaged {
            self.defaulted(field);
        }
        quantities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encode_table_json, pack_cell};

    #[test]
    fn garbage_document_yields_empty_table() {
        let decoded = decode_ledger_table("{not json");
        assert!(decoded.value.entries.is_empty());
        assert!(matches!(decoded.issues[0], DecodeIssue::Document(_)));
    }

    #[test]
    fn damaged_fields_default_without_dropping_entry() {
        let json = r#"{
            "version": 1,
            "entries": [
                {"pos": 7, "status": "bogus", "classification": "forest",
                 "corruption_events": "three", "resource_deltas": {"vitium": 4, "aer": "x"}},
                {"status": 2},
                "nonsense"
            ]
        }"#;
        let decoded = decode_corruption_table(json);

        assert_eq!(decoded.value.entries.len(), 1);
        let entry = &decoded.value.entries[0];
        assert_eq!(entry.pos, 7);
        assert_eq!(entry.status, CorruptionStatus::Pure);
        assert_eq!(entry.classification, "forest");
        assert_eq!(entry.corruption_events, 0);
        assert_eq!(entry.resource_deltas.get("vitium"), Some(&4));
        assert!(!entry.resource_deltas.contains_key("aer"));

        let skipped = decoded
            .issues
            .iter()
            .filter(|issue| matches!(issue, DecodeIssue::SkippedEntry { .. }))
            .count();
        assert_eq!(skipped, 2);
        assert!(decoded.issues.contains(&DecodeIssue::DefaultedField {
            index: 0,
            field: "status"
        }));
    }

    #[test]
    fn status_accepts_ordinals() {
        let json = r#"{"version": 1, "entries": [{"pos": 1, "status": 2}]}"#;
        let decoded = decode_corruption_table(json);
        assert_eq!(decoded.value.entries[0].status, CorruptionStatus::Corrupted);
    }

    #[test]
    fn encoded_dead_zones_decode_cleanly() {
        let table = Table::new(vec![
            DeadZoneState {
                pos: pack_cell(-4, 9),
                kind: DeadZoneKindState::Temporary,
                drain_remaining: 2.5,
                initial_drain: 3.0,
                recovery_target: 48_000,
                created_tick: 24_000,
            },
            DeadZoneState {
                pos: pack_cell(0, 0),
                kind: DeadZoneKindState::Permanent,
                ..Default::default()
            },
        ]);
        let json = encode_table_json(&table).expect("encode");
        let decoded = decode_dead_zone_table(&json);
        assert!(decoded.is_clean(), "unexpected issues: {:?}", decoded.issues);
        assert_eq!(decoded.value, table);
    }
}
