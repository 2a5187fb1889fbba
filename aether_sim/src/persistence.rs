//! Save and load of a [`WorldStore`] through a string-keyed backend.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aether_schema::{
    decode_corruption_table, decode_dead_zone_table, decode_ledger_table, decode_modifier_table,
    encode_table_json, CorruptionRecordState, DeadZoneKindState, DeadZoneState, Decoded,
    LedgerState, ModifierState, Table, WorldState, CORRUPTION_TABLE_KEY, DEAD_ZONE_TABLE_KEY,
    LEDGER_TABLE_KEY, MODIFIER_TABLE_KEY,
};
use bevy::prelude::Resource;
use serde::Serialize;
use thiserror::Error;

use crate::aether_config::AetherConfig;
use crate::components::{quantities_from_state, quantities_to_state, CellCoord, ClassificationId};
use crate::corruption::CorruptionRecord;
use crate::dead_zone::{DeadZone, DeadZoneEntry};
use crate::ledger::ResourceLedger;
use crate::store::WorldStore;

/// Durable key/value storage for named state documents.
pub trait StateBackend: Send + Sync + 'static {
    /// `Ok(None)` when nothing was ever saved under `key`.
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&self, key: &str, contents: &str) -> io::Result<()>;
}

/// One JSON file per key inside `root`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl StateBackend for FileBackend {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes to a sibling temp file and renames it over the target.
    fn write(&self, key: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let final_path = self.path_for(key);
        let tmp_path = self.root.join(format!("{key}.json.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
            let file = writer
                .into_inner()
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)
    }
}

/// In-memory backend. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn insert(&self, key: &str, contents: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), contents.to_string());
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory backend poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory backend poisoned"))?;
        entries.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

/// Backend used by the autosave system. Absent means no persistence.
#[derive(Resource)]
pub struct PersistenceBackend(pub Box<dyn StateBackend>);

impl PersistenceBackend {
    pub fn new(backend: impl StateBackend) -> Self {
        Self(Box::new(backend))
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access persisted state `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode persisted state `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend key for one of a world's tables.
pub fn state_key(world_id: &str, table: &str) -> String {
    format!("{world_id}.{table}")
}

/// Reads `key`, decoding leniently. Missing state yields `default()`;
/// decode problems are logged and repaired, never fatal.
pub fn load_named_state<T>(
    backend: &dyn StateBackend,
    key: &str,
    decode: impl FnOnce(&str) -> Decoded<T>,
    default: impl FnOnce() -> T,
) -> Result<T, PersistenceError> {
    let contents = backend.read(key).map_err(|source| PersistenceError::Io {
        key: key.to_string(),
        source,
    })?;
    let Some(contents) = contents else {
        return Ok(default());
    };
    let decoded = decode(&contents);
    for issue in &decoded.issues {
        tracing::warn!(
            target: "aether::persistence",
            key,
            %issue,
            "state.malformed_entry"
        );
    }
    Ok(decoded.value)
}

impl WorldStore {
    /// Snapshot of everything this store persists, in key order.
    pub fn to_state(&self) -> WorldState {
        let ledgers = self
            .ledgers
            .iter()
            .map(|(cell, ledger)| LedgerState {
                pos: cell.packed(),
                current: quantities_to_state(&ledger.current_quantities()),
                max: quantities_to_state(&ledger.max_quantities()),
                last_recovery_tick: ledger.last_recovery_tick(),
                expended_this_window: ledger.expended_this_window(),
                window_start_tick: ledger.window_start_tick(),
            })
            .collect();

        let dead_zones = self
            .dead_zones
            .iter()
            .map(|(cell, entry)| match &entry.zone {
                DeadZone::Temporary {
                    drain_remaining,
                    initial_drain,
                    recovery_target,
                } => DeadZoneState {
                    pos: cell.packed(),
                    kind: DeadZoneKindState::Temporary,
                    drain_remaining: *drain_remaining,
                    initial_drain: *initial_drain,
                    recovery_target: *recovery_target,
                    created_tick: entry.created_tick,
                },
                DeadZone::Permanent => DeadZoneState {
                    pos: cell.packed(),
                    kind: DeadZoneKindState::Permanent,
                    created_tick: entry.created_tick,
                    ..DeadZoneState::default()
                },
            })
            .collect();

        let corruption = self
            .records
            .iter()
            .filter(|(_, record)| !record.is_prunable())
            .map(|(cell, record)| CorruptionRecordState {
                pos: cell.packed(),
                status: record.status,
                classification: record
                    .classification
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_default(),
                last_updated: record.last_updated,
                last_corrupted: record.last_corrupted,
                last_regenerated: record.last_regenerated,
                last_clean: record.last_clean,
                corruption_events: record.corruption_events,
                regeneration_events: record.regeneration_events,
                marker_placements: record.marker_placements,
                resource_deltas: quantities_to_state(&record.resource_deltas),
                aether_consumed: quantities_to_state(&record.aether_consumed),
            })
            .collect();

        let modifiers = self
            .modifiers
            .iter()
            .map(|(classification, deltas)| ModifierState {
                classification: classification.as_str().to_string(),
                deltas: quantities_to_state(deltas),
            })
            .collect();

        WorldState {
            ledgers: Table::new(ledgers),
            dead_zones: Table::new(dead_zones),
            corruption: Table::new(corruption),
            modifiers: Table::new(modifiers),
        }
    }

    /// Rebuilds a store from persisted state. Out-of-range ledgers are
    /// clamped, duplicate cells keep their first entry and clean records are
    /// dropped. The result starts clean.
    pub fn from_state(config: &AetherConfig, state: WorldState) -> Self {
        let mut store = WorldStore::new(config);
        let world = store.world_id().to_string();
        let mut repaired = 0usize;

        for entry in state.dead_zones.entries {
            let cell = CellCoord::from_packed(entry.pos);
            let zone = match entry.kind {
                DeadZoneKindState::Permanent => DeadZone::Permanent,
                DeadZoneKindState::Temporary => DeadZone::Temporary {
                    drain_remaining: finite_or_zero(entry.drain_remaining),
                    initial_drain: finite_or_zero(entry.initial_drain),
                    recovery_target: entry.recovery_target,
                },
            };
            if store.dead_zones.contains(cell) {
                repaired += 1;
                continue;
            }
            store.dead_zones.insert_entry(
                cell,
                DeadZoneEntry {
                    zone,
                    created_tick: entry.created_tick,
                },
            );
        }

        for entry in state.ledgers.entries {
            let cell = CellCoord::from_packed(entry.pos);
            if store.dead_zones.contains(cell) {
                repaired += 1;
                continue;
            }
            let (ledger, clamped) = ResourceLedger::from_parts(
                &quantities_from_state(&entry.current),
                &quantities_from_state(&entry.max),
                entry.last_recovery_tick,
                entry.expended_this_window,
                entry.window_start_tick,
            );
            repaired += usize::from(clamped);
            match store.ledgers.entry(cell) {
                Entry::Vacant(slot) => {
                    slot.insert(ledger);
                }
                Entry::Occupied(_) => repaired += 1,
            }
        }

        for entry in state.corruption.entries {
            let cell = CellCoord::from_packed(entry.pos);
            let classification = (!entry.classification.trim().is_empty())
                .then(|| ClassificationId::new(entry.classification.trim()));
            let record = CorruptionRecord {
                status: entry.status,
                classification,
                last_updated: entry.last_updated,
                last_corrupted: entry.last_corrupted,
                last_regenerated: entry.last_regenerated,
                last_clean: entry.last_clean,
                corruption_events: entry.corruption_events,
                regeneration_events: entry.regeneration_events,
                marker_placements: entry.marker_placements,
                resource_deltas: quantities_from_state(&entry.resource_deltas)
                    .into_iter()
                    .filter(|(_, delta)| *delta != 0)
                    .collect(),
                aether_consumed: quantities_from_state(&entry.aether_consumed)
                    .into_iter()
                    .filter(|(_, amount)| *amount > 0)
                    .collect(),
            };
            if record.is_prunable() {
                continue;
            }
            match store.records.entry(cell) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(_) => repaired += 1,
            }
        }

        for entry in state.modifiers.entries {
            if entry.classification.trim().is_empty() {
                repaired += 1;
                continue;
            }
            let classification = ClassificationId::new(entry.classification.trim());
            if store.modifiers.get(&classification).is_some() {
                repaired += 1;
                continue;
            }
            store
                .modifiers
                .insert(classification, quantities_from_state(&entry.deltas));
        }

        if repaired > 0 {
            tracing::warn!(
                target: "aether::persistence",
                world = %world,
                repaired,
                "state.repaired"
            );
        }
        store.clear_dirty();
        store
    }

    /// Loads this world's tables from `backend`. Missing tables start empty.
    pub fn load(config: &AetherConfig, backend: &dyn StateBackend) -> Result<Self, PersistenceError> {
        let world = config.world_id();
        let state = WorldState {
            ledgers: load_named_state(
                backend,
                &state_key(world, LEDGER_TABLE_KEY),
                decode_ledger_table,
                Table::default,
            )?,
            dead_zones: load_named_state(
                backend,
                &state_key(world, DEAD_ZONE_TABLE_KEY),
                decode_dead_zone_table,
                Table::default,
            )?,
            corruption: load_named_state(
                backend,
                &state_key(world, CORRUPTION_TABLE_KEY),
                decode_corruption_table,
                Table::default,
            )?,
            modifiers: load_named_state(
                backend,
                &state_key(world, MODIFIER_TABLE_KEY),
                decode_modifier_table,
                Table::default,
            )?,
        };
        let store = Self::from_state(config, state);
        tracing::info!(
            target: "aether::persistence",
            world = %world,
            ledgers = store.ledger_count(),
            dead_zones = store.dead_zones().len(),
            records = store.record_count(),
            "state.loaded"
        );
        Ok(store)
    }

    /// Writes every table when the store is dirty. Returns whether anything
    /// was written.
    pub fn save(&mut self, backend: &dyn StateBackend) -> Result<bool, PersistenceError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let state = self.to_state();
        let world = self.world_id().to_string();
        write_table(backend, &state_key(&world, LEDGER_TABLE_KEY), &state.ledgers)?;
        write_table(backend, &state_key(&world, DEAD_ZONE_TABLE_KEY), &state.dead_zones)?;
        write_table(backend, &state_key(&world, CORRUPTION_TABLE_KEY), &state.corruption)?;
        write_table(backend, &state_key(&world, MODIFIER_TABLE_KEY), &state.modifiers)?;
        self.clear_dirty();
        tracing::info!(
            target: "aether::persistence",
            world = %world,
            ledgers = state.ledgers.entries.len(),
            dead_zones = state.dead_zones.entries.len(),
            records = state.corruption.entries.len(),
            "state.saved"
        );
        Ok(true)
    }
}

fn write_table<T: Serialize>(
    backend: &dyn StateBackend,
    key: &str,
    table: &Table<T>,
) -> Result<(), PersistenceError> {
    let json = encode_table_json(table).map_err(|source| PersistenceError::Encode {
        key: key.to_string(),
        source,
    })?;
    backend.write(key, &json).map_err(|source| PersistenceError::Io {
        key: key.to_string(),
        source,
    })
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
