//! Persisted layout for the aether and corruption store.
//!
//! Every table is a flat list of keyed entries. Cells are addressed by a
//! packed 64-bit coordinate (see [`pack_cell`]); resource quantities are
//! written as `kind -> amount` maps so field names survive a save/load
//! cycle unchanged.

mod decode;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;

use ahash::RandomState;
use serde::{Deserialize, Serialize};

pub use decode::{
    decode_corruption_table, decode_dead_zone_table, decode_ledger_table, decode_modifier_table,
    DecodeIssue, Decoded,
};

pub const LEDGER_TABLE_KEY: &str = "aether_ledgers";
pub const DEAD_ZONE_TABLE_KEY: &str = "aether_dead_zones";
pub const CORRUPTION_TABLE_KEY: &str = "aether_corruption";
pub const MODIFIER_TABLE_KEY: &str = "aether_modifiers";

pub const LAYOUT_VERSION: u32 = 1;

/// Packs a cell coordinate into the key used by every persisted table.
pub fn pack_cell(x: i32, z: i32) -> u64 {
    (x as u32 as u64) | ((z as u32 as u64) << 32)
}

pub fn unpack_cell(key: u64) -> (i32, i32) {
    let x = (key & 0xFFFF_FFFF) as u32 as i32;
    let z = (key >> 32) as u32 as i32;
    (x, z)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum CorruptionStatus {
    #[default]
    Pure,
    Tainted,
    Corrupted,
    Regenerating,
}

impl CorruptionStatus {
    pub const ALL: [CorruptionStatus; 4] = [
        CorruptionStatus::Pure,
        CorruptionStatus::Tainted,
        CorruptionStatus::Corrupted,
        CorruptionStatus::Regenerating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CorruptionStatus::Pure => "Pure",
            CorruptionStatus::Tainted => "Tainted",
            CorruptionStatus::Corrupted => "Corrupted",
            CorruptionStatus::Regenerating => "Regenerating",
        }
    }

    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(ordinal).ok()?).copied()
    }
}

impl fmt::Display for CorruptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorruptionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub pos: u64,
    pub current: BTreeMap<String, i64>,
    pub max: BTreeMap<String, i64>,
    pub last_recovery_tick: u64,
    pub expended_this_window: f64,
    pub window_start_tick: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadZoneKindState {
    #[default]
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeadZoneState {
    pub pos: u64,
    pub kind: DeadZoneKindState,
    pub drain_remaining: f64,
    pub initial_drain: f64,
    pub recovery_target: u64,
    pub created_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorruptionRecordState {
    pub pos: u64,
    pub status: CorruptionStatus,
    pub classification: String,
    pub last_updated: u64,
    pub last_corrupted: u64,
    pub last_regenerated: u64,
    pub last_clean: u64,
    pub corruption_events: u32,
    pub regeneration_events: u32,
    pub marker_placements: u32,
    pub resource_deltas: BTreeMap<String, i64>,
    pub aether_consumed: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifierState {
    pub classification: String,
    pub deltas: BTreeMap<String, i64>,
}

/// One persisted table: a version tag plus its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table<T> {
    pub version: u32,
    pub entries: Vec<T>,
}

impl<T> Table<T> {
    pub fn new(entries: Vec<T>) -> Self {
        Self {
            version: LAYOUT_VERSION,
            entries,
        }
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

pub type LedgerTable = Table<LedgerState>;
pub type DeadZoneTable = Table<DeadZoneState>;
pub type CorruptionTable = Table<CorruptionRecordState>;
pub type ModifierTable = Table<ModifierState>;

/// Everything one world persists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldState {
    pub ledgers: LedgerTable,
    pub dead_zones: DeadZoneTable,
    pub corruption: CorruptionTable,
    pub modifiers: ModifierTable,
}

/// Stable fingerprint of a world's persisted state.
pub fn hash_world_state(state: &WorldState) -> bincode::Result<u64> {
    let encoded = bincode::serialize(state)?;
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    Ok(hasher.finish())
}

pub fn encode_table_json<T: Serialize>(table: &Table<T>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(table)
}
