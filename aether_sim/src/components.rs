use std::collections::BTreeMap;
use std::fmt;

use aether_schema::{pack_cell, unpack_cell};
use serde::{Deserialize, Serialize};

/// Addresses one fixed-size terrain cell on the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn packed(self) -> u64 {
        pack_cell(self.x, self.z)
    }

    pub fn from_packed(key: u64) -> Self {
        let (x, z) = unpack_cell(key);
        Self { x, z }
    }

    /// Orthogonal neighbours in a fixed order: east, west, south, north.
    pub fn neighbors(self) -> [CellCoord; 4] {
        [
            CellCoord::new(self.x.wrapping_add(1), self.z),
            CellCoord::new(self.x.wrapping_sub(1), self.z),
            CellCoord::new(self.x, self.z.wrapping_add(1)),
            CellCoord::new(self.x, self.z.wrapping_sub(1)),
        ]
    }

    pub fn chebyshev_distance(self, other: CellCoord) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dz = (self.z as i64 - other.z as i64).unsigned_abs();
        dx.max(dz).min(u32::MAX as u64) as u32
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Terrain classification reported by the host for a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassificationId(String);

impl ClassificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One kind of aether tracked by ledgers and corruption records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource quantities keyed by kind. Ordered so iteration is deterministic.
pub type Quantities = BTreeMap<ResourceKind, i64>;

pub fn quantities_from_state(raw: &BTreeMap<String, i64>) -> Quantities {
    raw.iter()
        .map(|(kind, amount)| (ResourceKind::new(kind.as_str()), *amount))
        .collect()
}

pub fn quantities_to_state(quantities: &Quantities) -> BTreeMap<String, i64> {
    quantities
        .iter()
        .map(|(kind, amount)| (kind.as_str().to_string(), *amount))
        .collect()
}
