use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::components::{CellCoord, ClassificationId};

/// Why a cell or region was left out of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionFault {
    #[error("cell {0} is not loaded")]
    CellUnloaded(CellCoord),
    #[error("terrain classification for cell {0} could not be resolved")]
    ClassificationUnresolved(CellCoord),
}

/// Limits that keep a region search bounded per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub max_radius: u32,
    pub max_cells: usize,
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self {
            max_radius: 8,
            max_cells: 1024,
        }
    }
}

/// Contiguous cells sharing one terrain classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    classification: ClassificationId,
    cells: Vec<CellCoord>,
    truncated: bool,
}

impl Region {
    pub fn classification(&self) -> &ClassificationId {
        &self.classification
    }

    /// Cells in discovery order. The seed comes first.
    pub fn cells(&self) -> &[CellCoord] {
        &self.cells
    }

    /// The cell that stands in for the whole region on reads.
    pub fn representative(&self) -> CellCoord {
        self.cells[0]
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        self.cells.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether the cell cap stopped the search early.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Breadth-first search outward from `seed` over orthogonal neighbours.
///
/// A neighbour joins the region only if it is loaded, reports the same
/// classification as the seed and lies within `bounds.max_radius`
/// (Chebyshev) of the seed. The search stops once `bounds.max_cells`
/// cells have been admitted. The seed itself is always admitted; callers
/// resolve its classification first.
pub fn discover_region(
    seed: CellCoord,
    classification: &ClassificationId,
    bounds: RegionBounds,
    mut is_loaded: impl FnMut(CellCoord) -> bool,
    mut classify: impl FnMut(CellCoord) -> Option<ClassificationId>,
) -> Region {
    let max_cells = bounds.max_cells.max(1);
    let mut cells = vec![seed];
    let mut visited: HashSet<CellCoord> = HashSet::from([seed]);
    let mut frontier = VecDeque::from([seed]);
    let mut truncated = false;

    'search: while let Some(cell) = frontier.pop_front() {
        for neighbor in cell.neighbors() {
            if !visited.insert(neighbor) {
                continue;
            }
            if seed.chebyshev_distance(neighbor) > bounds.max_radius {
                continue;
            }
            if !is_loaded(neighbor) {
                continue;
            }
            if classify(neighbor).as_ref() != Some(classification) {
                continue;
            }
            if cells.len() >= max_cells {
                truncated = true;
                break 'search;
            }
            cells.push(neighbor);
            frontier.push_back(neighbor);
        }
    }

    Region {
        classification: classification.clone(),
        cells,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Builds a grid from rows of single-letter classifications; `.` is unloaded.
    fn grid(rows: &[&str]) -> HashMap<CellCoord, ClassificationId> {
        let mut cells = HashMap::new();
        for (z, row) in rows.iter().enumerate() {
            for (x, symbol) in row.chars().enumerate() {
                if symbol != '.' {
                    cells.insert(
                        CellCoord::new(x as i32, z as i32),
                        ClassificationId::new(symbol.to_string()),
                    );
                }
            }
        }
        cells
    }

    fn search(
        cells: &HashMap<CellCoord, ClassificationId>,
        seed: CellCoord,
        bounds: RegionBounds,
    ) -> Region {
        let classification = cells[&seed].clone();
        discover_region(
            seed,
            &classification,
            bounds,
            |cell| cells.contains_key(&cell),
            |cell| cells.get(&cell).cloned(),
        )
    }

    #[test]
    fn region_stays_within_its_classification() {
        let cells = grid(&["ffss", "ffss", "sfff", "..ff"]);
        let region = search(&cells, CellCoord::new(0, 0), RegionBounds::default());

        assert_eq!(region.representative(), CellCoord::new(0, 0));
        assert_eq!(region.len(), 9);
        for cell in region.cells() {
            assert_eq!(cells[cell].as_str(), "f", "{cell} leaked into the region");
        }
        assert!(!region.contains(CellCoord::new(0, 2)));
        assert!(!region.is_truncated());
    }

    #[test]
    fn unloaded_cells_split_regions() {
        let cells = grid(&["ff.ff"]);
        let region = search(&cells, CellCoord::new(0, 0), RegionBounds::default());
        assert_eq!(region.cells(), &[CellCoord::new(0, 0), CellCoord::new(1, 0)]);
    }

    #[test]
    fn radius_limits_reach() {
        let cells = grid(&["fffffff"]);
        let region = search(
            &cells,
            CellCoord::new(3, 0),
            RegionBounds {
                max_radius: 1,
                max_cells: 100,
            },
        );
        let mut found: Vec<_> = region.cells().iter().map(|cell| cell.x).collect();
        found.sort_unstable();
        assert_eq!(found, vec![2, 3, 4]);
    }

    #[test]
    fn cell_cap_bounds_large_regions() {
        let rows: Vec<String> = (0..40).map(|_| "p".repeat(40)).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let cells = grid(&rows);

        let region = search(
            &cells,
            CellCoord::new(20, 20),
            RegionBounds {
                max_radius: 64,
                max_cells: 50,
            },
        );
        assert_eq!(region.len(), 50);
        assert!(region.is_truncated());
    }

    #[test]
    fn unresolvable_neighbors_are_excluded() {
        let cells = grid(&["fff"]);
        let region = discover_region(
            CellCoord::new(0, 0),
            &ClassificationId::new("f"),
            RegionBounds::default(),
            |cell| cells.contains_key(&cell),
            |cell| (cell.x != 1).then(|| ClassificationId::new("f")),
        );
        assert_eq!(region.cells(), &[CellCoord::new(0, 0)]);
    }
}
