//! Waypoints
//!
//! A session carries two unrelated waypoint lists:
//!
//! - [`GridWaypoints`]: cells in the small preview grid, clicked in by the
//!   operator to sketch a path around the rover marker. Local preview only.
//! - mission waypoints: real-valued [`MissionWaypoint`] coordinates imported
//!   from a file, which form the sequence actually sent to the vehicle.
//!
//! The two live in different coordinate spaces and are never merged or compared.

use serde::{Deserialize, Serialize};

use crate::error::WaypointError;

/// Rows and columns in the preview grid
pub const GRID_SIZE: u8 = 10;

/// Cell permanently occupied by the rover marker (centre of the grid)
pub const MARKER_CELL: GridCell = GridCell { row: 4, col: 4 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u8,
    pub col: u8,
}

impl GridCell {
    pub fn new(row: u8, col: u8) -> Self {
        GridCell { row, col }
    }

    pub fn is_marker(&self) -> bool {
        *self == MARKER_CELL
    }

    pub fn in_grid(&self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }
}

/// Outcome of [`GridWaypoints::toggle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggled {
    Added,
    Removed,
}

/// Ordered set of distinct grid cells, never containing the marker cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GridWaypoints(Vec<GridCell>);

impl GridWaypoints {
    pub fn new() -> Self {
        GridWaypoints(Vec::new())
    }

    /// Add the cell if absent, remove it if present.
    ///
    /// Removal keeps the order of the remaining cells. The marker cell and
    /// cells outside the grid are rejected without changing anything.
    pub fn toggle(&mut self, cell: GridCell) -> Result<Toggled, WaypointError> {
        if cell.is_marker() {
            return Err(WaypointError::MarkerCell {
                row: cell.row,
                col: cell.col,
            });
        }
        if !cell.in_grid() {
            return Err(WaypointError::OutOfGrid {
                row: cell.row,
                col: cell.col,
                size: GRID_SIZE,
            });
        }

        match self.0.iter().position(|c| *c == cell) {
            Some(index) => {
                self.0.remove(index);
                Ok(Toggled::Removed)
            }
            None => {
                self.0.push(cell);
                Ok(Toggled::Added)
            }
        }
    }

    /// 1-based order of the cell in the path, as labelled in the preview
    pub fn position(&self, cell: GridCell) -> Option<usize> {
        self.0.iter().position(|c| *c == cell).map(|i| i + 1)
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        self.0.contains(&cell)
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A coordinate in the vehicle's mission frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissionWaypoint {
    pub x: f64,
    pub y: f64,
}

impl MissionWaypoint {
    pub fn new(x: f64, y: f64) -> Self {
        MissionWaypoint { x, y }
    }
}
