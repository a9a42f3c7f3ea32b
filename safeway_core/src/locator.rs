//! Zone location: which risk cell (if any) contains a point.
//!
//! Cells are tested in grid load order and the first containing cell wins.
//! The source grids are expected not to overlap; when they do, the earlier
//! cell in the document is the deterministic answer. No strategy changes
//! that answer, they only skip cells that cannot contain the point.

use safeway_env::{Coordinate, RiskLevel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::{RiskCell, RiskGrid};

/// Result of a successful containment query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMatch {
    pub cell_id: usize,
    pub level: RiskLevel,
}

/// Candidate selection for [`ZoneLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocateStrategy {
    /// Ray-cast every cell
    Exhaustive,

    /// Reject cells whose bounding box excludes the point first
    BoundingBox,

    /// Only test cells registered in the point's bucket of the grid's
    /// [`crate::grid::BucketIndex`]; falls back to `BoundingBox` when the
    /// grid has no index
    Bucketed,
}

impl Default for LocateStrategy {
    fn default() -> Self {
        LocateStrategy::BoundingBox
    }
}

/// Finds the containing risk cell for a point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneLocator {
    strategy: LocateStrategy,
}

impl ZoneLocator {
    pub fn new(strategy: LocateStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> LocateStrategy {
        self.strategy
    }

    /// First cell (in load order) whose ring contains `point`.
    pub fn locate(&self, point: Coordinate, grid: &RiskGrid) -> Option<ZoneMatch> {
        self.containing_cells(point, grid)
            .next()
            .map(|cell| ZoneMatch {
                cell_id: cell.id,
                level: cell.level,
            })
    }

    /// Every cell containing `point`, in load order.
    ///
    /// More than one id means the grid overlaps at this point.
    pub fn locate_all(&self, point: Coordinate, grid: &RiskGrid) -> Vec<usize> {
        self.containing_cells(point, grid).map(|cell| cell.id).collect()
    }

    fn containing_cells<'g>(
        &self,
        point: Coordinate,
        grid: &'g RiskGrid,
    ) -> Box<dyn Iterator<Item = &'g RiskCell> + 'g> {
        match self.strategy {
            LocateStrategy::Exhaustive => Box::new(
                grid.cells()
                    .iter()
                    .filter(move |cell| cell.contains(point)),
            ),
            LocateStrategy::BoundingBox => Box::new(
                grid.cells()
                    .iter()
                    .filter(move |cell| bbox_then_ring(cell, point)),
            ),
            LocateStrategy::Bucketed => match grid.bucket_index() {
                Some(index) => Box::new(
                    index
                        .candidates(point)
                        .into_iter()
                        .filter_map(move |id| grid.cell(id))
                        .filter(move |cell| bbox_then_ring(cell, point)),
                ),
                None => {
                    debug!("Grid has no bucket index, scanning with bounding boxes");
                    Box::new(
                        grid.cells()
                            .iter()
                            .filter(move |cell| bbox_then_ring(cell, point)),
                    )
                }
            },
        }
    }
}

fn bbox_then_ring(cell: &RiskCell, point: Coordinate) -> bool {
    match cell.bbox() {
        Some(bbox) => bbox.contains_point(point) && cell.contains(point),
        // Empty ring: nothing can be inside
        None => false,
    }
}

/// Locates with the default strategy (bounding-box pre-check).
pub fn locate(point: Coordinate, grid: &RiskGrid) -> Option<ZoneMatch> {
    ZoneLocator::default().locate(point, grid)
}
