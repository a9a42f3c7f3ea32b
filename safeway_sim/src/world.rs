//! Synthetic risk grids for simulation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use safeway_core::{RiskGrid, RiskTiers};
use safeway_env::{Coordinate, RiskLevel};

/// Layout of a generated checkerboard grid.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Seed for occurrence counts
    pub seed: u64,

    /// Cells along latitude
    pub rows: usize,

    /// Cells along longitude
    pub cols: usize,

    /// Edge length of a square cell in degrees
    pub cell_size_deg: f64,

    /// South-west corner of the grid
    pub origin: Coordinate,

    /// Add one cell straddling the first four cells
    pub with_overlap: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rows: 6,
            cols: 6,
            cell_size_deg: 0.005,
            // São Paulo city centre
            origin: Coordinate::new(-23.56, -46.66),
            with_overlap: false,
        }
    }
}

/// Generated world: the grid plus the layout it was built from.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pub config: WorldConfig,
    pub grid: RiskGrid,
}

impl SimWorld {
    /// Builds a checkerboard with random counts drawn across every tier.
    ///
    /// Cell ids run row by row from the origin; the overlap cell, when
    /// requested, comes last.
    pub fn new(config: WorldConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let tiers = RiskTiers::default();

        let mut parts = Vec::with_capacity(config.rows * config.cols + 1);
        for row in 0..config.rows {
            for col in 0..config.cols {
                let level = RiskLevel::all()[rng.gen_range(0..RiskLevel::all().len())];
                let count = sample_count(&mut rng, level, &tiers);
                parts.push((cell_ring(&config, row as f64, col as f64, 1.0), count));
            }
        }

        if config.with_overlap && config.rows >= 2 && config.cols >= 2 {
            let count = (tiers.very_high_above + 500).max(0) as u64;
            parts.push((cell_ring(&config, 0.5, 0.5, 1.0), count));
        }

        let grid = RiskGrid::from_parts_with_tiers(parts, &tiers);
        Self { config, grid }
    }

    /// Builds a single row of cells with the given counts, left to right.
    pub fn strip(config: WorldConfig, counts: &[u64]) -> Self {
        let parts = counts
            .iter()
            .enumerate()
            .map(|(col, &count)| (cell_ring(&config, 0.0, col as f64, 1.0), count));
        let grid = RiskGrid::from_parts(parts);
        Self {
            config: WorldConfig {
                rows: 1,
                cols: counts.len(),
                ..config
            },
            grid,
        }
    }

    /// Centre of the cell at `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> Coordinate {
        let size = self.config.cell_size_deg;
        Coordinate::new(
            self.config.origin.latitude + (row as f64 + 0.5) * size,
            self.config.origin.longitude + (col as f64 + 0.5) * size,
        )
    }

    /// A point well outside every cell.
    pub fn outside(&self) -> Coordinate {
        let size = self.config.cell_size_deg;
        Coordinate::new(
            self.config.origin.latitude - 2.0 * size,
            self.config.origin.longitude - 2.0 * size,
        )
    }

    /// Id of the cell at `(row, col)` in a checkerboard or strip.
    pub fn cell_id(&self, row: usize, col: usize) -> usize {
        row * self.config.cols + col
    }

    pub fn level_at(&self, row: usize, col: usize) -> Option<RiskLevel> {
        self.grid.cell(self.cell_id(row, col)).map(|c| c.level)
    }
}

/// Square ring with its south-west corner at `(row, col)` in cell units.
fn cell_ring(config: &WorldConfig, row: f64, col: f64, span: f64) -> Vec<Coordinate> {
    let size = config.cell_size_deg;
    let lat0 = config.origin.latitude + row * size;
    let lon0 = config.origin.longitude + col * size;
    let lat1 = lat0 + span * size;
    let lon1 = lon0 + span * size;
    vec![
        Coordinate::new(lat0, lon0),
        Coordinate::new(lat1, lon0),
        Coordinate::new(lat1, lon1),
        Coordinate::new(lat0, lon1),
        Coordinate::new(lat0, lon0),
    ]
}

/// Random count that classifies to `level`.
fn sample_count(rng: &mut ChaCha8Rng, level: RiskLevel, tiers: &RiskTiers) -> u64 {
    let (lo, hi) = match level {
        RiskLevel::None => (0, tiers.very_low - 1),
        RiskLevel::VeryLow => (tiers.very_low, tiers.low - 1),
        RiskLevel::Low => (tiers.low, tiers.moderate - 1),
        RiskLevel::Moderate => (tiers.moderate, tiers.high - 1),
        RiskLevel::High => (tiers.high, tiers.very_high_above),
        RiskLevel::VeryHigh => (tiers.very_high_above + 1, tiers.very_high_above * 2),
    };
    rng.gen_range(lo..=hi).max(0) as u64
}
