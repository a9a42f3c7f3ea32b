//! The risk grid: immutable risk cells loaded once from GeoJSON.
//!
//! Cells keep the order of the source document. A cell's `id` is its index
//! in the grid, which is also the tie-break order used by the locator when
//! cells overlap.

use safeway_env::{Coordinate, RiskLevel};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::RiskTiers;
use crate::config::EngineConfig;
use crate::geometry::BoundingBox;
use crate::locator::LocateStrategy;

/// Grid loading errors (fatal for the whole document)
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Failed to read grid: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse grid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not a GeoJSON FeatureCollection")]
    NotFeatureCollection,
}

/// Why a single feature was dropped (recoverable, loading continues)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedCell {
    #[error("feature has no geometry")]
    MissingGeometry,

    #[error("unsupported geometry type {0:?}")]
    UnsupportedGeometry(String),

    #[error("polygon has no outer ring")]
    EmptyRing,

    #[error("ring position {0} is not a [lon, lat] pair")]
    BadCoordinate(usize),

    #[error("no numeric occurrence property")]
    MissingOccurrenceCount,
}

/// A polygon region annotated with a historical incident count.
#[derive(Debug, Clone)]
pub struct RiskCell {
    /// Index in the grid (stable for the grid's lifetime)
    pub id: usize,

    /// Outer ring, implicitly closed
    pub ring: Vec<Coordinate>,

    /// Historical incident count
    pub occurrence_count: u64,

    /// Level derived from `occurrence_count` at load time
    pub level: RiskLevel,

    /// Optional display name from the feature properties
    pub name: Option<String>,

    /// Position of the feature in the source document
    pub feature_index: usize,

    bbox: Option<BoundingBox>,
}

impl RiskCell {
    /// Bounding box of the ring; `None` only for an empty ring.
    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    /// Full containment test against this cell's ring.
    pub fn contains(&self, point: Coordinate) -> bool {
        crate::geometry::contains(point, &self.ring)
    }
}

/// Uniform lat/lon bucket index over cell bounding boxes.
///
/// Each cell is registered in every bucket its bounding box touches. Cells
/// whose box would span too many buckets (or is not finite) go into a
/// catch-all list checked for every query.
#[derive(Debug, Clone)]
pub struct BucketIndex {
    cell_size_deg: f64,
    buckets: HashMap<(i64, i64), Vec<usize>>,
    oversized: Vec<usize>,
}

impl BucketIndex {
    /// Upper bound on buckets a single cell may occupy.
    const MAX_BUCKETS_PER_CELL: i64 = 4096;

    fn build(cells: &[RiskCell], cell_size_deg: f64) -> Self {
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        let mut oversized = Vec::new();

        for cell in cells {
            let bbox = match cell.bbox() {
                Some(b) if b.is_finite() => b,
                _ => {
                    oversized.push(cell.id);
                    continue;
                }
            };

            let lat0 = Self::key_of(bbox.min_latitude(), cell_size_deg);
            let lat1 = Self::key_of(bbox.max_latitude(), cell_size_deg);
            let lon0 = Self::key_of(bbox.min_longitude(), cell_size_deg);
            let lon1 = Self::key_of(bbox.max_longitude(), cell_size_deg);

            let span = lat1
                .saturating_sub(lat0)
                .saturating_add(1)
                .saturating_mul(lon1.saturating_sub(lon0).saturating_add(1));
            if span > Self::MAX_BUCKETS_PER_CELL {
                oversized.push(cell.id);
                continue;
            }

            for lat_key in lat0..=lat1 {
                for lon_key in lon0..=lon1 {
                    buckets.entry((lat_key, lon_key)).or_default().push(cell.id);
                }
            }
        }

        Self {
            cell_size_deg,
            buckets,
            oversized,
        }
    }

    fn key_of(value: f64, cell_size_deg: f64) -> i64 {
        (value / cell_size_deg).floor() as i64
    }

    /// Bucket edge length in degrees.
    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    /// Number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Candidate cell ids for a point, ascending (grid load order).
    pub fn candidates(&self, point: Coordinate) -> Vec<usize> {
        let mut ids = self.oversized.clone();

        if point.latitude.is_finite() && point.longitude.is_finite() {
            let key = (
                Self::key_of(point.latitude, self.cell_size_deg),
                Self::key_of(point.longitude, self.cell_size_deg),
            );
            if let Some(bucket) = self.buckets.get(&key) {
                ids.extend_from_slice(bucket);
            }
        }

        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Summary of a grid load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Features turned into cells
    pub loaded: usize,

    /// Dropped features: (feature index, reason)
    pub skipped: Vec<(usize, MalformedCell)>,
}

/// Immutable collection of risk cells.
///
/// Read-only after construction; share it between sessions with `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RiskGrid {
    cells: Vec<RiskCell>,
    index: Option<BucketIndex>,
}

impl RiskGrid {
    /// Builds a grid from rings and counts, classified with the default tiers.
    pub fn from_parts<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (Vec<Coordinate>, u64)>,
    {
        Self::from_parts_with_tiers(parts, &RiskTiers::default())
    }

    /// Builds a grid from rings and counts with a specific tier table.
    pub fn from_parts_with_tiers<I>(parts: I, tiers: &RiskTiers) -> Self
    where
        I: IntoIterator<Item = (Vec<Coordinate>, u64)>,
    {
        let cells = parts
            .into_iter()
            .enumerate()
            .map(|(i, (ring, count))| build_cell(i, i, ring, count, None, tiers))
            .collect();

        Self { cells, index: None }
    }

    /// Builds the bucket index used by `LocateStrategy::Bucketed`.
    ///
    /// A size that is not finite and positive leaves the grid without an
    /// index, so lookups fall back to the bounding-box scan.
    pub fn with_bucket_index(mut self, cell_size_deg: f64) -> Self {
        if !(cell_size_deg.is_finite() && cell_size_deg > 0.0) {
            warn!("Invalid bucket size {} deg, not indexing", cell_size_deg);
            self.index = None;
            return self;
        }
        self.index = Some(BucketIndex::build(&self.cells, cell_size_deg));
        self
    }

    /// Bucket index, if one was built.
    pub fn bucket_index(&self) -> Option<&BucketIndex> {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells in load order.
    pub fn cells(&self) -> &[RiskCell] {
        &self.cells
    }

    /// Cell by id.
    pub fn cell(&self, id: usize) -> Option<&RiskCell> {
        self.cells.get(id)
    }

    /// Bounding box of the whole grid.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.cells
            .iter()
            .filter_map(|c| c.bbox().copied())
            .reduce(|acc, b| acc.union(&b))
    }

    /// Number of cells per risk level.
    pub fn level_histogram(&self) -> BTreeMap<RiskLevel, usize> {
        let mut histogram = BTreeMap::new();
        for cell in &self.cells {
            *histogram.entry(cell.level).or_insert(0) += 1;
        }
        histogram
    }

    /// Pairs of cells `(a, b)` with `a < b` whose bounding box interiors
    /// overlap. Cells that merely share an edge are not reported.
    ///
    /// A bounding-box overlap does not imply the polygons overlap; this is
    /// the cheap audit used to check the non-overlap precondition of the
    /// source data.
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.cells.iter().enumerate() {
            let Some(a_box) = a.bbox() else { continue };
            for b in &self.cells[i + 1..] {
                if let Some(b_box) = b.bbox() {
                    if a_box.overlaps_interior(b_box) {
                        pairs.push((a.id, b.id));
                    }
                }
            }
        }
        pairs
    }
}

fn build_cell(
    id: usize,
    feature_index: usize,
    ring: Vec<Coordinate>,
    occurrence_count: u64,
    name: Option<String>,
    tiers: &RiskTiers,
) -> RiskCell {
    let bbox = BoundingBox::from_ring(&ring);
    let level = tiers.classify(i64::try_from(occurrence_count).unwrap_or(i64::MAX));
    RiskCell {
        id,
        ring,
        occurrence_count,
        level,
        name,
        feature_index,
        bbox,
    }
}

// ============================================================================
// GEOJSON LOADER
// ============================================================================

/// Raw feature as found in the document. Everything optional; validation
/// happens in [`GridLoader::parse_feature`].
#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: Option<String>,
    coordinates: Option<Value>,
}

/// Loads a [`RiskGrid`] from a GeoJSON FeatureCollection.
///
/// Only `Polygon` features are used, and only their outer ring. Malformed
/// features are skipped with a warning.
#[derive(Debug, Clone)]
pub struct GridLoader {
    occurrence_keys: Vec<String>,
    tiers: RiskTiers,
    bucket_size_deg: Option<f64>,
}

impl Default for GridLoader {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl GridLoader {
    /// Loader honouring the config's property keys, tiers and locate strategy.
    pub fn from_config(config: &EngineConfig) -> Self {
        let bucket_size_deg = match config.locate_strategy {
            LocateStrategy::Bucketed => Some(config.bucket_size_deg),
            _ => None,
        };
        Self {
            occurrence_keys: config.occurrence_keys.clone(),
            tiers: config.tiers,
            bucket_size_deg,
        }
    }

    /// Loads from a file path.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(RiskGrid, LoadReport), GridError> {
        let path = path.as_ref();
        info!("Loading risk grid from {:?}", path);
        let file = File::open(path)?;
        self.load_reader(BufReader::new(file))
    }

    /// Loads from any reader.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<(RiskGrid, LoadReport), GridError> {
        let document: Value = serde_json::from_reader(reader)?;
        self.load_value(document)
    }

    /// Loads from a JSON string.
    pub fn load_str(&self, json: &str) -> Result<(RiskGrid, LoadReport), GridError> {
        let document: Value = serde_json::from_str(json)?;
        self.load_value(document)
    }

    /// Loads from a parsed document.
    ///
    /// Anything other than a FeatureCollection object is rejected.
    pub fn load_value(&self, document: Value) -> Result<(RiskGrid, LoadReport), GridError> {
        let features = match document {
            Value::Object(mut obj) => {
                let is_collection = obj
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(false, |t| t == "FeatureCollection");
                match (is_collection, obj.remove("features")) {
                    (true, Some(Value::Array(features))) => features,
                    _ => return Err(GridError::NotFeatureCollection),
                }
            }
            _ => return Err(GridError::NotFeatureCollection),
        };

        let mut cells = Vec::with_capacity(features.len());
        let mut report = LoadReport::default();

        for (feature_index, feature) in features.into_iter().enumerate() {
            match self.parse_feature(feature) {
                Ok((ring, count, name)) => {
                    let id = cells.len();
                    cells.push(build_cell(id, feature_index, ring, count, name, &self.tiers));
                }
                Err(reason) => {
                    warn!("Skipping feature {}: {}", feature_index, reason);
                    report.skipped.push((feature_index, reason));
                }
            }
        }

        report.loaded = cells.len();
        info!(
            "Loaded {} risk cells ({} skipped)",
            report.loaded,
            report.skipped.len()
        );

        let mut grid = RiskGrid { cells, index: None };
        if let Some(size) = self.bucket_size_deg {
            grid = grid.with_bucket_index(size);
            debug!(
                "Built bucket index: {} buckets at {} deg",
                grid.bucket_index().map_or(0, BucketIndex::bucket_count),
                size
            );
        }

        Ok((grid, report))
    }

    fn parse_feature(
        &self,
        feature: Value,
    ) -> Result<(Vec<Coordinate>, u64, Option<String>), MalformedCell> {
        let raw: RawFeature =
            serde_json::from_value(feature).map_err(|_| MalformedCell::MissingGeometry)?;

        let geometry = raw.geometry.ok_or(MalformedCell::MissingGeometry)?;
        let kind = geometry.kind.unwrap_or_default();
        if kind != "Polygon" {
            return Err(MalformedCell::UnsupportedGeometry(kind));
        }

        let ring = parse_outer_ring(geometry.coordinates.as_ref())?;

        let properties = raw.properties.as_ref().and_then(Value::as_object);
        let count = self
            .occurrence_keys
            .iter()
            .find_map(|key| properties.and_then(|p| p.get(key)).and_then(parse_count))
            .ok_or(MalformedCell::MissingOccurrenceCount)?;

        let name = properties
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok((ring, count, name))
    }
}

/// Extracts `coordinates[0]` as a ring of `[lon, lat, ...]` positions.
fn parse_outer_ring(coordinates: Option<&Value>) -> Result<Vec<Coordinate>, MalformedCell> {
    let outer = coordinates
        .and_then(Value::as_array)
        .and_then(|rings| rings.first())
        .and_then(Value::as_array)
        .ok_or(MalformedCell::EmptyRing)?;

    if outer.is_empty() {
        return Err(MalformedCell::EmptyRing);
    }

    outer
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let pair = position.as_array().filter(|p| p.len() >= 2);
            match pair.map(|p| (p[0].as_f64(), p[1].as_f64())) {
                Some((Some(lon), Some(lat))) => Ok(Coordinate::from_lon_lat(lon, lat)),
                _ => Err(MalformedCell::BadCoordinate(i)),
            }
        })
        .collect()
}

/// Reads an occurrence count from a number or numeric string.
///
/// Fractions are truncated toward zero and negatives clamp to zero.
fn parse_count(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some(u);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !number.is_finite() {
        return None;
    }
    Some(number.max(0.0).trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(lon: f64, lat: f64, size: f64) -> Value {
        json!([[
            [lon, lat],
            [lon, lat + size],
            [lon + size, lat + size],
            [lon + size, lat],
            [lon, lat]
        ]])
    }

    fn polygon_feature(lon: f64, lat: f64, count: Value) -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Polygon", "coordinates": square(lon, lat, 1.0) },
            "properties": { "occurrenceCount": count }
        })
    }

    #[test]
    fn test_load_feature_collection() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                polygon_feature(0.0, 0.0, json!(1200)),
                polygon_feature(2.0, 0.0, json!(60)),
            ]
        });

        let (grid, report) = GridLoader::default().load_value(doc).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(report.loaded, 2);
        assert!(report.skipped.is_empty());

        let first = grid.cell(0).unwrap();
        assert_eq!(first.occurrence_count, 1200);
        assert_eq!(first.level, RiskLevel::High);
        assert_eq!(first.ring.len(), 5);
        assert_eq!(first.ring[1], Coordinate::new(1.0, 0.0));

        assert_eq!(grid.cell(1).unwrap().level, RiskLevel::VeryLow);
    }

    #[test]
    fn test_malformed_features_skipped_ids_stay_dense() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": null, "properties": { "count": 10 } },
                polygon_feature(0.0, 0.0, json!(700)),
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
                    "properties": { "count": 10 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": square(0.0, 0.0, 1.0) },
                    "properties": { "label": "no count" }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [[[0.0, 0.0], ["a", 1.0], [1.0, 1.0]]] },
                    "properties": { "count": 10 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [] },
                    "properties": { "count": 10 }
                },
                polygon_feature(5.0, 5.0, json!(2000)),
            ]
        });

        let (grid, report) = GridLoader::default().load_value(doc).unwrap();
        assert_eq!(grid.len(), 2);

        let reasons: Vec<_> = report.skipped.iter().map(|(i, r)| (*i, r.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (0, MalformedCell::MissingGeometry),
                (2, MalformedCell::UnsupportedGeometry("Point".to_string())),
                (3, MalformedCell::MissingOccurrenceCount),
                (4, MalformedCell::BadCoordinate(1)),
                (5, MalformedCell::EmptyRing),
            ]
        );

        assert_eq!(grid.cell(0).unwrap().feature_index, 1);
        assert_eq!(grid.cell(1).unwrap().id, 1);
        assert_eq!(grid.cell(1).unwrap().feature_index, 6);
        assert_eq!(grid.cell(1).unwrap().level, RiskLevel::VeryHigh);
    }

    #[test]
    fn test_holes_ignored() {
        let doc = json!([{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [
                    [[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]],
                    [[1.0, 1.0], [1.0, 2.0], [2.0, 2.0], [2.0, 1.0]]
                ]
            },
            "properties": { "count": 300 }
        }]);

        let (grid, _) = GridLoader::default().load_value(doc).unwrap();
        let cell = grid.cell(0).unwrap();
        assert_eq!(cell.ring.len(), 4);
        assert!(cell.contains(Coordinate::new(1.5, 1.5)));
    }

    #[test]
    fn test_count_parsing() {
        assert_eq!(parse_count(&json!(42)), Some(42));
        assert_eq!(parse_count(&json!(42.9)), Some(42));
        assert_eq!(parse_count(&json!(-3)), Some(0));
        assert_eq!(parse_count(&json!("1501")), Some(1501));
        assert_eq!(parse_count(&json!("many")), None);
        assert_eq!(parse_count(&json!(null)), None);
        assert_eq!(parse_count(&json!(true)), None);
    }

    #[test]
    fn test_occurrence_key_priority() {
        let doc = json!([{
            "type": "Feature",
            "geometry": { "type": "Polygon", "coordinates": square(0.0, 0.0, 1.0) },
            "properties": { "weight": 10, "occurrences": 600, "name": "Sé" }
        }]);

        let (grid, _) = GridLoader::default().load_value(doc).unwrap();
        let cell = grid.cell(0).unwrap();
        assert_eq!(cell.occurrence_count, 600);
        assert_eq!(cell.name.as_deref(), Some("Sé"));
    }

    #[test]
    fn test_not_a_feature_collection() {
        let loader = GridLoader::default();
        assert!(matches!(
            loader.load_value(json!({"type": "Feature"})),
            Err(GridError::NotFeatureCollection)
        ));
        assert!(matches!(
            loader.load_value(json!(5)),
            Err(GridError::NotFeatureCollection)
        ));
        assert!(matches!(
            loader.load_value(json!([polygon_feature(0.0, 0.0, json!(600))])),
            Err(GridError::NotFeatureCollection)
        ));
        assert!(matches!(loader.load_str("{"), Err(GridError::Json(_))));
    }

    #[test]
    fn test_bucket_index_candidates() {
        let grid = RiskGrid::from_parts(vec![
            (
                vec![
                    Coordinate::from_lon_lat(0.0, 0.0),
                    Coordinate::from_lon_lat(0.0, 1.0),
                    Coordinate::from_lon_lat(1.0, 1.0),
                    Coordinate::from_lon_lat(1.0, 0.0),
                ],
                100,
            ),
            (
                vec![
                    Coordinate::from_lon_lat(3.0, 3.0),
                    Coordinate::from_lon_lat(3.0, 4.0),
                    Coordinate::from_lon_lat(4.0, 4.0),
                    Coordinate::from_lon_lat(4.0, 3.0),
                ],
                100,
            ),
        ])
        .with_bucket_index(0.5);

        let index = grid.bucket_index().unwrap();
        assert_eq!(index.candidates(Coordinate::new(0.25, 0.25)), vec![0]);
        assert_eq!(index.candidates(Coordinate::new(3.5, 3.5)), vec![1]);
        assert!(index.candidates(Coordinate::new(10.0, 10.0)).is_empty());
        assert!(index.candidates(Coordinate::new(f64::NAN, 0.0)).is_empty());
    }

    #[test]
    fn test_oversized_cells_always_candidates() {
        let grid = RiskGrid::from_parts(vec![(
            vec![
                Coordinate::from_lon_lat(-50.0, -50.0),
                Coordinate::from_lon_lat(-50.0, 50.0),
                Coordinate::from_lon_lat(50.0, 50.0),
                Coordinate::from_lon_lat(50.0, -50.0),
            ],
            100,
        )])
        .with_bucket_index(0.01);

        let index = grid.bucket_index().unwrap();
        assert_eq!(index.bucket_count(), 0);
        assert_eq!(index.candidates(Coordinate::new(20.0, 20.0)), vec![0]);
    }

    #[test]
    fn test_overlapping_pairs_and_histogram() {
        let ring = |lon: f64| {
            vec![
                Coordinate::from_lon_lat(lon, 0.0),
                Coordinate::from_lon_lat(lon, 1.0),
                Coordinate::from_lon_lat(lon + 1.0, 1.0),
                Coordinate::from_lon_lat(lon + 1.0, 0.0),
            ]
        };
        let grid = RiskGrid::from_parts(vec![
            (ring(0.0), 1200),
            (ring(0.5), 1200),
            (ring(5.0), 10),
            (ring(6.0), 10),
        ]);

        assert_eq!(grid.overlapping_pairs(), vec![(0, 1)]);

        let histogram = grid.level_histogram();
        assert_eq!(histogram.get(&RiskLevel::High), Some(&2));
        assert_eq!(histogram.get(&RiskLevel::None), Some(&2));

        let bounds = grid.bounds().unwrap();
        assert_eq!(bounds.max_longitude(), 7.0);
    }
}
