//! Point-in-polygon and bounding boxes.
//!
//! Coordinates are mapped onto the plane as `x = longitude`, `y = latitude`.
//! No projection is applied; risk cells are small enough that planar
//! containment is what the source grid was built with.

use geo::{BoundingRect, Coord, Intersects, LineString, Rect};
use safeway_env::Coordinate;

/// Even-odd ray casting containment test.
///
/// A ray is cast from `point` towards increasing longitude and the edges
/// straddling the point's latitude are counted; an odd count means inside.
/// The ring is implicitly closed, so a trailing duplicate of the first vertex
/// changes nothing (it only adds a zero-length edge).
///
/// Points exactly on an edge or vertex may be reported either way.
/// Degenerate rings (fewer than 3 vertices, self-intersections) give a
/// best-effort answer and never panic.
pub fn contains(point: Coordinate, ring: &[Coordinate]) -> bool {
    let n = ring.len();
    if n == 0 {
        return false;
    }

    let px = point.longitude;
    let py = point.latitude;

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].longitude, ring[i].latitude);
        let (xj, yj) = (ring[j].longitude, ring[j].latitude);

        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Axis-aligned bounding box of a ring, in lon/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    rect: Rect<f64>,
}

impl BoundingBox {
    /// Computes the bounding box of a ring. `None` for an empty ring.
    pub fn from_ring(ring: &[Coordinate]) -> Option<Self> {
        let line: LineString<f64> = ring.iter().map(|c| to_coord(*c)).collect();
        line.bounding_rect().map(|rect| Self { rect })
    }

    pub fn min_longitude(&self) -> f64 {
        self.rect.min().x
    }

    pub fn max_longitude(&self) -> f64 {
        self.rect.max().x
    }

    pub fn min_latitude(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_latitude(&self) -> f64 {
        self.rect.max().y
    }

    /// Inclusive point test.
    ///
    /// Never rejects a point that [`contains`] would accept for the same ring.
    pub fn contains_point(&self, point: Coordinate) -> bool {
        point.longitude >= self.min_longitude()
            && point.longitude <= self.max_longitude()
            && point.latitude >= self.min_latitude()
            && point.latitude <= self.max_latitude()
    }

    /// True if the two boxes share any point (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.rect.intersects(&other.rect)
    }

    /// True if the interiors overlap; boxes sharing only an edge or corner
    /// do not count.
    pub fn overlaps_interior(&self, other: &BoundingBox) -> bool {
        self.min_longitude() < other.max_longitude()
            && other.min_longitude() < self.max_longitude()
            && self.min_latitude() < other.max_latitude()
            && other.min_latitude() < self.max_latitude()
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let min = Coord {
            x: self.min_longitude().min(other.min_longitude()),
            y: self.min_latitude().min(other.min_latitude()),
        };
        let max = Coord {
            x: self.max_longitude().max(other.max_longitude()),
            y: self.max_latitude().max(other.max_latitude()),
        };
        BoundingBox {
            rect: Rect::new(min, max),
        }
    }

    /// Returns true if every bound is a finite number.
    pub fn is_finite(&self) -> bool {
        self.min_longitude().is_finite()
            && self.max_longitude().is_finite()
            && self.min_latitude().is_finite()
            && self.max_latitude().is_finite()
    }
}

fn to_coord(c: Coordinate) -> Coord<f64> {
    Coord {
        x: c.longitude,
        y: c.latitude,
    }
}
