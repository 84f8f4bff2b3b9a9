//! Hit-testing against shapes in the geometry model.
//!
//! Shapes are tested in document order and the first match wins, so a shape
//! drawn earlier takes precedence over a later one covering the same spot.
//! Each kind has its own tolerance:
//!
//! | Kind | Rule |
//! |------|------|
//! | Point | great-circle distance below [`POINT_HIT_RADIUS_M`] meters |
//! | LineString | projected distance to any segment below [`LINE_HIT_SLOP_PX`] pixels |
//! | Polygon | inside the lng/lat bounding box (edges inclusive) |
//!
//! The polygon rule is a coarse envelope test, not point-in-polygon: clicks in
//! the empty corners of a concave or rotated ring still select it.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::camera::{Camera, Point};
use crate::consts::{LINE_HIT_SLOP_PX, POINT_HIT_RADIUS_M};
use crate::doc::{Coord, Geometry, GeometryModel, Shape, ShapeId, haversine_m};

/// Return the first shape in document order under `click`.
#[must_use]
pub fn hit_test(click: Coord, model: &GeometryModel, camera: &Camera) -> Option<ShapeId> {
    model.iter().find(|shape| shape_hit(click, shape, camera)).map(|shape| shape.id)
}

/// Whether `click` selects this particular shape.
#[must_use]
pub fn shape_hit(click: Coord, shape: &Shape, camera: &Camera) -> bool {
    match &shape.geometry {
        Geometry::Point(at) => haversine_m(*at, click) < POINT_HIT_RADIUS_M,
        Geometry::LineString(points) => near_polyline(click, points, camera),
        Geometry::Polygon(ring) => Bounds::of(ring).is_some_and(|b| b.contains(click)),
    }
}

fn near_polyline(click: Coord, points: &[Coord], camera: &Camera) -> bool {
    let p = camera.project(click);
    points.windows(2).any(|pair| {
        let a = camera.project(pair[0]);
        let b = camera.project(pair[1]);
        segment_distance(p, a, b) < LINE_HIT_SLOP_PX
    })
}

/// Distance from `p` to the closed segment `a`–`b`.
#[must_use]
pub fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Axis-aligned lng/lat envelope of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coord,
    pub north_east: Coord,
}

impl Bounds {
    /// Envelope of `coords`, or `None` when empty.
    #[must_use]
    pub fn of(coords: &[Coord]) -> Option<Self> {
        let first = *coords.first()?;
        let mut b = Self { south_west: first, north_east: first };
        for c in &coords[1..] {
            b.south_west.lng = b.south_west.lng.min(c.lng);
            b.south_west.lat = b.south_west.lat.min(c.lat);
            b.north_east.lng = b.north_east.lng.max(c.lng);
            b.north_east.lat = b.north_east.lat.max(c.lat);
        }
        Some(b)
    }

    #[must_use]
    pub fn contains(&self, c: Coord) -> bool {
        c.lat >= self.south_west.lat
            && c.lat <= self.north_east.lat
            && c.lng >= self.south_west.lng
            && c.lng <= self.north_east.lng
    }
}
