//! Geometry model: drawn shapes, their properties, and the in-memory store.
//!
//! This module defines what is on the map (`Shape`, `Geometry`, `ShapeKind`),
//! the free-form property bag attached to every shape (`Props`), and the
//! runtime store that owns the shapes of the currently open document
//! (`GeometryModel`). It also carries the two measurement formulas used for
//! derived properties: great-circle line length and spherical polygon area.
//!
//! Shapes flow into this layer from the drawing engine (new shapes) and from
//! the GeoJSON importer (loaded documents). Nothing here knows about
//! rendering; the store only preserves document order, which doubles as
//! hit-test precedence.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use serde::Serialize;
use uuid::Uuid;

use crate::consts::{
    DEFAULT_LINE_NAME, DEFAULT_MARKER_NAME, DEFAULT_POLYGON_NAME, EARTH_RADIUS_M, MIN_LINE_POINTS,
    MIN_POLYGON_POINTS, UNTITLED_NAME,
};

/// In-session identifier for a shape. Not part of the persisted document.
pub type ShapeId = Uuid;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coord {
    /// Longitude in degrees, positive east.
    pub lng: f64,
    /// Latitude in degrees, positive north.
    pub lat: f64,
}

impl Coord {
    #[must_use]
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// GeoJSON position order: `[longitude, latitude]`.
    #[must_use]
    pub fn position(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// The kind of a shape, fixed when the shape is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShapeKind {
    /// Single marker.
    Point,
    /// Open polyline.
    LineString,
    /// Single-ring polygon.
    Polygon,
}

impl ShapeKind {
    /// GeoJSON geometry `type` string for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
        }
    }

    /// Parse a GeoJSON geometry `type` string. Other geometry types are unsupported.
    #[must_use]
    pub fn from_geojson_type(value: &str) -> Option<Self> {
        match value {
            "Point" => Some(Self::Point),
            "LineString" => Some(Self::LineString),
            "Polygon" => Some(Self::Polygon),
            _ => None,
        }
    }

    /// Placeholder name given to new shapes of this kind.
    #[must_use]
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Point => DEFAULT_MARKER_NAME,
            Self::LineString => DEFAULT_LINE_NAME,
            Self::Polygon => DEFAULT_POLYGON_NAME,
        }
    }

    /// Fewest vertices a committed shape of this kind may have.
    #[must_use]
    pub fn min_points(self) -> usize {
        match self {
            Self::Point => 1,
            Self::LineString => MIN_LINE_POINTS,
            Self::Polygon => MIN_POLYGON_POINTS,
        }
    }
}

/// Shape geometry. Polygons hold their outer ring only, without a closing vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Vec<Coord>),
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Point(_) => ShapeKind::Point,
            Self::LineString(_) => ShapeKind::LineString,
            Self::Polygon(_) => ShapeKind::Polygon,
        }
    }

    /// All vertices in drawing order.
    #[must_use]
    pub fn coords(&self) -> &[Coord] {
        match self {
            Self::Point(c) => std::slice::from_ref(c),
            Self::LineString(points) | Self::Polygon(points) => points,
        }
    }

    /// Whether the geometry has at least the minimum vertex count for its kind.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.coords().len() >= self.kind().min_points()
    }
}

/// Property bag persisted alongside a shape.
///
/// `name` is always present. `length` and `area` are derived measurements;
/// any other keys found in a loaded document ride along in `extra` so they
/// survive a save.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Props {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Props {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Name to show in the editor, falling back when blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() { UNTITLED_NAME } else { &self.name }
    }
}

/// One drawn object on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: ShapeId,
    pub geometry: Geometry,
    pub props: Props,
}

impl Shape {
    /// Build a new shape with a fresh id, the default name for its kind, and
    /// its derived measurement filled in.
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        let props = Props::named(geometry.kind().default_name());
        let mut shape = Self { id: Uuid::new_v4(), geometry, props };
        shape.measure();
        shape
    }

    /// Build a shape with explicit properties. Measurements already present
    /// in `props` are kept; missing ones are computed.
    #[must_use]
    pub fn with_props(geometry: Geometry, props: Props) -> Self {
        let mut shape = Self { id: Uuid::new_v4(), geometry, props };
        shape.measure();
        shape
    }

    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    /// Fill in the derived measurement for this kind if it is not already set.
    pub fn measure(&mut self) {
        match &self.geometry {
            Geometry::Point(_) => {}
            Geometry::LineString(points) => {
                if self.props.length.is_none() {
                    self.props.length = Some(compute_length(points));
                }
            }
            Geometry::Polygon(ring) => {
                if self.props.area.is_none() {
                    self.props.area = Some(compute_area(ring));
                }
            }
        }
    }

    /// Move a marker to a new coordinate. Returns false for lines and polygons.
    pub fn move_to(&mut self, coord: Coord) -> bool {
        match &mut self.geometry {
            Geometry::Point(c) => {
                *c = coord;
                true
            }
            Geometry::LineString(_) | Geometry::Polygon(_) => false,
        }
    }

    /// Compare everything except the in-session id.
    #[must_use]
    pub fn same_content(&self, other: &Shape) -> bool {
        self.geometry == other.geometry && self.props == other.props
    }
}

/// Ordered store of the shapes in the open document.
///
/// Order is insertion order and is significant: exports follow it and
/// hit-testing gives earlier shapes precedence.
#[derive(Debug, Clone, Default)]
pub struct GeometryModel {
    shapes: Vec<Shape>,
}

impl GeometryModel {
    #[must_use]
    pub fn new() -> Self {
        Self { shapes: Vec::new() }
    }

    /// Append a shape. Minimum vertex counts are the producer's responsibility.
    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    /// Remove a shape by id, returning it if it was present.
    pub fn remove_shape(&mut self, id: &ShapeId) -> Option<Shape> {
        let index = self.shapes.iter().position(|s| s.id == *id)?;
        Some(self.shapes.remove(index))
    }

    /// Drop every shape.
    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    /// Replace all shapes at once.
    pub fn replace_all(&mut self, shapes: Vec<Shape>) {
        self.shapes = shapes;
    }

    #[must_use]
    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id == *id)
    }

    pub fn get_mut(&mut self, id: &ShapeId) -> Option<&mut Shape> {
        self.shapes.iter_mut().find(|s| s.id == *id)
    }

    /// Shapes in document order.
    #[must_use]
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

// =============================================================================
// MEASUREMENT
// =============================================================================

/// Great-circle distance in meters (haversine).
#[must_use]
pub fn haversine_m(a: Coord, b: Coord) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Length of a polyline in meters. Zero for fewer than two points.
#[must_use]
pub fn compute_length(points: &[Coord]) -> f64 {
    points.windows(2).map(|pair| haversine_m(pair[0], pair[1])).sum()
}

/// Approximate area of a ring in square meters. Zero for fewer than three points.
///
/// Sums `(lng_j - lng_i) * (2 + sin(lat_i) + sin(lat_j))` over each edge from
/// the previous vertex `j` to vertex `i`, in radians, then scales by `R^2 / 2`.
/// A closing duplicate vertex adds a zero-length edge and does not change the result.
#[must_use]
pub fn compute_area(ring: &[Coord]) -> f64 {
    if ring.len() < MIN_POLYGON_POINTS {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (prev, cur) = (ring[j], ring[i]);
        let d_lng = (prev.lng - cur.lng).to_radians();
        sum += d_lng * (2.0 + prev.lat.to_radians().sin() + cur.lat.to_radians().sin());
        j = i;
    }
    (sum * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}
