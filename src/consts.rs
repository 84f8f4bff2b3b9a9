//! Shared numeric constants for the map core.

// ── Geodesy ─────────────────────────────────────────────────────

/// Mean Earth radius in meters, as used by the web map's spherical CRS.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Web Mercator tile edge in pixels at zoom 0.
pub const TILE_SIZE_PX: f64 = 256.0;

/// Latitude clamp for the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// Default map zoom when nothing else is configured.
pub const DEFAULT_ZOOM: f64 = 13.0;

// ── Hit-testing ─────────────────────────────────────────────────

/// A click within this many meters of a marker selects it.
pub const POINT_HIT_RADIUS_M: f64 = 20.0;

/// A click within this many projected pixels of a line segment selects the line.
pub const LINE_HIT_SLOP_PX: f64 = 10.0;

// ── Drawing ─────────────────────────────────────────────────────

/// Minimum committed vertex count for a line.
pub const MIN_LINE_POINTS: usize = 2;

/// Minimum committed vertex count for a polygon ring (without closing vertex).
pub const MIN_POLYGON_POINTS: usize = 3;

/// Placeholder names for freshly drawn shapes.
pub const DEFAULT_MARKER_NAME: &str = "Marker";
pub const DEFAULT_LINE_NAME: &str = "Line";
pub const DEFAULT_POLYGON_NAME: &str = "Polygon";

/// Shown in the name editor when a shape has no usable name.
pub const UNTITLED_NAME: &str = "Untitled";

// ── Persistence ─────────────────────────────────────────────────

/// Minimum spacing between two auto-saves, in milliseconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 2000;
