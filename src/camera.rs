//! Map view state and the Web Mercator projection used for pixel-space tests.

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use std::f64::consts::PI;

use crate::consts::{DEFAULT_ZOOM, MAX_MERCATOR_LAT, TILE_SIZE_PX};
use crate::doc::Coord;

/// A point in projected pixel space or screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// View over the map: what is centered, how far zoomed in, and how big the viewport is.
///
/// Projected pixels are absolute Web Mercator pixels at the current zoom.
/// Screen pixels are relative to the top-left of the viewport.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub center: Coord,
    pub zoom: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { center: Coord::new(0.0, 0.0), zoom: DEFAULT_ZOOM, viewport_width: 0.0, viewport_height: 0.0 }
    }
}

impl Camera {
    #[must_use]
    pub fn with_zoom(zoom: f64) -> Self {
        Self { zoom, ..Self::default() }
    }

    /// World width in pixels at the current zoom.
    #[must_use]
    pub fn world_size(&self) -> f64 {
        TILE_SIZE_PX * self.zoom.exp2()
    }

    /// Project a coordinate to absolute pixels at the current zoom.
    #[must_use]
    pub fn project(&self, coord: Coord) -> Point {
        let size = self.world_size();
        let lat = coord.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let x = (coord.lng + 180.0) / 360.0 * size;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * size;
        Point { x, y }
    }

    /// Inverse of [`Camera::project`].
    #[must_use]
    pub fn unproject(&self, point: Point) -> Coord {
        let size = self.world_size();
        let lng = point.x / size * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * point.y / size);
        let lat = n.sinh().atan().to_degrees();
        Coord { lng, lat }
    }

    /// Convert a viewport pixel position to a coordinate.
    #[must_use]
    pub fn screen_to_coord(&self, screen: Point) -> Coord {
        let origin = self.top_left();
        self.unproject(Point { x: origin.x + screen.x, y: origin.y + screen.y })
    }

    /// Convert a coordinate to a viewport pixel position.
    #[must_use]
    pub fn coord_to_screen(&self, coord: Coord) -> Point {
        let origin = self.top_left();
        let p = self.project(coord);
        Point { x: p.x - origin.x, y: p.y - origin.y }
    }

    fn top_left(&self) -> Point {
        let c = self.project(self.center);
        Point { x: c.x - self.viewport_width / 2.0, y: c.y - self.viewport_height / 2.0 }
    }
}
