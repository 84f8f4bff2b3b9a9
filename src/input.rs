//! Input model: drawing tools and the ephemeral draft state.
//!
//! `Tool` captures what a map click means right now. `Draft` holds the
//! vertices of a line or polygon that is still being drawn; it is never
//! persisted and is only turned into a shape when the drawing is finished.
//! `UiState` bundles the tool with the current selection so both live on the
//! session object instead of in globals.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::doc::{Coord, Geometry, ShapeId, ShapeKind};

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// No drawing tool; clicks select shapes.
    #[default]
    None,
    /// Each click drops a marker.
    Marker,
    /// Clicks accumulate line vertices.
    Line,
    /// Clicks accumulate polygon vertices.
    Polygon,
    /// Clicks remove the shape under the pointer.
    Delete,
}

impl Tool {
    /// The shape kind this tool accumulates vertices for, if it draws multi-click shapes.
    #[must_use]
    pub fn draft_kind(self) -> Option<ShapeKind> {
        match self {
            Self::Line => Some(ShapeKind::LineString),
            Self::Polygon => Some(ShapeKind::Polygon),
            Self::None | Self::Marker | Self::Delete => None,
        }
    }
}

/// Persistent UI state shared by the drawing and selection logic.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    /// Currently active tool.
    pub tool: Tool,
    /// The id of the currently selected shape, if any.
    pub selected_id: Option<ShapeId>,
}

/// In-progress line or polygon.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    points: Vec<Coord>,
}

impl Draft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, coord: Coord) {
        self.points.push(coord);
    }

    #[must_use]
    pub fn points(&self) -> &[Coord] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the preview overlay should be visible for `kind`.
    #[must_use]
    pub fn shows_preview(&self, kind: ShapeKind) -> bool {
        self.points.len() >= kind.min_points()
    }

    /// Turn the collected vertices into a geometry of `kind`, emptying the draft.
    ///
    /// Returns `None`, still emptying the draft, when there are too few vertices.
    pub fn take_geometry(&mut self, kind: ShapeKind) -> Option<Geometry> {
        let points = std::mem::take(&mut self.points);
        if points.len() < kind.min_points() {
            return None;
        }
        match kind {
            ShapeKind::LineString => Some(Geometry::LineString(points)),
            ShapeKind::Polygon => Some(Geometry::Polygon(points)),
            ShapeKind::Point => points.first().copied().map(Geometry::Point),
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
