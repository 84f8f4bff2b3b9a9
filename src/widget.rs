//! Map widget seam.
//!
//! The engine never talks to a concrete map. Hosts implement [`MapWidget`]
//! over whatever draws the tiles and layers, and feed engine output through
//! [`apply_actions`].

#[cfg(test)]
#[path = "widget_test.rs"]
mod widget_test;

use crate::doc::{Coord, GeometryModel, ShapeId, ShapeKind};
use crate::engine::Action;

/// What a map host must be able to do with engine output.
pub trait MapWidget {
    /// Redraw every shape layer from the model.
    fn render(&mut self, model: &GeometryModel);
    fn highlight(&mut self, id: ShapeId);
    fn clear_highlight(&mut self, id: ShapeId);
    /// Draw the temporary overlay for an unfinished line or polygon.
    fn show_preview(&mut self, kind: ShapeKind, points: &[Coord]);
    fn clear_preview(&mut self);
    /// Show the name editor for a shape, pre-filled with `name`.
    fn open_name_editor(&mut self, id: ShapeId, name: &str);
}

/// Apply a batch of engine actions to the widget.
///
/// Repeated render requests collapse into a single `render` after the rest of
/// the batch. Returns true if the batch asked for an auto-save, which is the
/// host's job, not the widget's.
pub fn apply_actions<W: MapWidget + ?Sized>(widget: &mut W, model: &GeometryModel, actions: &[Action]) -> bool {
    let mut render = false;
    let mut autosave = false;
    for action in actions {
        match action {
            Action::Highlight { id } => widget.highlight(*id),
            Action::ClearHighlight { id } => widget.clear_highlight(*id),
            Action::PreviewChanged { kind, points } => widget.show_preview(*kind, points),
            Action::PreviewCleared => widget.clear_preview(),
            Action::EditNameRequested { id, name } => widget.open_name_editor(*id, name),
            Action::ShapeCreated { .. }
            | Action::ShapeMoved { .. }
            | Action::ShapeRemoved { .. }
            | Action::ShapeRenamed { .. }
            | Action::RenderNeeded => render = true,
            Action::AutoSaveRequested => autosave = true,
        }
    }
    if render {
        widget.render(model);
    }
    autosave
}
