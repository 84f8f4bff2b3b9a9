//! Drawing controller: the per-session state machine behind the map.
//!
//! `EngineCore` owns the geometry model, the active tool, the draft and the
//! selection. Map input (`on_click`, `on_drag_end`) and toolbar commands
//! (`set_tool`, `finish`, `clear_all`, `rename_selected`, ...) mutate that
//! state and return a list of [`Action`]s for the host to apply to the map
//! widget. Nothing in here performs I/O.
//!
//! Loads are asynchronous and unguarded, so the engine hands out a
//! [`LoadTicket`] stamped with the current session epoch. Closing or clearing
//! the session, or beginning a newer load, advances the epoch; a load that
//! finishes with an old ticket is rejected as [`StaleLoad`].

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::autosave::{Debouncer, SavePolicy, Schedule};
use crate::camera::Camera;
use crate::config::MapConfig;
use crate::doc::{Coord, Geometry, GeometryModel, Shape, ShapeId, ShapeKind};
use crate::error::ErrorCode;
use crate::geojson::{self, DocumentError};
use crate::hit::hit_test;
use crate::input::{Draft, Tool, UiState};

/// Actions returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ShapeCreated { id: ShapeId },
    ShapeMoved { id: ShapeId },
    ShapeRemoved { id: ShapeId },
    ShapeRenamed { id: ShapeId },
    /// Draw or update the temporary overlay for the draft.
    PreviewChanged { kind: ShapeKind, points: Vec<Coord> },
    PreviewCleared,
    Highlight { id: ShapeId },
    ClearHighlight { id: ShapeId },
    /// Ask the user to confirm or edit a shape's name.
    EditNameRequested { id: ShapeId, name: String },
    RenderNeeded,
    /// The auto-save policy wants the document written back now.
    AutoSaveRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("document has no shapes")]
    EmptyDocument,
    #[error("no shape is selected")]
    NoSelection,
    #[error("unknown shape {0}")]
    UnknownShape(ShapeId),
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        "E_VALIDATION"
    }

    fn user_message(&self) -> String {
        match self {
            Self::EmptyName => "Please enter a name.".to_owned(),
            Self::EmptyDocument => "There is nothing on the map to save.".to_owned(),
            Self::NoSelection => "Select a shape first.".to_owned(),
            Self::UnknownShape(_) => "That shape no longer exists.".to_owned(),
        }
    }
}

/// Proof that a load was started in a given session epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    epoch: u64,
    name: String,
}

impl LoadTicket {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A load finished after the session it was started in moved on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("discarding stale load of `{name}`")]
pub struct StaleLoad {
    pub name: String,
}

/// Core engine state, independent of any map widget.
pub struct EngineCore {
    pub model: GeometryModel,
    pub camera: Camera,
    pub ui: UiState,
    pub draft: Draft,
    debouncer: Debouncer,
    epoch: u64,
    closed: bool,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(SavePolicy::Explicit, Camera::default())
    }
}

impl EngineCore {
    #[must_use]
    pub fn new(policy: SavePolicy, camera: Camera) -> Self {
        Self {
            model: GeometryModel::new(),
            camera,
            ui: UiState::default(),
            draft: Draft::new(),
            debouncer: Debouncer::new(policy),
            epoch: 0,
            closed: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.save_policy, Camera::with_zoom(config.map_zoom))
    }

    // --- Queries ---

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.ui.tool
    }

    /// The currently selected shape, if any.
    #[must_use]
    pub fn selection(&self) -> Option<ShapeId> {
        self.ui.selected_id
    }

    #[must_use]
    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.model.get(id)
    }

    #[must_use]
    pub fn save_policy(&self) -> SavePolicy {
        self.debouncer.policy()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // --- Map input ---

    /// Handle a click on the map at `coord`, interpreted by the active tool.
    pub fn on_click(&mut self, coord: Coord) -> Vec<Action> {
        match self.ui.tool {
            Tool::Marker => self.commit(Geometry::Point(coord)),
            Tool::Line | Tool::Polygon => self.extend_draft(coord),
            Tool::Delete => match hit_test(coord, &self.model, &self.camera) {
                Some(id) => self.remove(id),
                None => Vec::new(),
            },
            Tool::None => self.select_at(coord),
        }
    }

    /// Handle the end of a marker drag.
    ///
    /// # Errors
    ///
    /// Returns `UnknownShape` if `id` is not in the model.
    pub fn on_drag_end(&mut self, id: ShapeId, coord: Coord) -> Result<Vec<Action>, ValidationError> {
        let shape = self.model.get_mut(&id).ok_or(ValidationError::UnknownShape(id))?;
        if !shape.move_to(coord) {
            debug!(%id, kind = ?shape.kind(), "ignoring drag of non-marker shape");
            return Ok(Vec::new());
        }
        let mut actions = vec![Action::ShapeMoved { id }, Action::RenderNeeded];
        self.edited(&mut actions);
        Ok(actions)
    }

    // --- Tools ---

    /// Switch tools, committing any draft drawn with the previous one.
    pub fn set_tool(&mut self, tool: Tool) -> Vec<Action> {
        let actions = self.commit_draft();
        self.ui.tool = tool;
        actions
    }

    /// Commit the draft under the current tool without switching tools.
    pub fn finish(&mut self) -> Vec<Action> {
        self.commit_draft()
    }

    /// Empty the map: shapes, draft, tool and selection. In-flight loads become
    /// stale and any pending auto-save is dropped.
    pub fn clear_all(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(prev) = self.ui.selected_id.take() {
            actions.push(Action::ClearHighlight { id: prev });
        }
        if !self.draft.is_empty() {
            self.draft.clear();
            actions.push(Action::PreviewCleared);
        }
        let removed = self.model.len();
        self.model.clear();
        self.ui.tool = Tool::None;
        self.epoch += 1;
        info!(removed, "cleared map");
        actions.push(Action::RenderNeeded);
        self.edited(&mut actions);
        actions
    }

    // --- Selection / editing ---

    /// Select a shape by reference.
    ///
    /// # Errors
    ///
    /// Returns `UnknownShape` if `id` is not in the model.
    pub fn select(&mut self, id: ShapeId) -> Result<Vec<Action>, ValidationError> {
        let name = self
            .model
            .get(&id)
            .map(|s| s.props.display_name().to_owned())
            .ok_or(ValidationError::UnknownShape(id))?;
        let mut actions = Vec::new();
        if let Some(prev) = self.ui.selected_id.filter(|prev| *prev != id) {
            actions.push(Action::ClearHighlight { id: prev });
        }
        self.ui.selected_id = Some(id);
        actions.push(Action::Highlight { id });
        actions.push(Action::EditNameRequested { id, name });
        Ok(actions)
    }

    /// Select whatever is under `coord`, or deselect on a miss.
    pub fn select_at(&mut self, coord: Coord) -> Vec<Action> {
        match hit_test(coord, &self.model, &self.camera) {
            Some(id) => self.select(id).unwrap_or_default(),
            None => self.deselect(),
        }
    }

    pub fn deselect(&mut self) -> Vec<Action> {
        match self.ui.selected_id.take() {
            Some(prev) => vec![Action::ClearHighlight { id: prev }],
            None => Vec::new(),
        }
    }

    /// Rename a shape. The name is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `EmptyName` for a blank name or `UnknownShape` if `id` is gone;
    /// nothing changes in either case.
    pub fn rename(&mut self, id: ShapeId, name: &str) -> Result<Vec<Action>, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let shape = self.model.get_mut(&id).ok_or(ValidationError::UnknownShape(id))?;
        name.clone_into(&mut shape.props.name);
        debug!(%id, new_name = name, "renamed shape");
        let mut actions = vec![Action::ShapeRenamed { id }, Action::RenderNeeded];
        self.edited(&mut actions);
        Ok(actions)
    }

    /// Rename the selected shape.
    ///
    /// # Errors
    ///
    /// Returns `NoSelection` when nothing is selected, otherwise as [`Self::rename`].
    pub fn rename_selected(&mut self, name: &str) -> Result<Vec<Action>, ValidationError> {
        let id = self.ui.selected_id.ok_or(ValidationError::NoSelection)?;
        self.rename(id, name)
    }

    /// Remove a shape by reference.
    ///
    /// # Errors
    ///
    /// Returns `UnknownShape` if `id` is not in the model.
    pub fn delete(&mut self, id: ShapeId) -> Result<Vec<Action>, ValidationError> {
        if self.model.get(&id).is_none() {
            return Err(ValidationError::UnknownShape(id));
        }
        Ok(self.remove(id))
    }

    /// Remove the selected shape.
    ///
    /// # Errors
    ///
    /// Returns `NoSelection` when nothing is selected.
    pub fn delete_selected(&mut self) -> Result<Vec<Action>, ValidationError> {
        let id = self.ui.selected_id.ok_or(ValidationError::NoSelection)?;
        self.delete(id)
    }

    // --- Documents ---

    /// Serialize the current model.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export(&self) -> Result<Value, DocumentError> {
        geojson::export_value(&self.model)
    }

    /// Replace every shape with `shapes`, dropping the selection and any pending auto-save.
    pub fn replace_document(&mut self, shapes: Vec<Shape>) -> Vec<Action> {
        let mut actions = self.deselect();
        self.model.replace_all(shapes);
        self.debouncer.cancel();
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Start a load. Any earlier load still in flight becomes stale.
    pub fn begin_load(&mut self, name: &str) -> LoadTicket {
        self.epoch += 1;
        LoadTicket { epoch: self.epoch, name: name.to_owned() }
    }

    /// Apply a finished load if its ticket is still current.
    ///
    /// # Errors
    ///
    /// Returns `StaleLoad`, leaving the session untouched, if the session was
    /// closed, cleared, or a newer load was started since `begin_load`.
    pub fn finish_load(&mut self, ticket: LoadTicket, shapes: Vec<Shape>) -> Result<Vec<Action>, StaleLoad> {
        if self.closed || ticket.epoch != self.epoch {
            info!(file = %ticket.name, "discarding stale load");
            return Err(StaleLoad { name: ticket.name });
        }
        info!(file = %ticket.name, shapes = shapes.len(), "loaded document");
        Ok(self.replace_document(shapes))
    }

    /// Tear down the session. Loads still in flight will be discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.epoch += 1;
        self.draft.clear();
        self.debouncer.cancel();
    }

    /// Fire a deferred auto-save if one is due.
    pub fn poll_autosave(&mut self, now: Instant) -> Option<Action> {
        if self.debouncer.poll(now) { Some(Action::AutoSaveRequested) } else { None }
    }

    // --- Internals ---

    fn extend_draft(&mut self, coord: Coord) -> Vec<Action> {
        let Some(kind) = self.ui.tool.draft_kind() else {
            return Vec::new();
        };
        self.draft.push(coord);
        if self.draft.shows_preview(kind) {
            vec![Action::PreviewChanged { kind, points: self.draft.points().to_vec() }]
        } else {
            Vec::new()
        }
    }

    fn commit_draft(&mut self) -> Vec<Action> {
        if self.draft.is_empty() {
            return Vec::new();
        }
        let mut actions = vec![Action::PreviewCleared];
        let Some(kind) = self.ui.tool.draft_kind() else {
            self.draft.clear();
            return actions;
        };
        match self.draft.take_geometry(kind) {
            Some(geometry) => actions.extend(self.commit(geometry)),
            None => debug!(?kind, "discarding draft with too few points"),
        }
        actions
    }

    fn commit(&mut self, geometry: Geometry) -> Vec<Action> {
        let shape = Shape::new(geometry);
        let id = shape.id;
        let name = shape.props.name.clone();
        info!(%id, kind = ?shape.kind(), "shape created");
        self.model.add_shape(shape);
        let mut actions =
            vec![Action::ShapeCreated { id }, Action::EditNameRequested { id, name }, Action::RenderNeeded];
        self.edited(&mut actions);
        actions
    }

    fn remove(&mut self, id: ShapeId) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.model.remove_shape(&id).is_none() {
            return actions;
        }
        if self.ui.selected_id == Some(id) {
            self.ui.selected_id = None;
            actions.push(Action::ClearHighlight { id });
        }
        info!(%id, "shape removed");
        actions.push(Action::ShapeRemoved { id });
        actions.push(Action::RenderNeeded);
        self.edited(&mut actions);
        actions
    }

    fn edited(&mut self, actions: &mut Vec<Action>) {
        // An empty map is never saved, so there is nothing to schedule.
        if self.model.is_empty() {
            self.debouncer.cancel();
            return;
        }
        if self.debouncer.on_edit(Instant::now()) == Schedule::SaveNow {
            actions.push(Action::AutoSaveRequested);
        }
    }
}
