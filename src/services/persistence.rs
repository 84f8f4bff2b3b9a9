//! Persistence gateway: save, load, list and delete documents for a session.
//!
//! DESIGN
//! ======
//! One gateway per session. It owns the session's persistence flags (the
//! single-flight save marker and the cached file list) as fields instead of
//! globals, and enforces the rules every caller must follow:
//!
//! - Nothing reaches the file store without a signed-in identity.
//! - Empty names and empty documents are rejected before any I/O.
//! - At most one save is in flight. A save requested while another is still
//!   running is dropped and logged, not queued.
//! - Deletes pass a yes/no confirmation gate first.
//! - Admin operations are separate calls and refuse non-admins.
//!
//! Loads return a parsed document; applying it to the map is the engine's
//! job (`EngineCore::finish_load`), so a failed load never touches the model.
//!
//! ERROR HANDLING
//! ==============
//! Failures are reported, never retried. A file-list refresh that fails after
//! a successful save or delete is logged and does not fail the operation.

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::auth::{AuthService, Identity};
use super::store::{DocumentEntry, FileStore, StoreError};
use crate::doc::GeometryModel;
use crate::engine::ValidationError;
use crate::error::ErrorCode;
use crate::geojson::{self, DocumentError, ImportReport};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sign in required")]
    AuthRequired,
    #[error("administrator rights required")]
    Forbidden,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("document not found")]
    NotFound,
    #[error("file store error: {0}")]
    Transport(String),
    #[error(transparent)]
    MalformedDocument(#[from] DocumentError),
}

impl From<StoreError> for PersistenceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound,
            StoreError::Unauthorized => Self::AuthRequired,
            StoreError::Transport(message) | StoreError::Decode(message) => Self::Transport(message),
        }
    }
}

impl ErrorCode for PersistenceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "E_AUTH_REQUIRED",
            Self::Forbidden => "E_FORBIDDEN",
            Self::Validation(e) => e.error_code(),
            Self::NotFound => "E_NOT_FOUND",
            Self::Transport(_) => "E_TRANSPORT",
            Self::MalformedDocument(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please sign in first.".to_owned(),
            Self::Forbidden => "Only administrators can do that.".to_owned(),
            Self::Validation(e) => e.user_message(),
            Self::NotFound => "That map file does not exist.".to_owned(),
            Self::Transport(_) => "The file server could not be reached. Try again.".to_owned(),
            Self::MalformedDocument(e) => e.user_message(),
        }
    }
}

/// Result of a save request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another save was already in flight; this one was dropped.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The confirmation gate said no; the store was not touched.
    Cancelled,
}

/// A document fetched from the store and parsed, ready for `EngineCore::finish_load`.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub owner: String,
    pub name: String,
    pub report: ImportReport,
}

/// Yes/no gate asked before destructive operations.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Clears the in-flight flag when the save finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok().then_some(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// GATEWAY
// =============================================================================

pub struct PersistenceGateway {
    store: Arc<dyn FileStore>,
    auth: Arc<dyn AuthService>,
    saving: AtomicBool,
    files: RwLock<Vec<String>>,
}

impl PersistenceGateway {
    #[must_use]
    pub fn new(store: Arc<dyn FileStore>, auth: Arc<dyn AuthService>) -> Self {
        Self { store, auth, saving: AtomicBool::new(false), files: RwLock::new(Vec::new()) }
    }

    /// Whether a save is currently in flight.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// The caller's document names as of the last refresh.
    pub async fn file_list(&self) -> Vec<String> {
        self.files.read().await.clone()
    }

    // --- Own documents ---

    /// Save the model under `name`.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, `Validation` for an empty name or
    /// model, otherwise the store or serializer failure.
    pub async fn save(&self, name: &str, model: &GeometryModel) -> Result<SaveOutcome, PersistenceError> {
        let identity = self.require_identity()?;
        let name = require_name(name)?;
        if model.is_empty() {
            return Err(ValidationError::EmptyDocument.into());
        }
        let Some(_guard) = InFlight::acquire(&self.saving) else {
            warn!(file = name, "save already in flight; dropping request");
            return Ok(SaveOutcome::Dropped);
        };

        let document = geojson::export_value(model)?;
        self.store.save(identity.owner(), name, &document).await?;
        info!(owner = identity.owner(), file = name, shapes = model.len(), "saved document");
        self.refresh(&identity).await;
        Ok(SaveOutcome::Saved)
    }

    /// Fetch and parse one of the caller's documents.
    ///
    /// # Errors
    ///
    /// `AuthRequired`, `Validation` for an empty name, `NotFound`, or
    /// `MalformedDocument` when the stored document cannot be read.
    pub async fn load(&self, name: &str) -> Result<LoadedDocument, PersistenceError> {
        let identity = self.require_identity()?;
        let name = require_name(name)?;
        self.fetch(identity.owner(), name).await
    }

    /// Refresh and return the caller's document names.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, otherwise the store failure.
    pub async fn list(&self) -> Result<Vec<String>, PersistenceError> {
        let identity = self.require_identity()?;
        let names = self.store.list(identity.owner()).await?;
        self.files.write().await.clone_from(&names);
        Ok(names)
    }

    /// Delete one of the caller's documents after confirmation.
    ///
    /// # Errors
    ///
    /// `AuthRequired`, `Validation` for an empty name, `NotFound`, or the store failure.
    pub async fn delete(&self, name: &str, confirm: &dyn Confirm) -> Result<DeleteOutcome, PersistenceError> {
        let identity = self.require_identity()?;
        let name = require_name(name)?;
        if !confirm.confirm(&format!("Delete \"{name}\"?")) {
            info!(file = name, "delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
        self.store.delete(identity.owner(), name).await?;
        info!(owner = identity.owner(), file = name, "deleted document");
        self.refresh(&identity).await;
        Ok(DeleteOutcome::Deleted)
    }

    /// Delete every document of the caller after confirmation.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, otherwise the store failure.
    pub async fn delete_all(&self, confirm: &dyn Confirm) -> Result<DeleteOutcome, PersistenceError> {
        let identity = self.require_identity()?;
        if !confirm.confirm("Delete all of your saved maps?") {
            info!("delete all cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
        self.store.delete_all(identity.owner()).await?;
        info!(owner = identity.owner(), "deleted all documents");
        self.refresh(&identity).await;
        Ok(DeleteOutcome::Deleted)
    }

    // --- Admin ---

    /// Every document of every owner.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, `Forbidden` for non-admins, otherwise the store failure.
    pub async fn admin_list(&self) -> Result<Vec<DocumentEntry>, PersistenceError> {
        self.require_admin()?;
        Ok(self.store.list_all().await?)
    }

    /// Fetch and parse any owner's document.
    ///
    /// # Errors
    ///
    /// As [`Self::load`], plus `Forbidden` for non-admins.
    pub async fn admin_load(&self, owner: &str, name: &str) -> Result<LoadedDocument, PersistenceError> {
        self.require_admin()?;
        let name = require_name(name)?;
        self.fetch(owner, name).await
    }

    /// Delete any owner's document after confirmation.
    ///
    /// # Errors
    ///
    /// As [`Self::delete`], plus `Forbidden` for non-admins.
    pub async fn admin_delete(
        &self,
        owner: &str,
        name: &str,
        confirm: &dyn Confirm,
    ) -> Result<DeleteOutcome, PersistenceError> {
        let identity = self.require_admin()?;
        let name = require_name(name)?;
        if !confirm.confirm(&format!("Delete \"{name}\" owned by {owner}?")) {
            info!(owner, file = name, "admin delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
        self.store.delete(owner, name).await?;
        info!(admin = identity.owner(), owner, file = name, "admin deleted document");
        self.refresh(&identity).await;
        Ok(DeleteOutcome::Deleted)
    }

    /// Delete every document in the store after confirmation.
    ///
    /// # Errors
    ///
    /// `AuthRequired`, `Forbidden` for non-admins, otherwise the store failure.
    pub async fn admin_delete_all(&self, confirm: &dyn Confirm) -> Result<DeleteOutcome, PersistenceError> {
        let identity = self.require_admin()?;
        if !confirm.confirm("Delete every saved map of every user?") {
            info!("admin delete everything cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
        self.store.delete_everything().await?;
        info!(admin = identity.owner(), "admin deleted all documents");
        self.refresh(&identity).await;
        Ok(DeleteOutcome::Deleted)
    }

    // --- Internals ---

    fn require_identity(&self) -> Result<Identity, PersistenceError> {
        self.auth.current_identity().ok_or(PersistenceError::AuthRequired)
    }

    fn require_admin(&self) -> Result<Identity, PersistenceError> {
        let identity = self.require_identity()?;
        if !identity.is_admin {
            warn!(email = %identity.email, "admin operation refused");
            return Err(PersistenceError::Forbidden);
        }
        Ok(identity)
    }

    async fn fetch(&self, owner: &str, name: &str) -> Result<LoadedDocument, PersistenceError> {
        let value = self.store.load(owner, name).await?;
        let report = geojson::import_document(&value)?;
        if !report.skipped.is_empty() {
            warn!(owner, file = name, skipped = report.skipped.len(), "document loaded with skipped features");
        }
        Ok(LoadedDocument { owner: owner.to_owned(), name: name.to_owned(), report })
    }

    async fn refresh(&self, identity: &Identity) {
        match self.store.list(identity.owner()).await {
            Ok(names) => *self.files.write().await = names,
            Err(e) => warn!(error = %e, "file list refresh failed"),
        }
    }
}

fn require_name(name: &str) -> Result<&str, ValidationError> {
    let name = name.trim();
    if name.is_empty() { Err(ValidationError::EmptyName) } else { Ok(name) }
}
