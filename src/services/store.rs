//! File store seam: named documents keyed by (owner, name).
//!
//! DESIGN
//! ======
//! The store treats documents as opaque JSON. Interpreting them is the
//! serializer's job, so a store never fails because a document is odd, only
//! because it is missing, forbidden, or unreachable.
//!
//! Owner-scoped calls serve both the signed-in user and admins acting on
//! someone else's files; the gateway decides who may pass which owner.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("not authorized")]
    Unauthorized,
    #[error("file store unavailable: {0}")]
    Transport(String),
    #[error("unexpected file store response: {0}")]
    Decode(String),
}

/// One stored document as listed for admins.
///
/// Older servers send the owner as `username` (or not at all) and may omit
/// the creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    #[serde(rename = "email", alias = "username", default)]
    pub owner: String,
    #[serde(rename = "fileName")]
    pub name: String,
    #[serde(rename = "createdAt", default, with = "timestamp")]
    pub created_at: Option<OffsetDateTime>,
}

#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    /// Names of the documents stored under `owner`.
    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Store `document` under (`owner`, `name`), replacing any previous version.
    async fn save(&self, owner: &str, name: &str, document: &Value) -> Result<(), StoreError>;

    async fn load(&self, owner: &str, name: &str) -> Result<Value, StoreError>;

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError>;

    /// Delete every document stored under `owner`.
    async fn delete_all(&self, owner: &str) -> Result<(), StoreError>;

    /// Every document of every owner.
    async fn list_all(&self) -> Result<Vec<DocumentEntry>, StoreError>;

    /// Delete every document of every owner.
    async fn delete_everything(&self) -> Result<(), StoreError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Value,
    created_at: OffsetDateTime,
}

/// File store held in process memory. Used by tests and offline sessions.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    documents: RwLock<BTreeMap<(String, String), StoredDocument>>,
}

impl MemoryFileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all owners.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl FileStore for MemoryFileStore {
    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.keys().filter(|(o, _)| o == owner).map(|(_, name)| name.clone()).collect())
    }

    async fn save(&self, owner: &str, name: &str, document: &Value) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let key = (owner.to_owned(), name.to_owned());
        // EDGE: overwriting keeps the original creation time.
        let created_at = documents.get(&key).map_or_else(OffsetDateTime::now_utc, |d| d.created_at);
        documents.insert(key, StoredDocument { document: document.clone(), created_at });
        debug!(owner, file = name, "stored document");
        Ok(())
    }

    async fn load(&self, owner: &str, name: &str) -> Result<Value, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(&(owner.to_owned(), name.to_owned()))
            .map(|d| d.document.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents.remove(&(owner.to_owned(), name.to_owned())).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn delete_all(&self, owner: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|(o, _), _| o != owner);
        debug!(owner, removed = before - documents.len(), "deleted owner documents");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DocumentEntry>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .map(|((owner, name), stored)| DocumentEntry {
                owner: owner.clone(),
                name: name.clone(),
                created_at: Some(stored.created_at),
            })
            .collect())
    }

    async fn delete_everything(&self) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        debug!(removed = documents.len(), "deleted all documents");
        documents.clear();
        Ok(())
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// RFC 3339 on the wire; also reads the `YYYY-MM-DD HH:MM:SS` UTC form some
/// servers emit straight from SQL. `null` means unknown.
pub(crate) mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::{OffsetDateTime, PrimitiveDateTime};

    const SQL_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => {
                let text = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => parse(&text).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }

    pub fn parse(text: &str) -> Result<OffsetDateTime, String> {
        if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
            return Ok(value);
        }
        let format = time::format_description::parse(SQL_FORMAT).map_err(|e| e.to_string())?;
        PrimitiveDateTime::parse(text, &format)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|e| format!("invalid timestamp {text:?}: {e}"))
    }
}
