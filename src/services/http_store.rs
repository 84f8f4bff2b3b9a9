//! HTTP file store client.
//!
//! Talks to the map server's JSON API, authenticating with the session
//! cookie (`token=<jwt>`). The server derives the caller from the cookie, so
//! owner-scoped calls for the caller use the plain routes and calls for any
//! other owner go through the admin routes.
//!
//! | Operation | Route |
//! |---|---|
//! | list | `GET /files` |
//! | save | `POST /save` with `{ fileName, geojsonData }` |
//! | load | `GET /load/{name}`, `GET /admin/load/{owner}/{name}` |
//! | delete | `DELETE /files/{name}`, `DELETE /admin/files/{owner}/{name}` |
//! | delete all | `DELETE /files` |
//! | list all | `GET /admin/files` |
//! | delete everything | `DELETE /admin/files` |
//! | identity | `GET /user/info` |

#[cfg(test)]
#[path = "http_store_test.rs"]
mod http_store_test;

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::auth::Identity;
use super::store::{DocumentEntry, FileStore, StoreError};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct HttpFileStore {
    http: reqwest::Client,
    base_url: Url,
    caller: String,
}

impl HttpFileStore {
    /// Build a client for `base_url` acting as `caller` (the signed-in owner).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or token is unusable or the HTTP client fails to build.
    pub fn new(base_url: &str, session_token: &str, caller: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self { http: build_client(session_token)?, base_url: parse_base_url(base_url)?, caller: caller.into() })
    }

    /// Ask the server who the session token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for a missing or rejected token, otherwise a transport error.
    pub async fn fetch_identity(base_url: &str, session_token: &str) -> Result<Identity, StoreError> {
        let http = build_client(session_token)?;
        let url = endpoint(&parse_base_url(base_url)?, &["user", "info"])?;
        let value = send(&http, Method::GET, url, None).await?;
        let mut identity: Identity = serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))?;
        if identity.id.is_empty() {
            identity.id.clone_from(&identity.email);
        }
        Ok(identity)
    }

    fn is_caller(&self, owner: &str) -> bool {
        owner == self.caller
    }

    async fn request(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Value, StoreError> {
        let url = endpoint(&self.base_url, segments)?;
        send(&self.http, method, url, body).await
    }
}

#[async_trait::async_trait]
impl FileStore for HttpFileStore {
    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        if !self.is_caller(owner) {
            let entries = self.list_all().await?;
            return Ok(entries.into_iter().filter(|e| e.owner == owner).map(|e| e.name).collect());
        }
        let value = self.request(Method::GET, &["files"], None).await?;
        serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn save(&self, owner: &str, name: &str, document: &Value) -> Result<(), StoreError> {
        if !self.is_caller(owner) {
            // The server only saves into the caller's own space.
            return Err(StoreError::Unauthorized);
        }
        let body = serde_json::json!({ "fileName": name, "geojsonData": document });
        self.request(Method::POST, &["save"], Some(body)).await?;
        Ok(())
    }

    async fn load(&self, owner: &str, name: &str) -> Result<Value, StoreError> {
        if self.is_caller(owner) {
            self.request(Method::GET, &["load", name], None).await
        } else {
            self.request(Method::GET, &["admin", "load", owner, name], None).await
        }
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError> {
        if self.is_caller(owner) {
            self.request(Method::DELETE, &["files", name], None).await?;
        } else {
            self.request(Method::DELETE, &["admin", "files", owner, name], None).await?;
        }
        Ok(())
    }

    async fn delete_all(&self, owner: &str) -> Result<(), StoreError> {
        if !self.is_caller(owner) {
            return Err(StoreError::Unauthorized);
        }
        self.request(Method::DELETE, &["files"], None).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DocumentEntry>, StoreError> {
        let value = self.request(Method::GET, &["admin", "files"], None).await?;
        decode_entries(value)
    }

    async fn delete_everything(&self) -> Result<(), StoreError> {
        self.request(Method::DELETE, &["admin", "files"], None).await?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn build_client(session_token: &str) -> Result<reqwest::Client, StoreError> {
    let mut cookie = HeaderValue::from_str(&format!("token={session_token}"))
        .map_err(|e| StoreError::Transport(format!("invalid session token: {e}")))?;
    cookie.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, cookie);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| StoreError::Transport(e.to_string()))
}

fn parse_base_url(base_url: &str) -> Result<Url, StoreError> {
    Url::parse(base_url).map_err(|e| StoreError::Transport(format!("invalid base URL {base_url:?}: {e}")))
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| StoreError::Transport(format!("base URL {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map an HTTP status to the store's error vocabulary.
pub(crate) fn check_status(status: StatusCode, body: &str) -> Result<(), StoreError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized),
        s => Err(StoreError::Transport(format!("{s}: {body}"))),
    }
}

/// Decode the admin listing entry by entry, skipping rows that do not decode.
pub(crate) fn decode_entries(value: Value) -> Result<Vec<DocumentEntry>, StoreError> {
    let Value::Array(rows) = value else {
        return Err(StoreError::Decode("admin file list is not an array".to_owned()));
    };
    let mut entries = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<DocumentEntry>(row) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(index, error = %e, "skipping undecodable admin file entry"),
        }
    }
    Ok(entries)
}

async fn send(http: &reqwest::Client, method: Method, url: Url, body: Option<Value>) -> Result<Value, StoreError> {
    debug!(%method, %url, "file store request");
    let request = http.request(method, url).header("Accept", "application/json");
    let request = if let Some(json) = body { request.json(&json) } else { request };

    let response = request.send().await.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = response.status();
    let text = response.text().await.map_err(|e| StoreError::Transport(e.to_string()))?;
    if let Err(e) = check_status(status, &text) {
        warn!(%status, error = %e, "file store request failed");
        return Err(e);
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
}
