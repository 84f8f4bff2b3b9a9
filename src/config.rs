//! Session configuration loaded from environment variables.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `MAPNOTES_BASE_URL` | `http://127.0.0.1:3000` | File store server |
//! | `MAPNOTES_SESSION_TOKEN` | unset | Session cookie value (`token=<jwt>`) |
//! | `MAPNOTES_SAVE_POLICY` | `explicit` | `explicit` or `auto` |
//! | `MAPNOTES_AUTOSAVE_INTERVAL_MS` | `2000` | Minimum spacing between auto-saves |
//! | `MAPNOTES_MAP_ZOOM` | `13` | Zoom used for projected hit-testing |
//!
//! Unset variables take their default. A variable that is set but does not
//! parse is an error rather than a silent fallback.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::str::FromStr;
use std::time::Duration;

use crate::autosave::SavePolicy;
use crate::consts::{DEFAULT_AUTOSAVE_INTERVAL_MS, DEFAULT_ZOOM};
use crate::error::ErrorCode;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

const BASE_URL_VAR: &str = "MAPNOTES_BASE_URL";
const SESSION_TOKEN_VAR: &str = "MAPNOTES_SESSION_TOKEN";
const SAVE_POLICY_VAR: &str = "MAPNOTES_SAVE_POLICY";
const AUTOSAVE_INTERVAL_VAR: &str = "MAPNOTES_AUTOSAVE_INTERVAL_MS";
const MAP_ZOOM_VAR: &str = "MAPNOTES_MAP_ZOOM";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        "E_CONFIG"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub base_url: String,
    pub session_token: Option<String>,
    pub save_policy: SavePolicy,
    pub map_zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            session_token: None,
            save_policy: SavePolicy::Explicit,
            map_zoom: DEFAULT_ZOOM,
        }
    }
}

impl MapConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(BASE_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let session_token = lookup(SESSION_TOKEN_VAR).filter(|v| !v.trim().is_empty());
        let interval_ms: u64 = env_parse(&lookup, AUTOSAVE_INTERVAL_VAR, DEFAULT_AUTOSAVE_INTERVAL_MS)?;
        let map_zoom: f64 = env_parse(&lookup, MAP_ZOOM_VAR, DEFAULT_ZOOM)?;
        if !map_zoom.is_finite() || map_zoom < 0.0 {
            return Err(ConfigError::InvalidValue { key: MAP_ZOOM_VAR, value: map_zoom.to_string() });
        }

        let save_policy = match lookup(SAVE_POLICY_VAR).as_deref().map(str::trim) {
            None | Some("" | "explicit") => SavePolicy::Explicit,
            Some("auto") => SavePolicy::AutoSave { min_interval: Duration::from_millis(interval_ms) },
            Some(other) => {
                return Err(ConfigError::InvalidValue { key: SAVE_POLICY_VAR, value: other.to_owned() });
            }
        };

        Ok(Self { base_url, session_token, save_policy, map_zoom })
    }
}

/// Parse `key` if set; unset or blank yields `default`.
pub(crate) fn env_parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
