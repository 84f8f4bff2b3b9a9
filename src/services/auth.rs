//! Identity of the signed-in user.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use serde::{Deserialize, Serialize};

/// The authenticated user, as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

impl Identity {
    #[must_use]
    pub fn new(email: impl Into<String>, is_admin: bool) -> Self {
        let email = email.into();
        Self { id: email.clone(), email, is_admin }
    }

    /// Key under which this user's documents are stored.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.email
    }
}

/// Source of the current identity. `None` means nobody is signed in.
pub trait AuthService: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Auth service with a fixed answer, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    identity: Option<Identity>,
}

impl StaticAuth {
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        Self { identity: Some(identity) }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { identity: None }
    }
}

impl AuthService for StaticAuth {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.clone()
    }
}
