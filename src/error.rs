//! Stable error codes shared by every failure the core can surface.
//!
//! Each module owns its own `thiserror` enum; this trait gives them a common
//! machine-readable code and a short message suitable for showing to a user.

/// Trait for errors that carry a stable code and a user-facing message.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    /// Whether re-issuing the same operation could succeed. Nothing retries
    /// automatically; this only shapes the message shown to the user.
    fn retryable(&self) -> bool {
        false
    }

    fn user_message(&self) -> String {
        self.to_string()
    }
}
