//! Services behind the drawing core: identity, document storage, and the
//! persistence gateway that ties them to a session.
//!
//! ARCHITECTURE
//! ============
//! `auth` and `store` define the two external seams as traits, each with an
//! in-process implementation. `http_store` is the networked file store.
//! `persistence` owns the per-session rules (authentication, validation,
//! single-flight saves, confirmation gates) on top of those seams.

pub mod auth;
pub mod http_store;
pub mod persistence;
pub mod store;
