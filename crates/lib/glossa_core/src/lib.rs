//! # glossa_core
//!
//! Credential and session lifecycle for Glossa: token service, session
//! manager, refresh rotation chain, verification tokens, rate limiting,
//! RBAC evaluation and audit logging over pluggable storage.

pub mod audit;
pub mod auth;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod rbac;
pub mod refresh;
pub mod session;
pub mod settings;
pub mod store;
pub mod uuid;
pub mod verification;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
