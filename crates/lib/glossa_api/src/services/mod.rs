//! Flow orchestrators behind the HTTP handlers.

pub mod admin;
pub mod auth;
pub mod cookies;
pub mod sessions;
pub mod throttle;
