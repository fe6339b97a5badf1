//! Domain models shared by the store adapters and the API layer.

pub mod audit;
pub mod auth;
