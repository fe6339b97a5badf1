//! API server configuration.

use glossa_core::auth::jwt::resolve_jwt_secret;
use glossa_core::settings::{AuthSettings, SessionEviction};
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Production mode marks cookies `Secure`.
    pub production: bool,
    /// Public origin used to build links in emails.
    pub app_base_url: String,
    /// Token, session and verification lifetimes.
    pub auth: AuthSettings,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                              |
    /// |------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/glossa`   |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file        |
    /// | `GLOSSA_ENV`                 | `development` (`production` = secure cookies) |
    /// | `APP_BASE_URL`               | `http://localhost:3000`              |
    /// | `SESSION_EVICTION`           | `all_user_sessions`                  |
    pub fn from_env() -> Self {
        let auth = AuthSettings {
            session_eviction: session_eviction_from_env(),
            ..AuthSettings::default()
        };
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/glossa".into()),
            jwt_secret: resolve_jwt_secret(),
            production: std::env::var("GLOSSA_ENV").is_ok_and(|v| v == "production"),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            auth,
        }
    }

    /// Development defaults with a fixed secret. Used by tests.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            jwt_secret: jwt_secret.into(),
            production: false,
            app_base_url: "http://localhost:3000".into(),
            auth: AuthSettings::default(),
        }
    }
}

fn session_eviction_from_env() -> SessionEviction {
    match std::env::var("SESSION_EVICTION") {
        Ok(value) => SessionEviction::parse(&value).unwrap_or_else(|| {
            warn!(%value, "unknown SESSION_EVICTION, using all_user_sessions");
            SessionEviction::default()
        }),
        Err(_) => SessionEviction::default(),
    }
}
