//! # glossa_api
//!
//! HTTP API library for Glossa: registration, login, verification, password
//! reset, refresh rotation, sessions and access-control administration.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use glossa_core::audit::AuditLogger;
use glossa_core::auth::jwt::TokenSigner;
use glossa_core::mail::Mailer;
use glossa_core::rate_limit::MemoryRateLimiter;
use glossa_core::store::Store;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, sessions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Every storage port.
    pub store: Arc<dyn Store>,
    /// Signs and verifies access and refresh tokens.
    pub signer: TokenSigner,
    /// API configuration.
    pub config: ApiConfig,
    pub audit: AuditLogger,
    pub mailer: Arc<dyn Mailer>,
    /// Process-local limiter for session reads.
    pub read_limiter: Arc<MemoryRateLimiter>,
}

impl AppState {
    /// Build the state and start the audit writer. Must be called inside a
    /// tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: ApiConfig, mailer: Arc<dyn Mailer>) -> Self {
        let signer = TokenSigner::new(config.jwt_secret.as_bytes(), config.auth.clone());
        let audit = AuditLogger::spawn(store.clone());
        Self {
            store,
            signer,
            config,
            audit,
            mailer,
            read_limiter: Arc::new(MemoryRateLimiter::new()),
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `glossa_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    glossa_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_REGISTER, post(auth::register_handler))
        .route(routes::POST_LOGIN, post(auth::login_handler))
        .route(routes::POST_FORGOT_PASSWORD, post(auth::forgot_password_handler))
        .route(
            routes::POST_RESEND_VERIFICATION,
            post(auth::resend_verification_handler),
        )
        .route(routes::POST_RESET_PASSWORD, post(auth::reset_password_handler))
        .route(routes::POST_VERIFY_EMAIL, post(auth::verify_email_handler))
        .route(routes::POST_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_LOGOUT, post(auth::logout_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_SESSION, get(sessions::current_session_handler))
        .route(routes::GET_SESSIONS, get(sessions::list_sessions_handler))
        .route(
            routes::DELETE_SESSIONS_ID,
            delete(sessions::revoke_session_handler),
        )
        .route(
            routes::ADMIN_USERS_ID_SYSTEM_ROLE,
            put(admin::grant_system_role_handler).delete(admin::revoke_system_role_handler),
        )
        .route(routes::GET_ADMIN_AUDIT, get(admin::list_audit_handler))
        .route(routes::POST_ADMIN_TEST_EMAIL, post(admin::test_email_handler))
        .route(
            routes::PUT_PROJECTS_ID_MEMBERS_USER_ID,
            put(admin::set_project_member_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
