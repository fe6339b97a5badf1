//! Authentication middleware and permission guards.
//!
//! `require_auth` accepts the `session-token` cookie first and falls back to
//! `Authorization: Bearer <access token>`. The resolved identity is placed in
//! request extensions as [`AuthenticatedUser`].

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use chrono::Utc;
use glossa_core::models::auth::{Session, User};
use glossa_core::rbac::{self, Permission, Requirement, Subject, SystemRole};
use glossa_core::session::resolve_session;
use glossa_core::store::UserStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::services::cookies::{SESSION_COOKIE, cookie_value};

/// Identity attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub system_role: Option<SystemRole>,
    /// Set when the request was authenticated by session cookie.
    pub session: Option<Session>,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_system_admin(&self) -> bool {
        self.system_role == Some(SystemRole::Admin)
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum middleware: resolve the caller and inject [`AuthenticatedUser`], or
/// answer 401.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let now = Utc::now();

    let mut session = None;
    let mut user_id = None;
    if let Some(token) = cookie_value(&jar, SESSION_COOKIE)
        && let Some(found) = resolve_session(store, token, now).await?
    {
        user_id = Some(found.user_id);
        session = Some(found);
    }
    if user_id.is_none()
        && let Some(token) = bearer_token(&request)
    {
        let claims = state
            .signer
            .verify_access_token(token)
            .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::unauthorized("Invalid or expired token"))?;
        user_id = Some(id);
    }
    let user_id = user_id.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let user = store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("Account no longer exists"))?;
    let system_role = store.find_system_role(user_id).await?.map(|g| g.role);

    request.extensions_mut().insert(AuthenticatedUser {
        user,
        system_role,
        session,
    });
    Ok(next.run(request).await)
}

/// Reject callers without the system ADMIN role.
pub fn require_system_admin(user: &AuthenticatedUser) -> AppResult<()> {
    if user.is_system_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Administrator role required".into()))
    }
}

/// Authorize `permission` for the caller, scoped to `project_id` when given.
///
/// System admins pass everything. Otherwise the caller's membership role in
/// the project is evaluated; no membership (or no project) means deny.
pub async fn require_permission(
    state: &AppState,
    user: &AuthenticatedUser,
    permission: Permission,
    project_id: Option<Uuid>,
) -> AppResult<()> {
    let project_role = match project_id {
        Some(project_id) if !user.is_system_admin() => state
            .store
            .find_project_membership(user.id(), project_id)
            .await?
            .map(|m| m.role),
        _ => None,
    };
    let subject = Subject {
        system_role: user.system_role,
        project_role,
    };
    if rbac::evaluate(subject, Requirement::Permission(permission)) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Missing permission {}",
            permission.as_str()
        )))
    }
}
