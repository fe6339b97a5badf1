//! Session request handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ClientMeta;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{CurrentSessionResponse, SessionListResponse};
use crate::services::cookies::{SESSION_COOKIE, cookie_value};
use crate::services::sessions;

/// `GET /session`: resolve the caller's identity and roles.
pub async fn current_session_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
) -> AppResult<Json<CurrentSessionResponse>> {
    let resp =
        sessions::current_session(&state, &user, cookie_value(&jar, SESSION_COOKIE), &client)
            .await?;
    Ok(Json(resp))
}

/// `GET /sessions`: list active sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
) -> AppResult<Json<SessionListResponse>> {
    let resp =
        sessions::list_sessions(&state, &user, cookie_value(&jar, SESSION_COOKIE), &client)
            .await?;
    Ok(Json(resp))
}

/// `DELETE /sessions/{id}`: revoke another session of the caller.
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    sessions::revoke_session(
        &state,
        &user,
        id,
        cookie_value(&jar, SESSION_COOKIE),
        &client,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
