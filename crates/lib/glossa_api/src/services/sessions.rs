//! Session enumeration and revocation for the signed-in user.

use chrono::Utc;
use glossa_core::audit::AuditEvent;
use glossa_core::auth::tokens::verify_token_hash;
use glossa_core::models::audit::AuditAction;
use glossa_core::models::auth::{ClientInfo, Session};
use glossa_core::session;
use glossa_core::store::UserStore;
use tracing::instrument;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CurrentSessionResponse, ProjectRoleResponse, SessionInfo, SessionListResponse, UserResponse,
};
use crate::services::throttle::throttle_reads;

fn session_info(session: &Session, is_current: bool) -> SessionInfo {
    SessionInfo {
        id: session.id,
        ip_address: session.ip_address.clone(),
        user_agent: session.user_agent.clone(),
        created_at: session.created_at,
        expires_at: session.expires_at,
        is_current,
    }
}

/// Identity, system role and project roles of the caller.
#[instrument(skip_all, fields(user_id = %user.id()))]
pub async fn current_session(
    state: &AppState,
    user: &AuthenticatedUser,
    session_token: Option<&str>,
    client: &ClientInfo,
) -> AppResult<CurrentSessionResponse> {
    throttle_reads(state, client.ip_or_unknown())?;

    let memberships = state.store.list_project_memberships(user.id()).await?;
    let session = user.session.as_ref().map(|s| {
        let is_current = session_token.is_some_and(|t| verify_token_hash(t, &s.token_hash));
        session_info(s, is_current)
    });
    Ok(CurrentSessionResponse {
        user: UserResponse::from(&user.user),
        system_role: user.system_role.map(|r| r.as_str().to_string()),
        project_roles: memberships
            .into_iter()
            .map(|m| ProjectRoleResponse {
                project_id: m.project_id,
                role: m.role.as_str().to_string(),
            })
            .collect(),
        session,
    })
}

/// Active sessions of the caller, newest first.
#[instrument(skip_all, fields(user_id = %user.id()))]
pub async fn list_sessions(
    state: &AppState,
    user: &AuthenticatedUser,
    session_token: Option<&str>,
    client: &ClientInfo,
) -> AppResult<SessionListResponse> {
    throttle_reads(state, client.ip_or_unknown())?;

    let views =
        session::list_sessions(state.store.as_ref(), user.id(), session_token, Utc::now()).await?;
    Ok(SessionListResponse {
        sessions: views
            .iter()
            .map(|v| session_info(&v.session, v.is_current))
            .collect(),
    })
}

/// Revoke one of the caller's other sessions.
#[instrument(skip(state, user, session_token, client), fields(user_id = %user.id()))]
pub async fn revoke_session(
    state: &AppState,
    user: &AuthenticatedUser,
    session_id: Uuid,
    session_token: Option<&str>,
    client: &ClientInfo,
) -> AppResult<()> {
    let revoked =
        session::revoke_session(state.store.as_ref(), user.id(), session_id, session_token)
            .await?;
    state.audit.record(
        AuditEvent::new(AuditAction::SessionRevoked, "session")
            .actor(user.id())
            .resource(revoked.id)
            .client(client),
    );
    Ok(())
}
