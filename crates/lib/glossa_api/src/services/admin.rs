//! Administrative operations: system roles, project membership, audit
//! listing and test email.

use chrono::Utc;
use glossa_core::audit::AuditEvent;
use glossa_core::auth::validation::validate_email;
use glossa_core::mail;
use glossa_core::models::audit::AuditAction;
use glossa_core::models::auth::{ClientInfo, ProjectMembership, SystemRoleGrant};
use glossa_core::rbac::{Permission, ProjectRole, SystemRole};
use glossa_core::store::{AuditStore, UserStore};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthenticatedUser, require_permission, require_system_admin};
use crate::models::{AuditEntryResponse, AuditListResponse, MembershipResponse, SystemRoleResponse};

pub const DEFAULT_AUDIT_LIMIT: i64 = 50;
pub const MAX_AUDIT_LIMIT: i64 = 500;

async fn ensure_user_exists(state: &AppState, user_id: Uuid) -> AppResult<()> {
    state
        .store
        .find_user_by_id(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Grant a system role. Admins cannot grant to themselves.
#[instrument(skip(state, admin, client), fields(admin_id = %admin.id()))]
pub async fn grant_system_role(
    state: &AppState,
    admin: &AuthenticatedUser,
    target: Uuid,
    role: &str,
    client: &ClientInfo,
) -> AppResult<SystemRoleResponse> {
    require_system_admin(admin)?;
    if target == admin.id() {
        return Err(AppError::Forbidden("System roles cannot be self-granted".into()));
    }
    let role = SystemRole::parse(role)
        .ok_or_else(|| AppError::validation(format!("Unknown system role {role}")))?;
    ensure_user_exists(state, target).await?;

    state
        .store
        .grant_system_role(&SystemRoleGrant {
            user_id: target,
            role,
            granted_by: admin.id(),
            granted_at: Utc::now(),
        })
        .await?;

    state.audit.record(
        AuditEvent::new(AuditAction::RoleGranted, "user")
            .actor(admin.id())
            .resource(target)
            .details(json!({ "role": role.as_str() }))
            .client(client),
    );
    info!(%target, role = role.as_str(), "system role granted");
    Ok(SystemRoleResponse {
        user_id: target,
        role: Some(role.as_str().to_string()),
    })
}

/// Revoke a system role. Admins cannot revoke their own.
#[instrument(skip(state, admin, client), fields(admin_id = %admin.id()))]
pub async fn revoke_system_role(
    state: &AppState,
    admin: &AuthenticatedUser,
    target: Uuid,
    client: &ClientInfo,
) -> AppResult<SystemRoleResponse> {
    require_system_admin(admin)?;
    if target == admin.id() {
        return Err(AppError::Forbidden("System roles cannot be self-revoked".into()));
    }
    let previous = state
        .store
        .find_system_role(target)
        .await?
        .ok_or_else(|| AppError::NotFound("User has no system role".into()))?;
    state.store.revoke_system_role(target).await?;

    state.audit.record(
        AuditEvent::new(AuditAction::RoleRevoked, "user")
            .actor(admin.id())
            .resource(target)
            .details(json!({ "role": previous.role.as_str() }))
            .client(client),
    );
    info!(%target, "system role revoked");
    Ok(SystemRoleResponse {
        user_id: target,
        role: None,
    })
}

/// Set a user's role in a project. Requires `members.manage` there.
#[instrument(skip(state, actor, client), fields(actor_id = %actor.id()))]
pub async fn set_project_member(
    state: &AppState,
    actor: &AuthenticatedUser,
    project_id: Uuid,
    user_id: Uuid,
    role: &str,
    client: &ClientInfo,
) -> AppResult<MembershipResponse> {
    require_permission(state, actor, Permission::MembersManage, Some(project_id)).await?;
    let role = ProjectRole::parse(role)
        .ok_or_else(|| AppError::validation(format!("Unknown project role {role}")))?;
    ensure_user_exists(state, user_id).await?;

    let previous = state
        .store
        .find_project_membership(user_id, project_id)
        .await?
        .map(|m| m.role.as_str());
    state
        .store
        .upsert_project_membership(&ProjectMembership {
            user_id,
            project_id,
            role,
        })
        .await?;

    state.audit.record(
        AuditEvent::new(AuditAction::MembershipChanged, "project")
            .actor(actor.id())
            .resource(project_id)
            .details(json!({
                "userId": user_id,
                "role": role.as_str(),
                "previousRole": previous,
            }))
            .client(client),
    );
    Ok(MembershipResponse {
        user_id,
        project_id,
        role: role.as_str().to_string(),
    })
}

/// Most recent audit entries.
pub async fn list_audit(
    state: &AppState,
    admin: &AuthenticatedUser,
    limit: Option<i64>,
) -> AppResult<AuditListResponse> {
    require_system_admin(admin)?;
    let limit = limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state.store.list_audit_entries(limit).await?;
    Ok(AuditListResponse {
        entries: entries.into_iter().map(AuditEntryResponse::from).collect(),
    })
}

/// Send a test email. Delivery failures surface as 500.
#[instrument(skip(state, admin, client), fields(admin_id = %admin.id()))]
pub async fn send_test_email(
    state: &AppState,
    admin: &AuthenticatedUser,
    to: &str,
    client: &ClientInfo,
) -> AppResult<()> {
    require_system_admin(admin)?;
    let to = validate_email(to)?;
    state
        .mailer
        .send(&mail::test_email(&to))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    state.audit.record(
        AuditEvent::new(AuditAction::TestEmailSent, "email")
            .actor(admin.id())
            .details(json!({ "to": to }))
            .client(client),
    );
    Ok(())
}
