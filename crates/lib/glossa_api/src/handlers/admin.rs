//! Administration request handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{AppJson, ClientMeta};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AuditListResponse, AuditQuery, MembershipResponse, RoleRequest, SystemRoleResponse,
    TestEmailRequest,
};
use crate::services::admin;

/// `PUT /admin/users/{id}/system-role`
pub async fn grant_system_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<RoleRequest>,
) -> AppResult<Json<SystemRoleResponse>> {
    Ok(Json(
        admin::grant_system_role(&state, &user, id, &body.role, &client).await?,
    ))
}

/// `DELETE /admin/users/{id}/system-role`
pub async fn revoke_system_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SystemRoleResponse>> {
    Ok(Json(
        admin::revoke_system_role(&state, &user, id, &client).await?,
    ))
}

/// `GET /admin/audit?limit=`
pub async fn list_audit_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditListResponse>> {
    Ok(Json(admin::list_audit(&state, &user, query.limit).await?))
}

/// `POST /admin/test-email`
pub async fn test_email_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    AppJson(body): AppJson<TestEmailRequest>,
) -> AppResult<StatusCode> {
    admin::send_test_email(&state, &user, &body.to, &client).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /projects/{project_id}/members/{user_id}`
pub async fn set_project_member_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ClientMeta(client): ClientMeta,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    AppJson(body): AppJson<RoleRequest>,
) -> AppResult<Json<MembershipResponse>> {
    Ok(Json(
        admin::set_project_member(&state, &user, project_id, user_id, &body.role, &client).await?,
    ))
}
