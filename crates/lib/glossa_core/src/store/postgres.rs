//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AttemptWindow, AuditStore, LoginAttemptStore, RefreshTokenStore, SessionStore, StoreError,
    StoreResult, UserStore, VerificationTokenStore,
};
use crate::models::audit::AuditEntry;
use crate::models::auth::{
    LoginAttempt, NewUser, ProjectMembership, RefreshTokenRecord, Session, SystemRoleGrant, User,
    UserWithPassword, VerificationKind, VerificationToken,
};
use crate::rbac::{ProjectRole, SystemRole};

/// Storage ports backed by a `PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    image: Option<String>,
    password_hash: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserWithPassword {
    fn from(row: UserRow) -> Self {
        Self {
            user: User {
                id: row.id,
                email: row.email,
                name: row.name,
                image: row.image,
                email_verified_at: row.email_verified_at,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<Uuid>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            replaced_by: row.replaced_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: Uuid,
    kind: String,
    identifier: String,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for VerificationToken {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        let kind = VerificationKind::parse(&row.kind).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown verification kind {}", row.kind).into(),
            ))
        })?;
        Ok(Self {
            id: row.id,
            kind,
            identifier: row.identifier,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    details: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            details: row.details,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

fn decode_error(what: &str, value: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(format!("unknown {what} {value}").into()))
}

fn map_unique(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Database(e),
    }
}

const USER_COLUMNS: &str =
    "id, email, name, image, password_hash, email_verified_at, created_at";
const SESSION_COLUMNS: &str = "id, user_id, token_hash, ip_address, user_agent, created_at, expires_at";
const REFRESH_COLUMNS: &str = "id, user_id, token_hash, ip_address, user_agent, created_at, \
     expires_at, revoked_at, replaced_by";

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "users.email"))?;
        Ok(UserWithPassword::from(row).user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserWithPassword::from))
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserWithPassword::from(r).user))
    }

    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET email_verified_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_system_role(&self, user_id: Uuid) -> StoreResult<Option<SystemRoleGrant>> {
        let row = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>)>(
            "SELECT role, granted_by, granted_at FROM system_roles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(role, granted_by, granted_at)| {
            Ok(SystemRoleGrant {
                user_id,
                role: SystemRole::parse(&role).ok_or_else(|| decode_error("system role", &role))?,
                granted_by,
                granted_at,
            })
        })
        .transpose()
    }

    async fn grant_system_role(&self, grant: &SystemRoleGrant) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO system_roles (user_id, role, granted_by, granted_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE \
             SET role = EXCLUDED.role, granted_by = EXCLUDED.granted_by, \
                 granted_at = EXCLUDED.granted_at",
        )
        .bind(grant.user_id)
        .bind(grant.role.as_str())
        .bind(grant.granted_by)
        .bind(grant.granted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_system_role(&self, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM system_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_project_memberships(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<ProjectMembership>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT project_id, role FROM project_memberships \
             WHERE user_id = $1 ORDER BY project_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(project_id, role)| {
                Ok(ProjectMembership {
                    user_id,
                    project_id,
                    role: ProjectRole::parse(&role)
                        .ok_or_else(|| decode_error("project role", &role))?,
                })
            })
            .collect()
    }

    async fn find_project_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<ProjectMembership>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM project_memberships WHERE user_id = $1 AND project_id = $2",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        role.map(|role| {
            Ok(ProjectMembership {
                user_id,
                project_id,
                role: ProjectRole::parse(&role).ok_or_else(|| decode_error("project role", &role))?,
            })
        })
        .transpose()
    }

    async fn upsert_project_membership(&self, membership: &ProjectMembership) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO project_memberships (user_id, project_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, project_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(membership.user_id)
        .bind(membership.project_id)
        .bind(membership.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sessions \
             (id, user_id, token_hash, ip_address, user_agent, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "sessions.token_hash"))?;
        Ok(())
    }

    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at > $2")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND expires_at > $2 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, user_id, token_hash, ip_address, user_agent, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "refresh_tokens.token_hash"))?;
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn find_refresh_token(&self, id: Uuid) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken here serializes concurrent rotations of the same
        // token; the loser sees revoked_at set and matches zero rows.
        let claimed = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2, replaced_by = $3 \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(old_id)
        .bind(at)
        .bind(successor.id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, user_id, token_hash, ip_address, user_agent, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(successor.id)
        .bind(successor.user_id)
        .bind(&successor.token_hash)
        .bind(&successor.ip_address)
        .bind(&successor.user_agent)
        .bind(successor.created_at)
        .bind(successor.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "refresh_tokens.token_hash"))?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VerificationTokenStore for PgStore {
    async fn replace_verification_token(&self, token: &VerificationToken) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1 AND kind = $2")
            .bind(&token.identifier)
            .bind(token.kind.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO verification_tokens \
             (id, kind, identifier, token_hash, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(token.id)
        .bind(token.kind.as_str())
        .bind(&token.identifier)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "verification_tokens"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>> {
        let row = sqlx::query_as::<_, VerificationRow>(
            "SELECT id, kind, identifier, token_hash, created_at, expires_at \
             FROM verification_tokens WHERE token_hash = $1 AND kind = $2",
        )
        .bind(token_hash)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(VerificationToken::try_from).transpose()
    }

    async fn find_verification_token_for(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>> {
        let row = sqlx::query_as::<_, VerificationRow>(
            "SELECT id, kind, identifier, token_hash, created_at, expires_at \
             FROM verification_tokens WHERE identifier = $1 AND kind = $2",
        )
        .bind(identifier)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(VerificationToken::try_from).transpose()
    }

    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs \
             (id, actor_id, action, resource_type, resource_id, details, ip_address, \
              user_agent, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit_entries(&self, limit: i64) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, actor_id, action, resource_type, resource_id, details, ip_address, \
                    user_agent, created_at \
             FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}

#[async_trait]
impl LoginAttemptStore for PgStore {
    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO login_attempts (id, identifier, success, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(attempt.id)
        .bind(&attempt.identifier)
        .bind(attempt.success)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn attempt_window(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
        skip_successful: bool,
    ) -> StoreResult<AttemptWindow> {
        let (count, oldest) = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
            "SELECT COUNT(*), MIN(created_at) FROM login_attempts \
             WHERE identifier = $1 AND created_at >= $2 \
               AND (NOT $3 OR success = false)",
        )
        .bind(identifier)
        .bind(since)
        .bind(skip_successful)
        .fetch_one(&self.pool)
        .await?;
        Ok(AttemptWindow {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            oldest,
        })
    }
}
