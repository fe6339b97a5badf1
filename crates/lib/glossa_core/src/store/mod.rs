//! Storage ports for the credential lifecycle.
//!
//! Each table family gets its own trait so components only see what they
//! touch. [`Store`] bundles them for callers that orchestrate whole flows.
//! Adapters: [`postgres::PgStore`] for production, [`memory::MemoryStore`]
//! for tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::audit::AuditEntry;
use crate::models::auth::{
    LoginAttempt, NewUser, ProjectMembership, RefreshTokenRecord, Session, SystemRoleGrant, User,
    UserWithPassword, VerificationKind, VerificationToken,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;
    async fn find_system_role(&self, user_id: Uuid) -> StoreResult<Option<SystemRoleGrant>>;
    /// Insert or replace the user's single system role.
    async fn grant_system_role(&self, grant: &SystemRoleGrant) -> StoreResult<()>;
    async fn revoke_system_role(&self, user_id: Uuid) -> StoreResult<bool>;
    async fn list_project_memberships(&self, user_id: Uuid)
    -> StoreResult<Vec<ProjectMembership>>;
    async fn find_project_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<ProjectMembership>>;
    async fn upsert_project_membership(&self, membership: &ProjectMembership) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> StoreResult<()>;
    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;
    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> StoreResult<bool>;
    /// Delete every session of the user that has not expired at `now`.
    async fn delete_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;
    /// Unexpired sessions, newest first.
    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;
    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>>;
    async fn find_refresh_token(&self, id: Uuid) -> StoreResult<Option<RefreshTokenRecord>>;
    /// Atomically revoke `old_id` (only if still unrevoked), point it at
    /// `successor`, and insert `successor`. Returns `false` and writes
    /// nothing when `old_id` was already revoked.
    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// Revoke one token if it is still unrevoked.
    async fn revoke_refresh_token(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid, at: DateTime<Utc>)
    -> StoreResult<u64>;
}

#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    /// Delete any token for the same (identifier, kind), then insert `token`.
    async fn replace_verification_token(&self, token: &VerificationToken) -> StoreResult<()>;
    async fn find_verification_token(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>>;
    async fn find_verification_token_for(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>>;
    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()>;
    /// Most recent entries first.
    async fn list_audit_entries(&self, limit: i64) -> StoreResult<Vec<AuditEntry>>;
}

/// Count of ledger rows inside a window and the oldest of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptWindow {
    pub count: u32,
    pub oldest: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()>;
    /// Attempts for `identifier` created at or after `since`.
    async fn attempt_window(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
        skip_successful: bool,
    ) -> StoreResult<AttemptWindow>;
}

/// Every storage port in one object.
pub trait Store:
    UserStore
    + SessionStore
    + RefreshTokenStore
    + VerificationTokenStore
    + AuditStore
    + LoginAttemptStore
{
}

impl<T> Store for T where
    T: UserStore
        + SessionStore
        + RefreshTokenStore
        + VerificationTokenStore
        + AuditStore
        + LoginAttemptStore
{
}
