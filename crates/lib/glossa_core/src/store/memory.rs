//! In-memory store for tests and local development.
//!
//! All tables sit behind one `RwLock`, so every trait method is atomic with
//! respect to the others. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
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

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserWithPassword>,
    system_roles: HashMap<Uuid, SystemRoleGrant>,
    memberships: HashMap<(Uuid, Uuid), ProjectMembership>,
    sessions: HashMap<Uuid, Session>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    verification_tokens: HashMap<Uuid, VerificationToken>,
    audit: Vec<AuditEntry>,
    attempts: Vec<LoginAttempt>,
}

/// Process-local implementation of every storage port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    audit_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make audit writes fail, simulating an audit-store outage.
    pub fn set_audit_unavailable(&self, unavailable: bool) {
        self.audit_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every refresh token of a user, oldest first.
    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        records
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.user.email == user.email) {
            return Err(StoreError::Conflict(format!("users.email = {}", user.email)));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            image: None,
            email_verified_at: None,
            created_at: Utc::now(),
        };
        tables.users.insert(
            created.id,
            UserWithPassword {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.user.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|u| u.user.clone()))
    }

    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(u) = tables.users.get_mut(&id) {
            u.user.email_verified_at = Some(at);
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(u) = tables.users.get_mut(&id) {
            u.password_hash = Some(password_hash.to_string());
        }
        Ok(())
    }

    async fn find_system_role(&self, user_id: Uuid) -> StoreResult<Option<SystemRoleGrant>> {
        let tables = self.tables.read().await;
        Ok(tables.system_roles.get(&user_id).cloned())
    }

    async fn grant_system_role(&self, grant: &SystemRoleGrant) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.system_roles.insert(grant.user_id, grant.clone());
        Ok(())
    }

    async fn revoke_system_role(&self, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.system_roles.remove(&user_id).is_some())
    }

    async fn list_project_memberships(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<ProjectMembership>> {
        let tables = self.tables.read().await;
        let mut memberships: Vec<_> = tables
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.project_id);
        Ok(memberships)
    }

    async fn find_project_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<ProjectMembership>> {
        let tables = self.tables.read().await;
        Ok(tables.memberships.get(&(user_id, project_id)).cloned())
    }

    async fn upsert_project_membership(&self, membership: &ProjectMembership) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.memberships.insert(
            (membership.user_id, membership.project_id),
            membership.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.sessions.remove(&id).is_some())
    }

    async fn delete_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| !(s.user_id == user_id && s.expires_at > now));
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn list_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<_> = tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn find_refresh_token(&self, id: Uuid) -> StoreResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.refresh_tokens.get(&id).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&old_id) {
            Some(old) if old.revoked_at.is_none() => {
                old.revoked_at = Some(at);
                old.replaced_by = Some(successor.id);
            }
            _ => return Ok(false),
        }
        tables.refresh_tokens.insert(successor.id, successor.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for record in tables.refresh_tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryStore {
    async fn replace_verification_token(&self, token: &VerificationToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .verification_tokens
            .retain(|_, t| !(t.identifier == token.identifier && t.kind == token.kind));
        tables.verification_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .verification_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.kind == kind)
            .cloned())
    }

    async fn find_verification_token_for(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> StoreResult<Option<VerificationToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .verification_tokens
            .values()
            .find(|t| t.identifier == identifier && t.kind == kind)
            .cloned())
    }

    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.verification_tokens.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()> {
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit store offline".into()));
        }
        let mut tables = self.tables.write().await;
        tables.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit_entries(&self, limit: i64) -> StoreResult<Vec<AuditEntry>> {
        let tables = self.tables.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryStore {
    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempt_window(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
        skip_successful: bool,
    ) -> StoreResult<AttemptWindow> {
        let tables = self.tables.read().await;
        let matching = tables.attempts.iter().filter(|a| {
            a.identifier == identifier && a.created_at >= since && !(skip_successful && a.success)
        });
        let mut window = AttemptWindow::default();
        for attempt in matching {
            window.count += 1;
            window.oldest = Some(match window.oldest {
                Some(oldest) => oldest.min(attempt.created_at),
                None => attempt.created_at,
            });
        }
        Ok(window)
    }
}
