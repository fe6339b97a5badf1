//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types (which carry `#[serde(rename_all = "camelCase")]` for the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rbac::{ProjectRole, SystemRole};

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Always stored trimmed and lower-cased.
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    /// Set once the address has been confirmed.
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// User with password hash (for internal auth flows).
///
/// A missing hash marks an external-identity-only account.
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Insert payload for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

/// System-wide role assignment. At most one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRoleGrant {
    pub user_id: Uuid,
    pub role: SystemRole,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// Role of a user inside one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMembership {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub role: ProjectRole,
}

/// Server-tracked browser session backing the `session-token` cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 of the cookie value.
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Refresh token record stored in the database.
///
/// Records form a singly linked rotation chain through `replaced_by`.
/// A record with `revoked_at` set is permanently inert.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Total lifetime the token was issued with.
    pub fn lifetime(&self) -> chrono::Duration {
        self.expires_at - self.created_at
    }
}

/// Kind of single-use verification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    EmailVerification,
    PasswordReset,
}

impl VerificationKind {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::EmailVerification => "email_verification",
            VerificationKind::PasswordReset => "password_reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email_verification" => Some(VerificationKind::EmailVerification),
            "password_reset" => Some(VerificationKind::PasswordReset),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outstanding verification or reset token. Only the hash is persisted.
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub id: Uuid,
    pub kind: VerificationKind,
    /// Lower-cased email the token was issued for.
    pub identifier: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// One row of the rate-limit ledger.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub identifier: String,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// User email.
    pub email: String,
    /// System roles (e.g. `["admin"]`).
    pub roles: Vec<String>,
    /// `access` or `refresh`.
    pub typ: String,
    /// Unique token id, so two tokens minted in the same second differ.
    pub jti: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Identity carried by signed tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}

impl TryFrom<&TokenClaims> for TokenPayload {
    type Error = uuid::Error;

    fn try_from(claims: &TokenClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub)?,
            email: claims.email.clone(),
            roles: claims.roles.clone(),
        })
    }
}

/// IP and user-agent snapshot of the calling client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Rate-limit key for IP-scoped budgets.
    pub fn ip_or_unknown(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}
