//! Single-use email verification and password reset tokens.
//!
//! At most one token is outstanding per (email, kind). [`redeem`] claims the
//! presented token by deleting it before the caller applies the effect, so of
//! two concurrent redemptions exactly one wins.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::auth::AuthError;
use crate::auth::password::hash_password;
use crate::auth::tokens::{generate_opaque_token, hash_token, verify_token_hash};
use crate::auth::validation::validate_password;
use crate::models::auth::{User, VerificationKind, VerificationToken};
use crate::settings::AuthSettings;
use crate::store::{RefreshTokenStore, UserStore, VerificationTokenStore};
use crate::uuid::uuidv7;

/// Lifetime of a freshly issued token of `kind`.
pub fn ttl_for(kind: VerificationKind, settings: &AuthSettings) -> chrono::Duration {
    match kind {
        VerificationKind::EmailVerification => settings.email_verification_ttl,
        VerificationKind::PasswordReset => settings.password_reset_ttl,
    }
}

/// Replace any outstanding token for (identifier, kind) and return the new
/// plaintext. Only the hash is stored.
pub async fn issue<S: VerificationTokenStore + ?Sized>(
    store: &S,
    identifier: &str,
    kind: VerificationKind,
    settings: &AuthSettings,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let token = generate_opaque_token();
    let record = VerificationToken {
        id: uuidv7(),
        kind,
        identifier: identifier.to_string(),
        token_hash: hash_token(&token),
        created_at: now,
        expires_at: now + ttl_for(kind, settings),
    };
    store.replace_verification_token(&record).await?;
    debug!(%kind, identifier, "verification token issued");
    Ok(token)
}

/// Validate and claim a presented token. Expired tokens are deleted. A token
/// another caller claimed first is `InvalidToken`.
pub async fn redeem<S: VerificationTokenStore + ?Sized>(
    store: &S,
    token: &str,
    kind: VerificationKind,
    now: DateTime<Utc>,
) -> Result<VerificationToken, AuthError> {
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    let record = store
        .find_verification_token(&hash_token(token), kind)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if record.is_expired(now) {
        store.delete_verification_token(record.id).await?;
        return Err(AuthError::TokenExpired);
    }
    if !verify_token_hash(token, &record.token_hash) {
        return Err(AuthError::InvalidToken);
    }
    if !store.delete_verification_token(record.id).await? {
        debug!(kind = %kind, "verification token already claimed");
        return Err(AuthError::InvalidToken);
    }
    Ok(record)
}

/// Outcome of consuming an email verification token.
#[derive(Debug, Clone)]
pub struct EmailVerified {
    pub user: User,
    /// The address was already verified; nothing was re-applied.
    pub already_verified: bool,
}

/// Consume an email verification token and mark the address verified.
#[instrument(skip_all)]
pub async fn verify_email<S: UserStore + VerificationTokenStore + ?Sized>(
    store: &S,
    token: &str,
    now: DateTime<Utc>,
) -> Result<EmailVerified, AuthError> {
    let record = redeem(store, token, VerificationKind::EmailVerification, now).await?;
    let user = store
        .find_user_by_email(&record.identifier)
        .await?
        .ok_or(AuthError::UserNotFound)?
        .user;

    if user.is_verified() {
        return Ok(EmailVerified {
            user,
            already_verified: true,
        });
    }

    store.mark_email_verified(user.id, now).await?;
    info!(user_id = %user.id, "email verified");
    Ok(EmailVerified {
        user: User {
            email_verified_at: Some(now),
            ..user
        },
        already_verified: false,
    })
}

/// Consume a password reset token, store the new password and revoke every
/// refresh token of the user.
#[instrument(skip_all)]
pub async fn reset_password<S: UserStore + VerificationTokenStore + RefreshTokenStore + ?Sized>(
    store: &S,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<User, AuthError> {
    validate_password(new_password)?;
    let record = redeem(store, token, VerificationKind::PasswordReset, now).await?;
    let user = store
        .find_user_by_email(&record.identifier)
        .await?
        .ok_or(AuthError::UserNotFound)?
        .user;

    let password_hash = hash_password(new_password)?;
    store.set_password_hash(user.id, &password_hash).await?;
    let revoked = store.revoke_all_refresh_tokens(user.id, now).await?;
    info!(user_id = %user.id, revoked, "password reset");
    Ok(user)
}
