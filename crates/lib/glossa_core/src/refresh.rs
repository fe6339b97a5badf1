//! Refresh token rotation chain.
//!
//! Each login starts a chain. Every refresh consumes the presented token,
//! revokes it with a forward pointer to its successor, and swaps the user's
//! session. The revoke and the successor insert happen in one storage step,
//! so a token can be used at most once even under concurrent requests.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::auth::jwt::TokenSigner;
use crate::auth::tokens::{hash_token, verify_token_hash};
use crate::models::auth::{ClientInfo, RefreshTokenRecord, TokenPayload};
use crate::session::{IssuedSession, create_session};
use crate::settings::SessionEviction;
use crate::store::{RefreshTokenStore, SessionStore};
use crate::uuid::uuidv7;

/// Credentials handed back after login or a successful rotation.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_record: RefreshTokenRecord,
    pub session: IssuedSession,
    pub remember_me: bool,
}

/// Result of one rotation step.
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub user_id: Uuid,
    /// Id of the record that was consumed.
    pub previous_id: Uuid,
    pub credentials: IssuedCredentials,
    /// Sessions removed by the eviction policy.
    pub evicted_sessions: u64,
}

fn new_record(
    payload: &TokenPayload,
    token: &str,
    client: &ClientInfo,
    remember_me: bool,
    signer: &TokenSigner,
    now: DateTime<Utc>,
) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: uuidv7(),
        user_id: payload.user_id,
        token_hash: hash_token(token),
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        created_at: now,
        expires_at: now + signer.settings().refresh_ttl(remember_me),
        revoked_at: None,
        replaced_by: None,
    }
}

/// Issue the first credentials of a chain: access token, refresh token
/// root and a session.
#[instrument(skip_all, fields(user_id = %payload.user_id, remember_me))]
pub async fn start_chain<S: RefreshTokenStore + SessionStore + ?Sized>(
    store: &S,
    signer: &TokenSigner,
    payload: &TokenPayload,
    client: &ClientInfo,
    remember_me: bool,
    now: DateTime<Utc>,
) -> Result<IssuedCredentials, AuthError> {
    let access_token = signer.generate_access_token(payload, remember_me)?;
    let refresh_token = signer.generate_refresh_token(payload, remember_me)?;
    let refresh_record = new_record(payload, &refresh_token, client, remember_me, signer, now);
    store.insert_refresh_token(&refresh_record).await?;

    let session = create_session(
        store,
        payload.user_id,
        client,
        remember_me,
        signer.settings(),
        now,
    )
    .await?;

    Ok(IssuedCredentials {
        access_token,
        refresh_token,
        refresh_record,
        session,
        remember_me,
    })
}

/// Exchange a refresh token for a new access token, a successor refresh
/// token and a fresh session.
///
/// `current_session_token` is the caller's session cookie; it only matters
/// under [`SessionEviction::RefreshingSessionOnly`].
#[instrument(skip_all)]
pub async fn rotate<S: RefreshTokenStore + SessionStore + ?Sized>(
    store: &S,
    signer: &TokenSigner,
    refresh_token: &str,
    current_session_token: Option<&str>,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<RotationOutcome, AuthError> {
    let claims = signer
        .verify_refresh_token(refresh_token)
        .ok_or(AuthError::InvalidToken)?;
    let payload = TokenPayload::try_from(&claims).map_err(|_| AuthError::InvalidToken)?;

    let stored = store
        .find_refresh_token_by_hash(&hash_token(refresh_token))
        .await?
        .ok_or(AuthError::TokenNotFound)?;
    if !verify_token_hash(refresh_token, &stored.token_hash) || stored.user_id != payload.user_id
    {
        return Err(AuthError::TokenNotFound);
    }
    if stored.revoked_at.is_some() {
        warn!(token_id = %stored.id, user_id = %stored.user_id, "revoked refresh token presented");
        return Err(AuthError::TokenRevoked);
    }
    if stored.expires_at < now {
        return Err(AuthError::TokenExpired);
    }

    let settings = signer.settings();
    let remember_me = settings.is_remember_me(stored.lifetime());

    let next_token = signer.generate_refresh_token(&payload, remember_me)?;
    let successor = new_record(&payload, &next_token, client, remember_me, signer, now);
    if !store.rotate_refresh_token(stored.id, &successor, now).await? {
        // Another request consumed the token between lookup and rotation.
        warn!(token_id = %stored.id, "refresh token rotation lost a race");
        return Err(AuthError::TokenRevoked);
    }

    let access_token = signer.generate_access_token(&payload, remember_me)?;

    let evicted_sessions = match settings.session_eviction {
        SessionEviction::AllUserSessions => {
            store.delete_active_sessions(payload.user_id, now).await?
        }
        SessionEviction::RefreshingSessionOnly => {
            evict_presented_session(store, payload.user_id, current_session_token).await?
        }
    };
    let session = create_session(
        store,
        payload.user_id,
        client,
        remember_me,
        settings,
        now,
    )
    .await?;

    debug!(
        user_id = %payload.user_id,
        previous = %stored.id,
        next = %successor.id,
        evicted_sessions,
        "refresh token rotated"
    );

    Ok(RotationOutcome {
        user_id: payload.user_id,
        previous_id: stored.id,
        credentials: IssuedCredentials {
            access_token,
            refresh_token: next_token,
            refresh_record: successor,
            session,
            remember_me,
        },
        evicted_sessions,
    })
}

async fn evict_presented_session<S: SessionStore + ?Sized>(
    store: &S,
    user_id: Uuid,
    token: Option<&str>,
) -> Result<u64, AuthError> {
    let Some(token) = token else {
        return Ok(0);
    };
    match store.find_session_by_token_hash(&hash_token(token)).await? {
        Some(session) if session.user_id == user_id => {
            Ok(u64::from(store.delete_session(session.id).await?))
        }
        _ => Ok(0),
    }
}

/// Revoke the record behind a presented refresh token, if it is still
/// active. Used by logout; unknown or foreign tokens are ignored.
pub async fn revoke_presented<S: RefreshTokenStore + ?Sized>(
    store: &S,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<Option<RefreshTokenRecord>, AuthError> {
    let Some(record) = store
        .find_refresh_token_by_hash(&hash_token(refresh_token))
        .await?
    else {
        return Ok(None);
    };
    if store.revoke_refresh_token(record.id, now).await? {
        Ok(Some(record))
    } else {
        Ok(None)
    }
}
