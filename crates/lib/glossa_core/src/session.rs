//! Session manager.
//!
//! A session backs the `session-token` cookie. Only the SHA-256 of the
//! cookie value is stored; expired rows are removed lazily when they are
//! presented, there is no background sweeper.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::auth::tokens::{generate_opaque_token, hash_token, verify_token_hash};
use crate::models::auth::{ClientInfo, Session};
use crate::settings::AuthSettings;
use crate::store::SessionStore;
use crate::uuid::uuidv7;

/// A freshly created session and the plaintext cookie value for it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
}

/// Session as shown to its owner.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: Session,
    /// The session was presented by the caller's own cookie.
    pub is_current: bool,
}

/// Create a session expiring after 24 h, or 7 d with remember-me.
pub async fn create_session<S: SessionStore + ?Sized>(
    store: &S,
    user_id: Uuid,
    client: &ClientInfo,
    remember_me: bool,
    settings: &AuthSettings,
    now: DateTime<Utc>,
) -> Result<IssuedSession, AuthError> {
    let token = generate_opaque_token();
    let session = Session {
        id: uuidv7(),
        user_id,
        token_hash: hash_token(&token),
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        created_at: now,
        expires_at: now + settings.session_ttl(remember_me),
    };
    store.insert_session(&session).await?;
    debug!(session_id = %session.id, %user_id, remember_me, "session created");
    Ok(IssuedSession { session, token })
}

/// Resolve a cookie value to its session. An expired session is deleted
/// and reported as absent.
pub async fn resolve_session<S: SessionStore + ?Sized>(
    store: &S,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Session>, AuthError> {
    let Some(session) = store.find_session_by_token_hash(&hash_token(token)).await? else {
        return Ok(None);
    };
    if session.is_expired(now) {
        store.delete_session(session.id).await?;
        debug!(session_id = %session.id, "expired session removed on access");
        return Ok(None);
    }
    Ok(Some(session))
}

/// Unexpired sessions of `user_id`, newest first.
pub async fn list_sessions<S: SessionStore + ?Sized>(
    store: &S,
    user_id: Uuid,
    current_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<SessionView>, AuthError> {
    let sessions = store.list_active_sessions(user_id, now).await?;
    Ok(sessions
        .into_iter()
        .map(|session| {
            let is_current =
                current_token.is_some_and(|token| verify_token_hash(token, &session.token_hash));
            SessionView {
                session,
                is_current,
            }
        })
        .collect())
}

/// Revoke another session of the caller.
///
/// The caller's current session is refused: ending it goes through logout,
/// which also clears the cookies.
pub async fn revoke_session<S: SessionStore + ?Sized>(
    store: &S,
    user_id: Uuid,
    session_id: Uuid,
    current_token: Option<&str>,
) -> Result<Session, AuthError> {
    let session = store
        .find_session(session_id)
        .await?
        .ok_or(AuthError::SessionNotFound)?;
    if session.user_id != user_id {
        return Err(AuthError::NotSessionOwner);
    }
    if current_token.is_some_and(|token| verify_token_hash(token, &session.token_hash)) {
        return Err(AuthError::CannotRevokeCurrentSession);
    }
    store.delete_session(session.id).await?;
    Ok(session)
}

/// Delete the session behind a cookie value, if any. Used by logout.
pub async fn end_session<S: SessionStore + ?Sized>(
    store: &S,
    token: &str,
) -> Result<Option<Session>, AuthError> {
    let Some(session) = store.find_session_by_token_hash(&hash_token(token)).await? else {
        return Ok(None);
    };
    store.delete_session(session.id).await?;
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn client() -> ClientInfo {
        ClientInfo::new(Some("203.0.113.7".into()), Some("test-agent".into()))
    }

    #[tokio::test]
    async fn session_ttl_follows_remember_me() {
        let store = MemoryStore::new();
        let settings = AuthSettings::default();
        let now = Utc::now();
        let short = create_session(&store, Uuid::new_v4(), &client(), false, &settings, now)
            .await
            .unwrap();
        let long = create_session(&store, Uuid::new_v4(), &client(), true, &settings, now)
            .await
            .unwrap();
        assert_eq!(short.session.expires_at - now, Duration::hours(24));
        assert_eq!(long.session.expires_at - now, Duration::days(7));
        assert_ne!(short.token, short.session.token_hash);
    }

    #[tokio::test]
    async fn expired_session_is_deleted_on_lookup() {
        let store = MemoryStore::new();
        let settings = AuthSettings::default();
        let past = Utc::now() - Duration::days(2);
        let issued = create_session(&store, Uuid::new_v4(), &client(), false, &settings, past)
            .await
            .unwrap();

        let resolved = resolve_session(&store, &issued.token, Utc::now()).await.unwrap();
        assert!(resolved.is_none());
        assert!(store.find_session(issued.session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_flags_current_and_orders_newest_first() {
        let store = MemoryStore::new();
        let settings = AuthSettings::default();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let older = create_session(&store, user, &client(), false, &settings, now)
            .await
            .unwrap();
        let newer = create_session(&store, user, &client(), false, &settings, now + Duration::seconds(5))
            .await
            .unwrap();

        let views = list_sessions(&store, user, Some(&older.token), now + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].session.id, newer.session.id);
        assert!(!views[0].is_current);
        assert!(views[1].is_current);
    }

    #[tokio::test]
    async fn revoke_checks_owner_and_current() {
        let store = MemoryStore::new();
        let settings = AuthSettings::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();
        let current = create_session(&store, alice, &client(), false, &settings, now)
            .await
            .unwrap();
        let other = create_session(&store, alice, &client(), false, &settings, now)
            .await
            .unwrap();

        let err = revoke_session(&store, bob, other.session.id, None).await.unwrap_err();
        assert!(matches!(err, AuthError::NotSessionOwner));

        let err = revoke_session(&store, alice, current.session.id, Some(&current.token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CannotRevokeCurrentSession));

        revoke_session(&store, alice, other.session.id, Some(&current.token))
            .await
            .unwrap();
        let err = revoke_session(&store, alice, other.session.id, Some(&current.token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }
}
