//! JWT access/refresh token generation and verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{TokenClaims, TokenPayload};
use crate::settings::AuthSettings;

const ACCESS_TYP: &str = "access";
const REFRESH_TYP: &str = "refresh";

/// Signs and verifies HS256 tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    settings: AuthSettings,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], settings: AuthSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Generate a signed access token (15 min, or 1 h with remember-me).
    pub fn generate_access_token(
        &self,
        payload: &TokenPayload,
        remember_me: bool,
    ) -> Result<String, AuthError> {
        let ttl = self.settings.access_ttl(remember_me);
        self.sign(payload, ACCESS_TYP, Utc::now(), ttl)
    }

    /// Generate a signed refresh token (30 d, or 90 d with remember-me).
    pub fn generate_refresh_token(
        &self,
        payload: &TokenPayload,
        remember_me: bool,
    ) -> Result<String, AuthError> {
        let ttl = self.settings.refresh_ttl(remember_me);
        self.sign(payload, REFRESH_TYP, Utc::now(), ttl)
    }

    /// Verify an access token, returning the claims on success.
    pub fn verify_access_token(&self, token: &str) -> Option<TokenClaims> {
        self.verify(token, ACCESS_TYP)
    }

    /// Verify a refresh token's signature, expiry and type.
    pub fn verify_refresh_token(&self, token: &str) -> Option<TokenClaims> {
        self.verify(token, REFRESH_TYP)
    }

    fn sign(
        &self,
        payload: &TokenPayload,
        typ: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims {
            sub: payload.user_id.to_string(),
            email: payload.email.clone(),
            roles: payload.roles.clone(),
            typ: typ.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    fn verify(&self, token: &str, typ: &str) -> Option<TokenClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
            .filter(|claims| claims.typ == typ)
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    for var in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    load_or_generate_secret(&jwt_secret_path())
}

/// Read a persisted secret, generating and writing one when absent.
pub fn load_or_generate_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), "could not create secret directory: {e}");
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(path = %path.display(), "could not persist JWT secret: {e}"),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glossa")
        .join("jwt-secret")
}
