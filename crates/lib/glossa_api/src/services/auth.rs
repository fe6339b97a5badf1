//! Authentication orchestrators: register, login, verification, password
//! reset, refresh and logout.
//!
//! Each function is one HTTP-facing operation: rate-limit gate, store and
//! token work, then an audit event. Cookie handling stays in the handlers.

use chrono::Utc;
use glossa_core::audit::AuditEvent;
use glossa_core::auth::AuthError;
use glossa_core::auth::password::{hash_password, verify_dummy_password, verify_password};
use glossa_core::auth::validation::{validate_email, validate_password};
use glossa_core::mail::{self, EmailMessage};
use glossa_core::models::audit::AuditAction;
use glossa_core::models::auth::{ClientInfo, NewUser, TokenPayload, User, VerificationKind};
use glossa_core::rate_limit::{self, RateLimitAction};
use glossa_core::refresh::{self, IssuedCredentials};
use glossa_core::session;
use glossa_core::store::{StoreError, UserStore};
use glossa_core::verification;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{LoginResponse, MessageResponse, RegisterResponse, UserResponse};
use crate::services::throttle::throttle;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";
const RESEND_VERIFICATION_MESSAGE: &str =
    "If an unverified account exists for that email, a verification link has been sent.";

async fn send_mail(state: &AppState, message: EmailMessage) {
    if let Err(e) = state.mailer.send(&message).await {
        warn!(to = %message.to, subject = %message.subject, "failed to send email: {e}");
    }
}

async fn roles_for(state: &AppState, user: &User) -> AppResult<Vec<String>> {
    Ok(state
        .store
        .find_system_role(user.id)
        .await?
        .map(|grant| vec![grant.role.claim().to_string()])
        .unwrap_or_default())
}

/// Create an account and email a verification link.
#[instrument(skip(state, password, client))]
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<&str>,
    client: &ClientInfo,
) -> AppResult<RegisterResponse> {
    throttle(state, RateLimitAction::Register, client.ip_or_unknown()).await?;

    let email = validate_email(email)?;
    validate_password(password)?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);

    let password_hash = hash_password(password)?;
    let user = state
        .store
        .create_user(NewUser {
            email: email.clone(),
            name,
            password_hash: Some(password_hash),
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;

    let token = verification::issue(
        state.store.as_ref(),
        &user.email,
        VerificationKind::EmailVerification,
        &state.config.auth,
        Utc::now(),
    )
    .await?;
    send_mail(
        state,
        mail::verification_email(&user.email, &state.config.app_base_url, &token),
    )
    .await;

    state.audit.record(
        AuditEvent::new(AuditAction::UserRegistered, "user")
            .actor(user.id)
            .resource(user.id)
            .client(client),
    );
    info!(user_id = %user.id, "user registered");

    Ok(RegisterResponse {
        success: true,
        message: "Account created. Check your email to verify your address.".into(),
        user_id: user.id,
    })
}

/// Password login. Issues an access token, the root of a refresh chain and
/// a session.
#[instrument(skip(state, password, client))]
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    remember_me: bool,
    client: &ClientInfo,
) -> AppResult<(LoginResponse, IssuedCredentials)> {
    let store = state.store.as_ref();
    let now = Utc::now();
    let email = validate_email(email).map_err(|_| AuthError::InvalidCredentials)?;
    let ip_key = RateLimitAction::Login.key(client.ip_or_unknown());
    let email_key = RateLimitAction::Login.key(&email);

    let rule = RateLimitAction::Login.rule();
    let by_ip = rate_limit::check(store, &ip_key, rule, now).await?;
    let by_email = rate_limit::check(store, &email_key, rule, now).await?;
    if !by_ip.success || !by_email.success {
        let retry_after = by_ip.retry_after.max(by_email.retry_after).unwrap_or(1);
        return Err(AppError::RateLimited { retry_after });
    }

    let found = store.find_user_by_email(&email).await?;
    let verified = match found.as_ref().and_then(|a| a.password_hash.as_deref()) {
        Some(hash) => verify_password(password, hash)?,
        None => verify_dummy_password(password),
    };

    rate_limit::record_attempt(store, &ip_key, verified, now).await?;
    rate_limit::record_attempt(store, &email_key, verified, now).await?;

    let user = match found {
        Some(account) if verified => account.user,
        _ => {
            debug!("login rejected");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let payload = TokenPayload {
        user_id: user.id,
        email: user.email.clone(),
        roles: roles_for(state, &user).await?,
    };
    let credentials =
        refresh::start_chain(store, &state.signer, &payload, client, remember_me, now).await?;

    state.audit.record(
        AuditEvent::new(AuditAction::Login, "user")
            .actor(user.id)
            .resource(user.id)
            .details(json!({
                "rememberMe": remember_me,
                "sessionId": credentials.session.session.id,
            }))
            .client(client),
    );
    info!(user_id = %user.id, remember_me, "user logged in");

    Ok((
        LoginResponse {
            success: true,
            access_token: credentials.access_token.clone(),
            user: UserResponse::from(&user),
        },
        credentials,
    ))
}

/// Email a password reset link. The answer never reveals whether the
/// account exists or whether the request was throttled.
#[instrument(skip(state, client))]
pub async fn forgot_password(
    state: &AppState,
    email: &str,
    client: &ClientInfo,
) -> AppResult<MessageResponse> {
    if let Err(e) = request_password_reset(state, email, client).await {
        match &e {
            AppError::RateLimited { .. } => debug!("forgot-password throttled"),
            AppError::Validation { .. } => debug!("forgot-password with malformed email"),
            other => error!("forgot-password failed: {other}"),
        }
    }
    Ok(MessageResponse::ok(FORGOT_PASSWORD_MESSAGE))
}

async fn request_password_reset(
    state: &AppState,
    email: &str,
    client: &ClientInfo,
) -> AppResult<()> {
    throttle(state, RateLimitAction::ForgotPassword, client.ip_or_unknown()).await?;
    let email = validate_email(email)?;

    let Some(account) = state.store.find_user_by_email(&email).await? else {
        return Ok(());
    };
    if account.password_hash.is_none() {
        return Ok(());
    }

    let token = verification::issue(
        state.store.as_ref(),
        &account.user.email,
        VerificationKind::PasswordReset,
        &state.config.auth,
        Utc::now(),
    )
    .await?;
    send_mail(
        state,
        mail::password_reset_email(&account.user.email, &state.config.app_base_url, &token),
    )
    .await;

    state.audit.record(
        AuditEvent::new(AuditAction::PasswordResetRequested, "user")
            .actor(account.user.id)
            .resource(account.user.id)
            .client(client),
    );
    Ok(())
}

/// Re-send the verification link. Same enumeration resistance as
/// [`forgot_password`].
#[instrument(skip(state, client))]
pub async fn resend_verification(
    state: &AppState,
    email: &str,
    client: &ClientInfo,
) -> AppResult<MessageResponse> {
    if let Err(e) = reissue_verification(state, email, client).await {
        match &e {
            AppError::RateLimited { .. } | AppError::Validation { .. } => {
                debug!("resend-verification suppressed: {e}")
            }
            other => error!("resend-verification failed: {other}"),
        }
    }
    Ok(MessageResponse::ok(RESEND_VERIFICATION_MESSAGE))
}

async fn reissue_verification(
    state: &AppState,
    email: &str,
    client: &ClientInfo,
) -> AppResult<()> {
    throttle(state, RateLimitAction::ResendVerification, client.ip_or_unknown()).await?;
    let email = validate_email(email)?;

    let Some(account) = state.store.find_user_by_email(&email).await? else {
        return Ok(());
    };
    if account.user.is_verified() || account.password_hash.is_none() {
        return Ok(());
    }

    let token = verification::issue(
        state.store.as_ref(),
        &account.user.email,
        VerificationKind::EmailVerification,
        &state.config.auth,
        Utc::now(),
    )
    .await?;
    send_mail(
        state,
        mail::verification_email(&account.user.email, &state.config.app_base_url, &token),
    )
    .await;
    Ok(())
}

/// Consume an email verification token. Idempotent for verified accounts.
#[instrument(skip(state, token, client))]
pub async fn verify_email(
    state: &AppState,
    token: &str,
    client: &ClientInfo,
) -> AppResult<MessageResponse> {
    throttle(state, RateLimitAction::VerifyEmail, client.ip_or_unknown()).await?;

    let outcome = verification::verify_email(state.store.as_ref(), token.trim(), Utc::now()).await?;
    if outcome.already_verified {
        return Ok(MessageResponse::ok("Email address already verified."));
    }

    state.audit.record(
        AuditEvent::new(AuditAction::EmailVerified, "user")
            .actor(outcome.user.id)
            .resource(outcome.user.id)
            .client(client),
    );
    Ok(MessageResponse::ok("Email address verified."))
}

/// Consume a password reset token and log the user out everywhere.
#[instrument(skip(state, token, new_password, client))]
pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
    client: &ClientInfo,
) -> AppResult<MessageResponse> {
    throttle(state, RateLimitAction::ResetPassword, client.ip_or_unknown()).await?;

    let user = verification::reset_password(
        state.store.as_ref(),
        token.trim(),
        new_password,
        Utc::now(),
    )
    .await?;

    state.audit.record(
        AuditEvent::new(AuditAction::PasswordReset, "user")
            .actor(user.id)
            .resource(user.id)
            .client(client),
    );
    Ok(MessageResponse::ok(
        "Password updated. Sign in again with your new password.",
    ))
}

/// Rotate the presented refresh token.
#[instrument(skip_all)]
pub async fn refresh(
    state: &AppState,
    refresh_token: Option<&str>,
    session_token: Option<&str>,
    client: &ClientInfo,
) -> AppResult<IssuedCredentials> {
    let refresh_token = refresh_token.ok_or(AppError::Unauthorized {
        code: "invalid_token",
        message: "Missing refresh token".into(),
    })?;
    let outcome = refresh::rotate(
        state.store.as_ref(),
        &state.signer,
        refresh_token,
        session_token,
        client,
        Utc::now(),
    )
    .await
    .map_err(AppError::from_refresh)?;

    state.audit.record(
        AuditEvent::new(AuditAction::TokenRefreshed, "refresh_token")
            .actor(outcome.user_id)
            .resource(outcome.credentials.refresh_record.id)
            .details(json!({
                "previousTokenId": outcome.previous_id,
                "evictedSessions": outcome.evicted_sessions,
            }))
            .client(client),
    );
    Ok(outcome.credentials)
}

/// End the current session and revoke the presented refresh token. Missing
/// or unknown credentials are not an error.
#[instrument(skip_all)]
pub async fn logout(
    state: &AppState,
    session_token: Option<&str>,
    refresh_token: Option<&str>,
    client: &ClientInfo,
) -> AppResult<MessageResponse> {
    let store = state.store.as_ref();
    let mut actor = None;

    if let Some(token) = session_token
        && let Some(ended) = session::end_session(store, token).await?
    {
        actor = Some(ended.user_id);
    }
    if let Some(token) = refresh_token
        && let Some(revoked) = refresh::revoke_presented(store, token, Utc::now()).await?
    {
        actor = actor.or(Some(revoked.user_id));
    }

    if let Some(user_id) = actor {
        state.audit.record(
            AuditEvent::new(AuditAction::Logout, "user")
                .actor(user_id)
                .resource(user_id)
                .client(client),
        );
    }
    Ok(MessageResponse::ok("Logged out."))
}
