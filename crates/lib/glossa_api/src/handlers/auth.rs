//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use chrono::Utc;
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, ClientMeta};
use crate::models::{
    EmailRequest, LoginRequest, LoginResponse, MessageResponse, RefreshResponse, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, VerifyEmailRequest,
};
use crate::services::auth;
use crate::services::cookies::{
    REFRESH_COOKIE, SESSION_COOKIE, clear_credentials, cookie_value, set_credentials,
};

/// `POST /register`: create a new account.
pub async fn register_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let resp = auth::register(
        &state,
        &body.email,
        &body.password,
        body.name.as_deref(),
        &client,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `POST /login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let (resp, credentials) = auth::login(
        &state,
        &body.email,
        &body.password,
        body.remember_me,
        &client,
    )
    .await?;
    let jar = set_credentials(jar, &credentials, Utc::now(), state.config.production);
    Ok((jar, Json(resp)))
}

/// Enumeration-resistant endpoints answer an unreadable body like any
/// other address. The blank email fails validation downstream.
fn email_or_blank(body: Result<AppJson<EmailRequest>, AppError>) -> String {
    match body {
        Ok(AppJson(body)) => body.email,
        Err(e) => {
            debug!("unreadable email request body: {e}");
            String::new()
        }
    }
}

/// `POST /forgot-password`: always answers 200.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    body: Result<AppJson<EmailRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    let email = email_or_blank(body);
    Ok(Json(auth::forgot_password(&state, &email, &client).await?))
}

/// `POST /resend-verification`: always answers 200.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    body: Result<AppJson<EmailRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    let email = email_or_blank(body);
    Ok(Json(auth::resend_verification(&state, &email, &client).await?))
}

/// `POST /verify-email`
pub async fn verify_email_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    AppJson(body): AppJson<VerifyEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(auth::verify_email(&state, &body.token, &client).await?))
}

/// `POST /reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    AppJson(body): AppJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(
        auth::reset_password(&state, &body.token, &body.new_password, &client).await?,
    ))
}

/// `POST /refresh`: rotate the refresh-token cookie and issue a new access
/// token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<RefreshResponse>)> {
    let credentials = auth::refresh(
        &state,
        cookie_value(&jar, REFRESH_COOKIE),
        cookie_value(&jar, SESSION_COOKIE),
        &client,
    )
    .await?;
    let resp = RefreshResponse {
        success: true,
        access_token: credentials.access_token.clone(),
    };
    let jar = set_credentials(jar, &credentials, Utc::now(), state.config.production);
    Ok((jar, Json(resp)))
}

/// `POST /logout`: end the session, revoke the refresh token, clear cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let resp = auth::logout(
        &state,
        cookie_value(&jar, SESSION_COOKIE),
        cookie_value(&jar, REFRESH_COOKIE),
        &client,
    )
    .await?;
    Ok((clear_credentials(jar, state.config.production), Json(resp)))
}
