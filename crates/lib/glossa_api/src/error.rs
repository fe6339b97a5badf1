//! Application error types.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use glossa_core::auth::AuthError;
use glossa_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
///
/// `code` is the machine-readable `error` field of the response body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {message}")]
    Validation { code: &'static str, message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { code: &'static str, message: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            code: "validation_error",
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            code: "unauthorized",
            message: message.into(),
        }
    }

    /// Map a refresh-chain failure. Every token problem is a 401 with its
    /// own code.
    pub fn from_refresh(e: AuthError) -> Self {
        let (code, message) = match e {
            AuthError::InvalidToken => ("invalid_token", "Invalid refresh token"),
            AuthError::TokenNotFound => ("token_not_found", "Refresh token not found"),
            AuthError::TokenRevoked => ("token_revoked", "Refresh token has been revoked"),
            AuthError::TokenExpired => ("token_expired", "Refresh token has expired"),
            other => return AppError::from(other),
        };
        AppError::Unauthorized {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation { code, message } => {
                (StatusCode::BAD_REQUEST, *code, message.clone())
            }
            AppError::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, *code, message.clone())
            }
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.clone()),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests, please try again later".to_string(),
            ),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });
        let mut response = (status, body).into_response();
        if let AppError::RateLimited { retry_after } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            code: "invalid_input",
            message: rejection.body_text(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(msg) => AppError::validation(msg),
            AuthError::InvalidCredentials => AppError::Unauthorized {
                code: "invalid_credentials",
                message: "Invalid email or password".into(),
            },
            AuthError::InvalidToken | AuthError::TokenNotFound => AppError::Validation {
                code: "invalid_token",
                message: "Invalid or already used token".into(),
            },
            AuthError::TokenExpired => AppError::Validation {
                code: "token_expired",
                message: "Token has expired".into(),
            },
            AuthError::TokenRevoked => AppError::Unauthorized {
                code: "token_revoked",
                message: "Token has been revoked".into(),
            },
            AuthError::EmailTaken => {
                AppError::Conflict("An account with this email already exists".into())
            }
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::SessionNotFound => AppError::NotFound("Session not found".into()),
            AuthError::NotSessionOwner => {
                AppError::Forbidden("Session belongs to another user".into())
            }
            AuthError::CannotRevokeCurrentSession => AppError::Validation {
                code: "current_session",
                message: "Use logout to end the current session".into(),
            },
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::RateLimited { retry_after } => AppError::RateLimited { retry_after },
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
