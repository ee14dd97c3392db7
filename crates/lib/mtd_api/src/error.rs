//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mtd_core::error::{MtdError, RemoteErrorDetail};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Missing or refused HMRC authorisation; the user must reconnect.
    #[error("HMRC authorisation required: {0}")]
    HmrcAuthorization(String),

    #[error("HMRC rejected the request ({code}): {message}")]
    BusinessRule {
        code: String,
        message: String,
        details: Vec<RemoteErrorDetail>,
    },

    #[error("HMRC unavailable: {0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Structured error body: `{message, code, details}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<RemoteErrorDetail>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error".into(), m, vec![]),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found".into(), m, vec![]),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized".into(), m, vec![]),
            AppError::HmrcAuthorization(m) => {
                (StatusCode::FORBIDDEN, "hmrc_authorization_required".into(), m, vec![])
            }
            AppError::BusinessRule {
                code,
                message,
                details,
            } => (StatusCode::UNPROCESSABLE_ENTITY, code, message, details),
            AppError::Upstream(m) => (StatusCode::BAD_GATEWAY, "hmrc_unavailable".into(), m, vec![]),
            AppError::Internal(m) => {
                error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".into(),
                    "Internal server error".into(),
                    vec![],
                )
            }
        };
        let body = Json(ErrorResponse {
            message,
            code,
            details,
        });
        (status, body).into_response()
    }
}

impl From<MtdError> for AppError {
    fn from(e: MtdError) -> Self {
        match e {
            MtdError::Validation(msg) => AppError::Validation(msg),
            MtdError::Authentication(msg) => AppError::HmrcAuthorization(msg),
            MtdError::RemoteNotFound(msg) => AppError::NotFound(msg),
            MtdError::RemoteBusinessRule {
                code,
                message,
                details,
            } => AppError::BusinessRule {
                code,
                message,
                details,
            },
            MtdError::RemoteTransient(msg) | MtdError::RemoteUnknown(msg) => {
                AppError::Upstream(msg)
            }
            MtdError::Config(msg) | MtdError::Encryption(msg) | MtdError::Internal(msg) => {
                AppError::Internal(msg)
            }
            MtdError::Db(e) => AppError::from(e),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}
