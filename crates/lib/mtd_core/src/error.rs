//! Error taxonomy shared by every stage of the submission pipeline.

use thiserror::Error;

/// Result alias for pipeline operations.
pub type MtdResult<T> = Result<T, MtdError>;

/// Pipeline errors.
///
/// The `Remote*` variants are produced by [`crate::translate`] from raw HMRC
/// responses; everything else originates locally.
#[derive(Debug, Error)]
pub enum MtdError {
    /// Malformed or contradictory input, rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable OAuth token (missing record, or the refresh was refused).
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// HMRC holds nothing for the requested resource.
    #[error("Not found: {0}")]
    RemoteNotFound(String),

    /// HMRC rejected the request on a business rule. Resubmitting unchanged
    /// input fails identically.
    #[error("HMRC rejected the submission ({code}): {message}")]
    RemoteBusinessRule {
        code: String,
        message: String,
        details: Vec<RemoteErrorDetail>,
    },

    /// Temporary HMRC-side failure; safe to retry later.
    #[error("HMRC temporarily unavailable: {0}")]
    RemoteTransient(String),

    /// Remote failure we could not classify.
    #[error("HMRC request failed: {0}")]
    RemoteUnknown(String),

    /// Settings that must not be defaulted are missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single entry of HMRC's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RemoteErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl MtdError {
    /// Short machine-readable code used by API responses.
    pub fn code(&self) -> &str {
        match self {
            MtdError::Validation(_) => "VALIDATION_ERROR",
            MtdError::Authentication(_) => "AUTHENTICATION_REQUIRED",
            MtdError::RemoteNotFound(_) => "NOT_FOUND",
            MtdError::RemoteBusinessRule { code, .. } => code,
            MtdError::RemoteTransient(_) => "SERVICE_UNAVAILABLE",
            MtdError::RemoteUnknown(_) => "REMOTE_ERROR",
            MtdError::Config(_)
            | MtdError::Encryption(_)
            | MtdError::Db(_)
            | MtdError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same request later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MtdError::RemoteTransient(_) | MtdError::RemoteUnknown(_) | MtdError::Db(_)
        )
    }
}
