//! HMRC error translation.
//!
//! Turns a raw non-2xx response into the local taxonomy: not-found,
//! expired authorisation, business-rule rejection, transient failure, or
//! unknown. Business-rule messages are rewritten into something a user can
//! act on; the original HMRC code and per-field details are kept.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{MtdError, MtdResult, RemoteErrorDetail};

/// A non-success response from HMRC.
#[derive(Debug, Clone)]
pub struct RemoteFailure {
    pub status: u16,
    pub body: String,
    pub correlation_id: Option<String>,
}

impl RemoteFailure {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            correlation_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteErrorKind {
    NotFound,
    AuthExpired,
    BusinessRule,
    Transient,
    Unknown,
}

/// Classified remote error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub code: String,
    pub details: Vec<RemoteErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct HmrcErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<RemoteErrorDetail>,
}

pub const DUPLICATE_SUBMISSION: &str = "RULE_DUPLICATE_SUBMISSION";

const NOT_FOUND_CODES: &[&str] = &[
    "MATCHING_RESOURCE_NOT_FOUND",
    "NOT_FOUND",
    "NO_OBLIGATIONS_FOUND",
    "NO_SUBMISSIONS_EXIST",
];

const AUTH_CODES: &[&str] = &[
    "INVALID_CREDENTIALS",
    "CLIENT_OR_AGENT_NOT_AUTHORISED",
    "UNAUTHORIZED",
    "INVALID_BEARER_TOKEN",
];

const TRANSIENT_CODES: &[&str] = &[
    "SERVER_ERROR",
    "SERVICE_UNAVAILABLE",
    "INTERNAL_SERVER_ERROR",
    "MESSAGE_THROTTLED_OUT",
];

/// Classify a raw HMRC failure.
pub fn translate(failure: &RemoteFailure) -> TranslatedError {
    let body: HmrcErrorBody = serde_json::from_str(&failure.body).unwrap_or_default();

    // HMRC wraps several rule failures under a generic top-level code
    // (e.g. `INVALID_REQUEST`); the first specific one decides.
    let code = match body.code.as_deref() {
        Some("INVALID_REQUEST" | "BUSINESS_ERROR") | None => body
            .errors
            .first()
            .map(|e| e.code.clone())
            .or(body.code.clone())
            .unwrap_or_else(|| format!("HTTP_{}", failure.status)),
        Some(c) => c.to_string(),
    };

    let kind = classify(failure.status, &code);
    let remote_message = body.message.unwrap_or_default();
    let message = match kind {
        RemoteErrorKind::NotFound => "HMRC holds no matching records yet.".to_string(),
        RemoteErrorKind::AuthExpired => {
            "Your HMRC connection has expired. Please reconnect to continue.".to_string()
        }
        RemoteErrorKind::BusinessRule => user_message(&code)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if remote_message.is_empty() {
                    format!("HMRC rejected the submission ({code}).")
                } else {
                    remote_message.clone()
                }
            }),
        RemoteErrorKind::Transient => {
            "HMRC is temporarily unavailable. Please try again shortly.".to_string()
        }
        RemoteErrorKind::Unknown => {
            "Something went wrong talking to HMRC. Please try again.".to_string()
        }
    };

    if kind == RemoteErrorKind::Unknown {
        error!(
            status = failure.status,
            code = %code,
            correlation_id = ?failure.correlation_id,
            body = %failure.body,
            "unrecognised HMRC error"
        );
    }

    TranslatedError {
        kind,
        message,
        code,
        details: body.errors,
    }
}

fn classify(status: u16, code: &str) -> RemoteErrorKind {
    if NOT_FOUND_CODES.contains(&code) {
        RemoteErrorKind::NotFound
    } else if status == 401 || AUTH_CODES.contains(&code) {
        RemoteErrorKind::AuthExpired
    } else if code.starts_with("RULE_") || code.starts_with("FORMAT_") {
        RemoteErrorKind::BusinessRule
    } else if status == 429 || status >= 500 || TRANSIENT_CODES.contains(&code) {
        RemoteErrorKind::Transient
    } else if status == 404 {
        RemoteErrorKind::NotFound
    } else {
        RemoteErrorKind::Unknown
    }
}

/// Plain-language text for the business-rule codes users actually hit.
pub fn user_message(code: &str) -> Option<&'static str> {
    let msg = match code {
        DUPLICATE_SUBMISSION => "A submission for this period has already been made.",
        "RULE_OVERLAPPING_PERIOD" => "This period overlaps one that has already been submitted.",
        "RULE_MISALIGNED_PERIOD" => "The period dates do not match an HMRC obligation.",
        "RULE_NOT_CONTIGUOUS_PERIOD" => {
            "The period does not follow on from the last submitted period."
        }
        "RULE_TAX_YEAR_NOT_SUPPORTED" => "HMRC does not accept submissions for this tax year.",
        "RULE_TAX_YEAR_NOT_ENDED" => "This tax year has not ended yet.",
        "RULE_TAX_YEAR_RANGE_INVALID" => "The tax year must span exactly one year.",
        "RULE_END_DATE_BEFORE_START_DATE" => "The period end date is before its start date.",
        "RULE_BOTH_EXPENSES_SUPPLIED" | "RULE_BOTH_CONSOLIDATED_AND_ITEMISED" => {
            "Submit either consolidated expenses or itemised expenses, not both."
        }
        "RULE_NOT_ALLOWED_CONSOLIDATED_EXPENSES" => {
            "Your turnover is above the limit for consolidated expenses; itemise them instead."
        }
        "RULE_INCORRECT_OR_EMPTY_BODY_SUBMITTED" => "The submission contained no figures.",
        "RULE_BUSINESS_VALIDATION_FAILURE" => "HMRC could not validate the business details.",
        "RULE_INCORRECT_GOV_TEST_SCENARIO" => "The sandbox test scenario header was not recognised.",
        "FORMAT_NINO" => "The National Insurance number is not valid.",
        "FORMAT_BUSINESS_ID" => "The business identifier is not valid.",
        "FORMAT_TAX_YEAR" => "The tax year is not valid.",
        "FORMAT_VALUE" => "One or more amounts are outside the range HMRC accepts.",
        "FORMAT_START_DATE" | "FORMAT_END_DATE" => "A period date is not valid.",
        _ => return None,
    };
    Some(msg)
}

impl From<TranslatedError> for MtdError {
    fn from(t: TranslatedError) -> Self {
        match t.kind {
            RemoteErrorKind::NotFound => MtdError::RemoteNotFound(t.message),
            RemoteErrorKind::AuthExpired => MtdError::Authentication(t.message),
            RemoteErrorKind::BusinessRule => MtdError::RemoteBusinessRule {
                code: t.code,
                message: t.message,
                details: t.details,
            },
            RemoteErrorKind::Transient => MtdError::RemoteTransient(t.message),
            RemoteErrorKind::Unknown => MtdError::RemoteUnknown(t.message),
        }
    }
}

/// Collapse a not-found result into `T::default()`.
pub fn not_found_as_default<T: Default>(result: MtdResult<T>) -> MtdResult<T> {
    match result {
        Err(MtdError::RemoteNotFound(_)) => Ok(T::default()),
        other => other,
    }
}
