//! Ledger rows describing what was transmitted to HMRC.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::BusinessType;
use crate::tax_year::{SubmissionProtocol, TaxYear};

/// One transmitted submission. Rows are never edited; a later row for the
/// same period supersedes an earlier one when reading current totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Business id as the caller knows it.
    pub business_id: String,
    /// Business id actually used on the remote call. Differs from
    /// `business_id` only in the sandbox.
    pub remote_business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub submission_type: SubmissionProtocol,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Request body exactly as sent.
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    pub remote_submission_id: Option<String>,
}

/// Remote lifecycle of a period (period protocol) or a business/tax year
/// (cumulative protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionState {
    NotSubmitted,
    Submitted,
    Amended,
}

impl SubmissionState {
    /// State after one more successful call.
    pub fn advance(self, protocol: SubmissionProtocol) -> Self {
        match (self, protocol) {
            (SubmissionState::NotSubmitted, _) => SubmissionState::Submitted,
            (_, SubmissionProtocol::Period) => SubmissionState::Submitted,
            (_, SubmissionProtocol::Cumulative) => SubmissionState::Amended,
        }
    }
}
