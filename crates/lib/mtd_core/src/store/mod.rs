//! Persistence seams.
//!
//! The pipeline talks to storage only through these traits. [`pg::PgStore`]
//! backs them with PostgreSQL; [`memory::MemoryStore`] keeps everything in
//! process for tests and local tooling.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::MtdResult;
use crate::models::{
    AdjustmentRecord, BusinessType, CategorizedTransaction, NewAdjustment, OAuthTokenRecord,
    SubmissionRecord,
};
use crate::tax_year::{SubmissionProtocol, TaxYear};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Per-user OAuth token storage.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn load_token(&self, user_id: &str) -> MtdResult<Option<OAuthTokenRecord>>;

    /// Insert or overwrite the user's record.
    async fn save_token(&self, user_id: &str, record: &OAuthTokenRecord) -> MtdResult<()>;

    async fn delete_token(&self, user_id: &str) -> MtdResult<bool>;
}

/// Read-only access to categorised transactions owned upstream.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Every transaction (any review status) dated within `[from, to]`.
    async fn transactions_between(
        &self,
        user_id: &str,
        business_type: BusinessType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> MtdResult<Vec<CategorizedTransaction>>;
}

#[async_trait]
pub trait AdjustmentRepository: Send + Sync {
    /// Adjustments for a tax year, narrowed to one business when given.
    async fn list_adjustments(
        &self,
        user_id: &str,
        business_type: BusinessType,
        business_id: Option<&str>,
        tax_year: TaxYear,
    ) -> MtdResult<Vec<AdjustmentRecord>>;

    async fn insert_adjustment(
        &self,
        user_id: &str,
        adjustment: &NewAdjustment,
    ) -> MtdResult<AdjustmentRecord>;

    async fn update_adjustment(
        &self,
        user_id: &str,
        id: Uuid,
        adjustment: &NewAdjustment,
    ) -> MtdResult<Option<AdjustmentRecord>>;

    async fn delete_adjustment(&self, user_id: &str, id: Uuid) -> MtdResult<bool>;
}

/// Append-only audit record of transmitted submissions.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    async fn record(&self, record: &SubmissionRecord) -> MtdResult<()>;

    /// The user's most recent row for exactly this business and period.
    async fn latest_for(
        &self,
        user_id: &str,
        business_id: &str,
        tax_year: TaxYear,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> MtdResult<Option<SubmissionRecord>>;

    /// The user's most recent row of a protocol for the business and tax
    /// year, any period.
    async fn latest_for_tax_year(
        &self,
        user_id: &str,
        business_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionProtocol,
    ) -> MtdResult<Option<SubmissionRecord>>;

    /// Most recent row for the user's business of a type, for callers that
    /// do not know the business id.
    async fn latest_for_business_type(
        &self,
        user_id: &str,
        business_type: BusinessType,
        tax_year: TaxYear,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> MtdResult<Option<SubmissionRecord>>;
}
