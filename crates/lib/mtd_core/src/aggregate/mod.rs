//! Period aggregation.
//!
//! Buckets confirmed transactions and adjustments into this-period and
//! cumulative year-to-date totals, and reports data-quality warnings over
//! the whole year-to-date window.

pub mod bucket;

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boxes::{Classification, classify};
use crate::error::{MtdError, MtdResult};
use crate::models::{BusinessType, ReviewStatus, SubmissionRecord};
use crate::store::{AdjustmentRepository, SubmissionLedger, TransactionSource};
use crate::tax_year::{SubmissionProtocol, TaxYear};

pub use bucket::{ReportingBucket, round_money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub user_id: String,
    pub business_type: BusinessType,
    /// Narrows adjustments and the ledger lookup to one business.
    #[serde(default)]
    pub business_id: Option<String>,
    pub tax_year: TaxYear,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl AggregateRequest {
    pub fn validate(&self) -> MtdResult<()> {
        if self.period_start > self.period_end {
            return Err(MtdError::Validation(format!(
                "Period start {} is after period end {}",
                self.period_start, self.period_end
            )));
        }
        if !self.tax_year.contains(self.period_start) || !self.tax_year.contains(self.period_end) {
            return Err(MtdError::Validation(format!(
                "Period {}..{} is outside tax year {}",
                self.period_start, self.period_end, self.tax_year
            )));
        }
        Ok(())
    }
}

/// Data-quality counters over `[tax year start, period end]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warnings {
    /// Confirmed transactions with a missing, unknown, or foreign-family
    /// category. Not in any box.
    pub uncategorised_count: usize,
    pub uncategorised_amount: Decimal,
    /// Categories suggested by the categoriser but not yet confirmed.
    pub unconfirmed_count: usize,
    /// Transactions nobody has reviewed.
    pub unreviewed_count: usize,
    /// Confirmed personal spending and transfers. Tracked, never totalled.
    pub excluded_count: usize,
    pub excluded_amount: Decimal,
    pub messages: Vec<String>,
}

impl Warnings {
    fn finish(mut self) -> Self {
        self.uncategorised_amount = round_money(self.uncategorised_amount);
        self.excluded_amount = round_money(self.excluded_amount);
        if self.uncategorised_count > 0 {
            self.messages.push(format!(
                "{} confirmed transaction(s) totalling {} have no reportable category",
                self.uncategorised_count, self.uncategorised_amount
            ));
        }
        if self.unconfirmed_count > 0 {
            self.messages.push(format!(
                "{} transaction(s) have suggested categories awaiting confirmation",
                self.unconfirmed_count
            ));
        }
        if self.unreviewed_count > 0 {
            self.messages.push(format!(
                "{} transaction(s) have not been reviewed",
                self.unreviewed_count
            ));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketTotals {
    pub income: Decimal,
    pub expenses: Decimal,
    pub net: Decimal,
}

impl BucketTotals {
    fn of(bucket: &ReportingBucket) -> Self {
        let income = bucket.total_income();
        let expenses = bucket.total_expenses();
        Self {
            income,
            expenses,
            net: income - expenses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateTotals {
    pub this_period: BucketTotals,
    pub cumulative: BucketTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub this_period: ReportingBucket,
    pub cumulative: ReportingBucket,
    pub totals: AggregateTotals,
    pub warnings: Warnings,
    pub previous_submission: Option<SubmissionRecord>,
}

pub struct Aggregator {
    transactions: Arc<dyn TransactionSource>,
    adjustments: Arc<dyn AdjustmentRepository>,
    ledger: Arc<dyn SubmissionLedger>,
}

impl Aggregator {
    pub fn new(
        transactions: Arc<dyn TransactionSource>,
        adjustments: Arc<dyn AdjustmentRepository>,
        ledger: Arc<dyn SubmissionLedger>,
    ) -> Self {
        Self {
            transactions,
            adjustments,
            ledger,
        }
    }

    pub async fn aggregate(&self, req: &AggregateRequest) -> MtdResult<AggregationResult> {
        req.validate()?;

        let year_start = req.tax_year.start();
        let mut this_period = ReportingBucket::new(req.period_start, req.period_end);
        let mut cumulative = ReportingBucket::new(year_start, req.period_end);
        let mut warnings = Warnings::default();

        let transactions = self
            .transactions
            .transactions_between(&req.user_id, req.business_type, year_start, req.period_end)
            .await?;

        for tx in &transactions {
            match tx.review_status {
                ReviewStatus::Suggested => {
                    warnings.unconfirmed_count += 1;
                    continue;
                }
                ReviewStatus::Pending => {
                    warnings.unreviewed_count += 1;
                    continue;
                }
                ReviewStatus::Confirmed => {}
            }

            match classify(tx.category_code.as_deref(), req.business_type) {
                Classification::Reportable(target) => {
                    cumulative.add_transaction(target, tx.amount, &tx.id);
                    if this_period.covers(tx.date) {
                        this_period.add_transaction(target, tx.amount, &tx.id);
                    }
                }
                Classification::Excluded => {
                    warnings.excluded_count += 1;
                    warnings.excluded_amount += tx.amount.abs();
                }
                Classification::Uncategorised => {
                    warnings.uncategorised_count += 1;
                    warnings.uncategorised_amount += tx.amount.abs();
                }
            }
        }

        let adjustments = self
            .adjustments
            .list_adjustments(
                &req.user_id,
                req.business_type,
                req.business_id.as_deref(),
                req.tax_year,
            )
            .await?;
        for adj in &adjustments {
            if cumulative.covers(adj.effective_date) {
                cumulative.apply_delta(adj.target_box, adj.amount);
            }
            if this_period.covers(adj.effective_date) {
                this_period.apply_delta(adj.target_box, adj.amount);
            }
        }

        // Cumulative summaries are filed year-to-date, so the ledger row for
        // this period starts at the tax year start.
        let filed_start = match req.tax_year.protocol() {
            SubmissionProtocol::Period => req.period_start,
            SubmissionProtocol::Cumulative => year_start,
        };
        let previous_submission = match &req.business_id {
            Some(business_id) => {
                self.ledger
                    .latest_for(
                        &req.user_id,
                        business_id,
                        req.tax_year,
                        filed_start,
                        req.period_end,
                    )
                    .await?
            }
            None => {
                self.ledger
                    .latest_for_business_type(
                        &req.user_id,
                        req.business_type,
                        req.tax_year,
                        filed_start,
                        req.period_end,
                    )
                    .await?
            }
        };

        debug!(
            user_id = %req.user_id,
            business_type = %req.business_type,
            tax_year = %req.tax_year,
            transactions = transactions.len(),
            adjustments = adjustments.len(),
            "aggregated period"
        );

        let this_period = this_period.rounded();
        let cumulative = cumulative.rounded();
        Ok(AggregationResult {
            totals: AggregateTotals {
                this_period: BucketTotals::of(&this_period),
                cumulative: BucketTotals::of(&cumulative),
            },
            this_period,
            cumulative,
            warnings: warnings.finish(),
            previous_submission,
        })
    }
}
