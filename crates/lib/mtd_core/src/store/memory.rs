//! In-process storage for tests and local tooling.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AdjustmentRepository, SubmissionLedger, TokenRepository, TransactionSource};
use crate::error::MtdResult;
use crate::models::{
    AdjustmentRecord, BusinessType, CategorizedTransaction, NewAdjustment, OAuthTokenRecord,
    SubmissionRecord,
};
use crate::tax_year::{SubmissionProtocol, TaxYear};

#[derive(Debug, Clone)]
struct StoredTransaction {
    user_id: String,
    business_type: BusinessType,
    transaction: CategorizedTransaction,
}

/// Implements every storage trait over plain collections. Ledger rows are
/// only ever appended.
#[derive(Default)]
pub struct MemoryStore {
    tokens: DashMap<String, OAuthTokenRecord>,
    token_writes: AtomicUsize,
    transactions: RwLock<Vec<StoredTransaction>>,
    adjustments: RwLock<Vec<AdjustmentRecord>>,
    submissions: RwLock<Vec<SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_transaction(
        &self,
        user_id: &str,
        business_type: BusinessType,
        transaction: CategorizedTransaction,
    ) {
        self.transactions.write().await.push(StoredTransaction {
            user_id: user_id.to_string(),
            business_type,
            transaction,
        });
    }

    /// Number of `save_token` calls so far.
    pub fn token_writes(&self) -> usize {
        self.token_writes.load(Ordering::SeqCst)
    }

    /// Every ledger row in append order.
    pub async fn submissions(&self) -> Vec<SubmissionRecord> {
        self.submissions.read().await.clone()
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn load_token(&self, user_id: &str) -> MtdResult<Option<OAuthTokenRecord>> {
        Ok(self.tokens.get(user_id).map(|r| r.value().clone()))
    }

    async fn save_token(&self, user_id: &str, record: &OAuthTokenRecord) -> MtdResult<()> {
        self.token_writes.fetch_add(1, Ordering::SeqCst);
        self.tokens.insert(user_id.to_string(), record.clone());
        Ok(())
    }

    async fn delete_token(&self, user_id: &str) -> MtdResult<bool> {
        Ok(self.tokens.remove(user_id).is_some())
    }
}

#[async_trait]
impl TransactionSource for MemoryStore {
    async fn transactions_between(
        &self,
        user_id: &str,
        business_type: BusinessType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> MtdResult<Vec<CategorizedTransaction>> {
        let mut out: Vec<CategorizedTransaction> = self
            .transactions
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id && s.business_type == business_type)
            .filter(|s| s.transaction.date >= from && s.transaction.date <= to)
            .map(|s| s.transaction.clone())
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[async_trait]
impl AdjustmentRepository for MemoryStore {
    async fn list_adjustments(
        &self,
        user_id: &str,
        business_type: BusinessType,
        business_id: Option<&str>,
        tax_year: TaxYear,
    ) -> MtdResult<Vec<AdjustmentRecord>> {
        let mut out: Vec<AdjustmentRecord> = self
            .adjustments
            .read()
            .await
            .iter()
            .filter(|a| {
                a.user_id == user_id
                    && a.business_type == business_type
                    && a.tax_year == tax_year
                    && business_id.is_none_or(|id| a.business_id == id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.effective_date
                .cmp(&b.effective_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    async fn insert_adjustment(
        &self,
        user_id: &str,
        adjustment: &NewAdjustment,
    ) -> MtdResult<AdjustmentRecord> {
        let now = Utc::now();
        let record = AdjustmentRecord {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            business_id: adjustment.business_id.clone(),
            business_type: adjustment.business_type,
            tax_year: adjustment.tax_year,
            target_box: adjustment.target_box,
            amount: adjustment.amount,
            description: adjustment.description.clone(),
            adjustment_type: adjustment.adjustment_type,
            effective_date: adjustment.effective_date,
            created_at: now,
            updated_at: now,
        };
        self.adjustments.write().await.push(record.clone());
        Ok(record)
    }

    async fn update_adjustment(
        &self,
        user_id: &str,
        id: Uuid,
        adjustment: &NewAdjustment,
    ) -> MtdResult<Option<AdjustmentRecord>> {
        let mut guard = self.adjustments.write().await;
        let Some(existing) = guard
            .iter_mut()
            .find(|a| a.id == id && a.user_id == user_id)
        else {
            return Ok(None);
        };
        existing.business_id = adjustment.business_id.clone();
        existing.business_type = adjustment.business_type;
        existing.tax_year = adjustment.tax_year;
        existing.target_box = adjustment.target_box;
        existing.amount = adjustment.amount;
        existing.description = adjustment.description.clone();
        existing.adjustment_type = adjustment.adjustment_type;
        existing.effective_date = adjustment.effective_date;
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_adjustment(&self, user_id: &str, id: Uuid) -> MtdResult<bool> {
        let mut guard = self.adjustments.write().await;
        let before = guard.len();
        guard.retain(|a| !(a.id == id && a.user_id == user_id));
        Ok(guard.len() != before)
    }
}

#[async_trait]
impl SubmissionLedger for MemoryStore {
    async fn record(&self, record: &SubmissionRecord) -> MtdResult<()> {
        self.submissions.write().await.push(record.clone());
        Ok(())
    }

    async fn latest_for(
        &self,
        user_id: &str,
        business_id: &str,
        tax_year: TaxYear,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> MtdResult<Option<SubmissionRecord>> {
        Ok(self
            .submissions
            .read()
            .await
            .iter()
            .rev()
            .find(|r| {
                r.user_id == user_id
                    && r.business_id == business_id
                    && r.tax_year == tax_year
                    && r.period_start == period_start
                    && r.period_end == period_end
            })
            .cloned())
    }

    async fn latest_for_tax_year(
        &self,
        user_id: &str,
        business_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionProtocol,
    ) -> MtdResult<Option<SubmissionRecord>> {
        Ok(self
            .submissions
            .read()
            .await
            .iter()
            .rev()
            .find(|r| {
                r.user_id == user_id
                    && r.business_id == business_id
                    && r.tax_year == tax_year
                    && r.submission_type == submission_type
            })
            .cloned())
    }

    async fn latest_for_business_type(
        &self,
        user_id: &str,
        business_type: BusinessType,
        tax_year: TaxYear,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> MtdResult<Option<SubmissionRecord>> {
        Ok(self
            .submissions
            .read()
            .await
            .iter()
            .rev()
            .find(|r| {
                r.user_id == user_id
                    && r.business_type == business_type
                    && r.tax_year == tax_year
                    && r.period_start == period_start
                    && r.period_end == period_end
            })
            .cloned())
    }
}
