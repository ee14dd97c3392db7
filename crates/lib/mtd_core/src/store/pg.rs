//! PostgreSQL-backed storage.
//!
//! Raw SQLx queries over `mtd_oauth_tokens`, `mtd_adjustments`,
//! `mtd_submissions` and the upstream `transactions` table.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AdjustmentRepository, SubmissionLedger, TokenRepository, TransactionSource};
use crate::boxes::BoxRef;
use crate::error::{MtdError, MtdResult};
use crate::models::{
    AdjustmentRecord, AdjustmentType, BusinessType, CategorizedTransaction, NewAdjustment,
    OAuthTokenRecord, ReviewStatus, SubmissionRecord,
};
use crate::secrets;
use crate::tax_year::{SubmissionProtocol, TaxYear};

/// Storage over a shared connection pool. Tokens are encrypted with
/// `encryption_key` before they reach the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    encryption_key: String,
}

impl PgStore {
    pub fn new(pool: PgPool, encryption_key: impl Into<String>) -> Self {
        Self {
            pool,
            encryption_key: encryption_key.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row structs
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    access_token_encrypted: String,
    refresh_token_encrypted: String,
    expires_at: DateTime<Utc>,
    token_type: String,
    scope: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    date: NaiveDate,
    amount: Decimal,
    category: Option<String>,
    review_status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: Uuid,
    user_id: String,
    business_id: String,
    business_type: String,
    tax_year: String,
    target_box_kind: String,
    target_box_key: String,
    amount: Decimal,
    description: String,
    adjustment_type: String,
    effective_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AdjustmentRow> for AdjustmentRecord {
    type Error = MtdError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        Ok(AdjustmentRecord {
            id: row.id,
            user_id: row.user_id,
            business_id: row.business_id,
            business_type: row.business_type.parse()?,
            tax_year: row.tax_year.parse()?,
            target_box: BoxRef::from_parts(&row.target_box_kind, &row.target_box_key)?,
            amount: row.amount,
            description: row.description,
            adjustment_type: AdjustmentType::from_db(&row.adjustment_type)?,
            effective_date: row.effective_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    user_id: String,
    business_id: String,
    remote_business_id: String,
    business_type: String,
    tax_year: String,
    submission_type: String,
    period_start: NaiveDate,
    period_end: NaiveDate,
    payload: serde_json::Value,
    submitted_at: DateTime<Utc>,
    remote_submission_id: Option<String>,
}

impl TryFrom<SubmissionRow> for SubmissionRecord {
    type Error = MtdError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let submission_type = match row.submission_type.as_str() {
            "period" => SubmissionProtocol::Period,
            "cumulative" => SubmissionProtocol::Cumulative,
            other => {
                return Err(MtdError::Internal(format!("unknown submission type '{other}'")));
            }
        };
        Ok(SubmissionRecord {
            id: row.id,
            user_id: row.user_id,
            business_id: row.business_id,
            remote_business_id: row.remote_business_id,
            business_type: row.business_type.parse()?,
            tax_year: row.tax_year.parse()?,
            submission_type,
            period_start: row.period_start,
            period_end: row.period_end,
            payload: row.payload,
            submitted_at: row.submitted_at,
            remote_submission_id: row.remote_submission_id,
        })
    }
}

const ADJUSTMENT_COLUMNS: &str = "id, user_id, business_id, business_type, tax_year, \
     target_box_kind, target_box_key, amount, description, adjustment_type, \
     effective_date, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "id, user_id, business_id, remote_business_id, business_type, \
     tax_year, submission_type, period_start, period_end, payload, submitted_at, \
     remote_submission_id";

// =============================================================================
// Tokens
// =============================================================================

#[async_trait]
impl TokenRepository for PgStore {
    async fn load_token(&self, user_id: &str) -> MtdResult<Option<OAuthTokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT access_token_encrypted, refresh_token_encrypted, expires_at, token_type, scope
            FROM mtd_oauth_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(OAuthTokenRecord {
                access_token: secrets::decrypt(&r.access_token_encrypted, &self.encryption_key)?,
                refresh_token: secrets::decrypt(&r.refresh_token_encrypted, &self.encryption_key)?,
                expires_at: r.expires_at,
                token_type: r.token_type,
                scope: r.scope,
            })
        })
        .transpose()
    }

    async fn save_token(&self, user_id: &str, record: &OAuthTokenRecord) -> MtdResult<()> {
        let access = secrets::encrypt(&record.access_token, &self.encryption_key)?;
        let refresh = secrets::encrypt(&record.refresh_token, &self.encryption_key)?;

        sqlx::query(
            r#"
            INSERT INTO mtd_oauth_tokens
                (user_id, access_token_encrypted, refresh_token_encrypted, expires_at, token_type, scope)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id)
            DO UPDATE SET access_token_encrypted = EXCLUDED.access_token_encrypted,
                          refresh_token_encrypted = EXCLUDED.refresh_token_encrypted,
                          expires_at = EXCLUDED.expires_at,
                          token_type = EXCLUDED.token_type,
                          scope = EXCLUDED.scope,
                          updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(access)
        .bind(refresh)
        .bind(record.expires_at)
        .bind(&record.token_type)
        .bind(&record.scope)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_token(&self, user_id: &str) -> MtdResult<bool> {
        let result = sqlx::query("DELETE FROM mtd_oauth_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Transactions
// =============================================================================

#[async_trait]
impl TransactionSource for PgStore {
    async fn transactions_between(
        &self,
        user_id: &str,
        business_type: BusinessType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> MtdResult<Vec<CategorizedTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, date, amount, category, review_status
            FROM transactions
            WHERE user_id = $1 AND business_type = $2 AND date BETWEEN $3 AND $4
            ORDER BY date, id
            "#,
        )
        .bind(user_id)
        .bind(business_type.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CategorizedTransaction {
                id: r.id.to_string(),
                date: r.date,
                amount: r.amount,
                category_code: r.category,
                review_status: ReviewStatus::from_db(&r.review_status),
            })
            .collect())
    }
}

// =============================================================================
// Adjustments
// =============================================================================

#[async_trait]
impl AdjustmentRepository for PgStore {
    async fn list_adjustments(
        &self,
        user_id: &str,
        business_type: BusinessType,
        business_id: Option<&str>,
        tax_year: TaxYear,
    ) -> MtdResult<Vec<AdjustmentRecord>> {
        let sql = format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM mtd_adjustments \
             WHERE user_id = $1 AND business_type = $2 AND tax_year = $3 \
               AND ($4::text IS NULL OR business_id = $4) \
             ORDER BY effective_date, created_at"
        );
        let rows = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(user_id)
            .bind(business_type.as_str())
            .bind(tax_year.to_string())
            .bind(business_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AdjustmentRecord::try_from).collect()
    }

    async fn insert_adjustment(
        &self,
        user_id: &str,
        adjustment: &NewAdjustment,
    ) -> MtdResult<AdjustmentRecord> {
        let sql = format!(
            "INSERT INTO mtd_adjustments \
                 (id, user_id, business_id, business_type, tax_year, target_box_kind, \
                  target_box_key, amount, description, adjustment_type, effective_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {ADJUSTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(&adjustment.business_id)
            .bind(adjustment.business_type.as_str())
            .bind(adjustment.tax_year.to_string())
            .bind(adjustment.target_box.kind())
            .bind(adjustment.target_box.key())
            .bind(adjustment.amount)
            .bind(&adjustment.description)
            .bind(adjustment.adjustment_type.as_str())
            .bind(adjustment.effective_date)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_adjustment(
        &self,
        user_id: &str,
        id: Uuid,
        adjustment: &NewAdjustment,
    ) -> MtdResult<Option<AdjustmentRecord>> {
        let sql = format!(
            "UPDATE mtd_adjustments \
             SET business_id = $3, business_type = $4, tax_year = $5, target_box_kind = $6, \
                 target_box_key = $7, amount = $8, description = $9, adjustment_type = $10, \
                 effective_date = $11, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {ADJUSTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(&adjustment.business_id)
            .bind(adjustment.business_type.as_str())
            .bind(adjustment.tax_year.to_string())
            .bind(adjustment.target_box.kind())
            .bind(adjustment.target_box.key())
            .bind(adjustment.amount)
            .bind(&adjustment.description)
            .bind(adjustment.adjustment_type.as_str())
            .bind(adjustment.effective_date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AdjustmentRecord::try_from).transpose()
    }

    async fn delete_adjustment(&self, user_id: &str, id: Uuid) -> MtdResult<bool> {
        let result = sqlx::query("DELETE FROM mtd_adjustments WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[async_trait]
impl SubmissionLedger for PgStore {
    async fn record(&self, record: &SubmissionRecord) -> MtdResult<()> {
        sqlx::query(
            r#"
            INSERT INTO mtd_submissions
                (id, user_id, business_id, remote_business_id, business_type, tax_year,
                 submission_type, period_start, period_end, payload, submitted_at,
                 remote_submission_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.business_id)
        .bind(&record.remote_business_id)
        .bind(record.business_type.as_str())
        .bind(record.tax_year.to_string())
        .bind(record.submission_type.as_str())
        .bind(record.period_start)
        .bind(record.period_end)
        .bind(&record.payload)
        .bind(record.submitted_at)
        .bind(&record.remote_submission_id)
        .execute(&self.pool)
        .await?;
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
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM mtd_submissions \
             WHERE user_id = $1 AND business_id = $2 AND tax_year = $3 \
               AND period_start = $4 AND period_end = $5 \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(user_id)
            .bind(business_id)
            .bind(tax_year.to_string())
            .bind(period_start)
            .bind(period_end)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubmissionRecord::try_from).transpose()
    }

    async fn latest_for_tax_year(
        &self,
        user_id: &str,
        business_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionProtocol,
    ) -> MtdResult<Option<SubmissionRecord>> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM mtd_submissions \
             WHERE user_id = $1 AND business_id = $2 AND tax_year = $3 AND submission_type = $4 \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(user_id)
            .bind(business_id)
            .bind(tax_year.to_string())
            .bind(submission_type.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubmissionRecord::try_from).transpose()
    }

    async fn latest_for_business_type(
        &self,
        user_id: &str,
        business_type: BusinessType,
        tax_year: TaxYear,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> MtdResult<Option<SubmissionRecord>> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM mtd_submissions \
             WHERE user_id = $1 AND business_type = $2 AND tax_year = $3 \
               AND period_start = $4 AND period_end = $5 \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(user_id)
            .bind(business_type.as_str())
            .bind(tax_year.to_string())
            .bind(period_start)
            .bind(period_end)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubmissionRecord::try_from).transpose()
    }
}
