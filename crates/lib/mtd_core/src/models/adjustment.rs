//! User-authored corrections layered onto aggregated totals.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::boxes::BoxRef;
use crate::error::MtdError;
use crate::models::BusinessType;
use crate::tax_year::TaxYear;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdjustmentType {
    Correction,
    Accrual,
    Prepayment,
    PrivateUse,
    Other,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Correction => "correction",
            AdjustmentType::Accrual => "accrual",
            AdjustmentType::Prepayment => "prepayment",
            AdjustmentType::PrivateUse => "private-use",
            AdjustmentType::Other => "other",
        }
    }

    pub fn from_db(s: &str) -> Result<Self, MtdError> {
        match s {
            "correction" => Ok(AdjustmentType::Correction),
            "accrual" => Ok(AdjustmentType::Accrual),
            "prepayment" => Ok(AdjustmentType::Prepayment),
            "private-use" => Ok(AdjustmentType::PrivateUse),
            "other" => Ok(AdjustmentType::Other),
            other => Err(MtdError::Internal(format!("unknown adjustment type '{other}'"))),
        }
    }
}

/// A stored adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub target_box: BoxRef,
    /// Signed delta applied to the target box.
    pub amount: Decimal,
    pub description: String,
    #[serde(rename = "type")]
    pub adjustment_type: AdjustmentType,
    /// The delta counts in any bucket whose range covers this date.
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller input for creating or replacing an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdjustment {
    pub business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub target_box: BoxRef,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub adjustment_type: AdjustmentType,
    pub effective_date: NaiveDate,
}

impl NewAdjustment {
    pub fn validate(&self) -> Result<(), MtdError> {
        if self.business_id.trim().is_empty() {
            return Err(MtdError::Validation("businessId is required".into()));
        }
        if self.amount.is_zero() {
            return Err(MtdError::Validation("Adjustment amount must be non-zero".into()));
        }
        if !self.target_box.applies_to(self.business_type) {
            return Err(MtdError::Validation(format!(
                "Box {} is not reported for {}",
                self.target_box.key(),
                self.business_type
            )));
        }
        if !self.tax_year.contains(self.effective_date) {
            return Err(MtdError::Validation(format!(
                "Effective date {} is outside tax year {}",
                self.effective_date, self.tax_year
            )));
        }
        Ok(())
    }
}
