//! Categorised transactions, read from the transaction subsystem.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Review state of a transaction's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Category confirmed by the user; counts towards totals.
    Confirmed,
    /// Category proposed by the categoriser, not yet confirmed.
    Suggested,
    /// Never reviewed.
    Pending,
}

impl ReviewStatus {
    /// Parse the upstream status column. Unknown values read as `Pending`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "confirmed" => ReviewStatus::Confirmed,
            "suggested" | "ai_suggested" => ReviewStatus::Suggested,
            _ => ReviewStatus::Pending,
        }
    }
}

/// A transaction with its (possibly missing) category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedTransaction {
    pub id: String,
    pub date: NaiveDate,
    /// Signed: money in is positive, money out negative.
    pub amount: Decimal,
    pub category_code: Option<String>,
    pub review_status: ReviewStatus,
}
