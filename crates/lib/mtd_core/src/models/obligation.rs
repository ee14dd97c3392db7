//! Filing obligations declared by HMRC.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObligationStatus {
    Open,
    Fulfilled,
}

/// One filing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obligation {
    pub period_key: String,
    /// Business id as reported by HMRC. Synthetic in the sandbox.
    pub business_id: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub due: NaiveDate,
    pub status: ObligationStatus,
    pub received: Option<NaiveDate>,
}
