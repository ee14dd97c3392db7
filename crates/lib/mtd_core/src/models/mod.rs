//! Domain models.
//!
//! Internal types shared across the pipeline. API-facing shapes live in
//! `mtd_api`; database row structs live next to their queries.

pub mod adjustment;
pub mod obligation;
pub mod submission;
pub mod token;
pub mod transaction;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::boxes::BusinessFamily;
use crate::error::MtdError;

pub use adjustment::{AdjustmentRecord, AdjustmentType, NewAdjustment};
pub use obligation::{Obligation, ObligationStatus};
pub use submission::{SubmissionRecord, SubmissionState};
pub use token::{AccessToken, OAuthTokenRecord};
pub use transaction::{CategorizedTransaction, ReviewStatus};

/// Kind of income source a submission reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusinessType {
    SelfEmployment,
    UkProperty,
    ForeignProperty,
}

impl BusinessType {
    pub const ALL: [BusinessType; 3] = [
        BusinessType::SelfEmployment,
        BusinessType::UkProperty,
        BusinessType::ForeignProperty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::SelfEmployment => "self-employment",
            BusinessType::UkProperty => "uk-property",
            BusinessType::ForeignProperty => "foreign-property",
        }
    }

    pub fn family(&self) -> BusinessFamily {
        match self {
            BusinessType::SelfEmployment => BusinessFamily::SelfEmployment,
            BusinessType::UkProperty | BusinessType::ForeignProperty => BusinessFamily::Property,
        }
    }
}

impl fmt::Display for BusinessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusinessType {
    type Err = MtdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MtdError::Validation(format!("Unknown business type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_type_serde_matches_as_str() {
        for t in BusinessType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().into()));
            assert_eq!(t.as_str().parse::<BusinessType>().unwrap(), t);
        }
    }
}
