//! Submission payloads and the checks run on them before any network call.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::{ReportingBucket, round_money};
use crate::boxes::{BoxRef, ExpenseBox, IncomeBox};
use crate::error::{MtdError, MtdResult};
use crate::models::BusinessType;
use crate::tax_year::{SubmissionProtocol, TaxYear};

/// Largest amount HMRC accepts in a single box.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_316_134_911, 2_328, 0, false, 2);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incomes {
    #[serde(default)]
    pub turnover: Decimal,
    #[serde(default)]
    pub other: Decimal,
}

/// Either one consolidated figure or itemised boxes, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expenses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_expenses: Option<Decimal>,
    #[serde(flatten)]
    pub itemised: BTreeMap<ExpenseBox, Decimal>,
}

impl Expenses {
    pub fn is_consolidated(&self) -> bool {
        self.consolidated_expenses.is_some()
    }
}

/// Figures for one period as the caller wants them filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default)]
    pub incomes: Incomes,
    #[serde(default)]
    pub expenses: Expenses,
    /// ISO 3166 alpha-3; foreign property only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

impl SubmissionPayload {
    /// Build from an aggregated bucket. Zero boxes are left out.
    pub fn from_bucket(bucket: &ReportingBucket, consolidate: bool) -> Self {
        let expenses = if consolidate {
            Expenses {
                consolidated_expenses: Some(round_money(bucket.total_expenses())),
                itemised: BTreeMap::new(),
            }
        } else {
            Expenses {
                consolidated_expenses: None,
                itemised: bucket
                    .expense_totals
                    .iter()
                    .filter(|(_, v)| !v.is_zero())
                    .map(|(k, v)| (*k, round_money(*v)))
                    .collect(),
            }
        };
        Self {
            period_start: bucket.period_start,
            period_end: bucket.period_end,
            incomes: Incomes {
                turnover: round_money(bucket.total(BoxRef::Income(IncomeBox::Turnover))),
                other: round_money(bucket.total(BoxRef::Income(IncomeBox::Other))),
            },
            expenses,
            country_code: None,
        }
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    /// Reject anything HMRC would reject for shape reasons.
    pub fn validate(
        &self,
        business_type: BusinessType,
        tax_year: TaxYear,
        protocol: SubmissionProtocol,
    ) -> MtdResult<()> {
        if self.expenses.is_consolidated() && !self.expenses.itemised.is_empty() {
            let boxes: Vec<&str> = self.expenses.itemised.keys().map(|b| b.key()).collect();
            return Err(MtdError::Validation(format!(
                "consolidatedExpenses cannot be combined with itemised expenses ({})",
                boxes.join(", ")
            )));
        }

        if self.period_start > self.period_end {
            return Err(MtdError::Validation(format!(
                "Period start {} is after period end {}",
                self.period_start, self.period_end
            )));
        }
        if !tax_year.contains(self.period_start) || !tax_year.contains(self.period_end) {
            return Err(MtdError::Validation(format!(
                "Period {}..{} is outside tax year {tax_year}",
                self.period_start, self.period_end
            )));
        }
        if protocol == SubmissionProtocol::Cumulative && self.period_start != tax_year.start() {
            return Err(MtdError::Validation(format!(
                "Cumulative summaries must start on {}",
                tax_year.start()
            )));
        }

        if let Some(b) = self
            .expenses
            .itemised
            .keys()
            .find(|b| !b.applies_to(business_type))
        {
            return Err(MtdError::Validation(format!(
                "Expense box '{}' is not reported for {business_type}",
                b.key()
            )));
        }

        match (business_type, &self.country_code) {
            (BusinessType::ForeignProperty, Some(code))
                if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) => {}
            (BusinessType::ForeignProperty, _) => {
                return Err(MtdError::Validation(
                    "Foreign property submissions need a three-letter country code".into(),
                ));
            }
            (_, Some(_)) => {
                return Err(MtdError::Validation(format!(
                    "Country code is only accepted for foreign property, not {business_type}"
                )));
            }
            (_, None) => {}
        }

        if self.incomes.turnover.is_sign_negative() || self.incomes.other.is_sign_negative() {
            return Err(MtdError::Validation("Income amounts cannot be negative".into()));
        }

        let amounts = [self.incomes.turnover, self.incomes.other]
            .into_iter()
            .chain(self.expenses.consolidated_expenses)
            .chain(self.expenses.itemised.values().copied());
        for amount in amounts {
            if amount.scale() > 2 && amount != amount.round_dp(2) {
                return Err(MtdError::Validation(format!(
                    "Amount {amount} has more than two decimal places"
                )));
            }
            if amount.abs() > MAX_AMOUNT {
                return Err(MtdError::Validation(format!(
                    "Amount {amount} exceeds the largest accepted value"
                )));
            }
        }

        Ok(())
    }
}
