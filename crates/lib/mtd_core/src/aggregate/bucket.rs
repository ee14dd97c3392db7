//! Box totals over one date range.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};

use crate::boxes::{BoxRef, ExpenseBox, IncomeBox};

/// Income and expense totals per box for `[period_start, period_end]`,
/// with the transactions that fed each box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingBucket {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub income_totals: BTreeMap<IncomeBox, Decimal>,
    pub expense_totals: BTreeMap<ExpenseBox, Decimal>,
    #[serde(serialize_with = "serialize_refs")]
    pub transaction_refs_by_box: BTreeMap<BoxRef, Vec<String>>,
}

/// Round to pence, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn serialize_refs<S: Serializer>(
    refs: &BTreeMap<BoxRef, Vec<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(refs.iter().map(|(k, v)| (k.to_string(), v)))
}

impl ReportingBucket {
    pub fn new(period_start: NaiveDate, period_end: NaiveDate) -> Self {
        Self {
            period_start,
            period_end,
            income_totals: BTreeMap::new(),
            expense_totals: BTreeMap::new(),
            transaction_refs_by_box: BTreeMap::new(),
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }

    /// Add a transaction's absolute amount to its box.
    pub fn add_transaction(&mut self, target: BoxRef, amount: Decimal, transaction_id: &str) {
        self.apply_delta(target, amount.abs());
        self.transaction_refs_by_box
            .entry(target)
            .or_default()
            .push(transaction_id.to_string());
    }

    /// Add a signed delta to a box.
    pub fn apply_delta(&mut self, target: BoxRef, delta: Decimal) {
        let slot = match target {
            BoxRef::Income(b) => self.income_totals.entry(b).or_default(),
            BoxRef::Expense(b) => self.expense_totals.entry(b).or_default(),
        };
        *slot += delta;
    }

    pub fn total(&self, target: BoxRef) -> Decimal {
        match target {
            BoxRef::Income(b) => self.income_totals.get(&b).copied(),
            BoxRef::Expense(b) => self.expense_totals.get(&b).copied(),
        }
        .unwrap_or_default()
    }

    pub fn total_income(&self) -> Decimal {
        self.income_totals.values().copied().sum()
    }

    pub fn total_expenses(&self) -> Decimal {
        self.expense_totals.values().copied().sum()
    }

    /// Every box total rounded to pence.
    pub fn rounded(mut self) -> Self {
        for v in self.income_totals.values_mut() {
            *v = round_money(*v);
        }
        for v in self.expense_totals.values_mut() {
            *v = round_money(*v);
        }
        self
    }
}
