//! Request paths and bodies per business type and protocol.

use serde_json::{Map, Value, json};

use super::SummaryTarget;
use crate::models::BusinessType;
use crate::payload::SubmissionPayload;
use crate::tax_year::SubmissionProtocol;

fn base_path(target: &SummaryTarget<'_>) -> String {
    let segment = match target.business_type {
        BusinessType::SelfEmployment => "self-employment",
        BusinessType::UkProperty => "property/uk",
        BusinessType::ForeignProperty => "property/foreign",
    };
    format!(
        "/individuals/business/{segment}/{}/{}",
        target.nino, target.business_id
    )
}

/// Period-summary create endpoint.
pub fn period_path(target: &SummaryTarget<'_>) -> String {
    match target.business_type {
        BusinessType::SelfEmployment => format!("{}/period", base_path(target)),
        BusinessType::UkProperty | BusinessType::ForeignProperty => {
            format!("{}/period/{}", base_path(target), target.tax_year)
        }
    }
}

/// Cumulative-summary create/amend/retrieve endpoint.
pub fn cumulative_path(target: &SummaryTarget<'_>) -> String {
    format!("{}/cumulative/{}", base_path(target), target.tax_year)
}

fn number(amount: rust_decimal::Decimal) -> Value {
    serde_json::to_value(amount).unwrap_or(Value::Null)
}

fn expenses_object(payload: &SubmissionPayload, consolidated_key: &str) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(total) = payload.expenses.consolidated_expenses {
        out.insert(consolidated_key.to_string(), number(total));
    }
    for (b, amount) in &payload.expenses.itemised {
        out.insert(b.key().to_string(), number(*amount));
    }
    out
}

/// Build the HMRC request body.
///
/// Self-employment uses `periodDates`/`periodIncome`/`periodExpenses` for
/// both protocols. Property bodies nest under `ukNonFhlProperty` /
/// `foreignNonFhlProperty` for period summaries and `ukProperty` /
/// `foreignProperty` for cumulative ones.
pub fn render(
    payload: &SubmissionPayload,
    business_type: BusinessType,
    protocol: SubmissionProtocol,
) -> Value {
    match business_type {
        BusinessType::SelfEmployment => {
            let mut income = Map::new();
            income.insert("turnover".into(), number(payload.incomes.turnover));
            income.insert("other".into(), number(payload.incomes.other));
            json!({
                "periodDates": {
                    "periodStartDate": payload.period_start,
                    "periodEndDate": payload.period_end,
                },
                "periodIncome": income,
                "periodExpenses": expenses_object(payload, "consolidatedExpenses"),
            })
        }
        BusinessType::UkProperty => {
            let key = match protocol {
                SubmissionProtocol::Period => "ukNonFhlProperty",
                SubmissionProtocol::Cumulative => "ukProperty",
            };
            json!({
                "fromDate": payload.period_start,
                "toDate": payload.period_end,
                key: {
                    "income": {
                        "periodAmount": number(payload.incomes.turnover),
                        "otherIncome": number(payload.incomes.other),
                    },
                    "expenses": expenses_object(payload, "consolidatedExpenses"),
                },
            })
        }
        BusinessType::ForeignProperty => {
            let key = match protocol {
                SubmissionProtocol::Period => "foreignNonFhlProperty",
                SubmissionProtocol::Cumulative => "foreignProperty",
            };
            json!({
                "fromDate": payload.period_start,
                "toDate": payload.period_end,
                key: [{
                    "countryCode": payload.country_code,
                    "income": {
                        "rentIncome": { "rentAmount": number(payload.incomes.turnover) },
                        "otherPropertyIncome": number(payload.incomes.other),
                    },
                    "expenses": expenses_object(payload, "consolidatedExpense"),
                }],
            })
        }
    }
}
