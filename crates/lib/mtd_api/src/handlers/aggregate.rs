//! Aggregation preview.

use axum::Json;
use axum::extract::{Query, State};
use chrono::NaiveDate;
use mtd_core::aggregate::{AggregateRequest, AggregationResult};
use mtd_core::models::BusinessType;
use mtd_core::payload::SubmissionPayload;
use mtd_core::tax_year::{SubmissionProtocol, TaxYear};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateParams {
    pub business_type: BusinessType,
    pub business_id: Option<String>,
    pub tax_year: TaxYear,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Propose a single consolidated expenses figure.
    #[serde(default)]
    pub consolidate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    #[serde(flatten)]
    pub result: AggregationResult,
    pub protocol: SubmissionProtocol,
    /// What would be filed for this period under the tax year's protocol.
    pub proposed_payload: SubmissionPayload,
}

/// `GET /mtd/aggregate`: bucket the period and propose a payload.
pub async fn aggregate_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(params): Query<AggregateParams>,
) -> AppResult<Json<AggregateResponse>> {
    let req = AggregateRequest {
        user_id: user.user_id().to_string(),
        business_type: params.business_type,
        business_id: params.business_id,
        tax_year: params.tax_year,
        period_start: params.period_start,
        period_end: params.period_end,
    };
    let result = state.aggregator.aggregate(&req).await?;

    let protocol = params.tax_year.protocol();
    let bucket = match protocol {
        SubmissionProtocol::Period => &result.this_period,
        SubmissionProtocol::Cumulative => &result.cumulative,
    };
    let proposed_payload = SubmissionPayload::from_bucket(bucket, params.consolidate);

    Ok(Json(AggregateResponse {
        result,
        protocol,
        proposed_payload,
    }))
}
