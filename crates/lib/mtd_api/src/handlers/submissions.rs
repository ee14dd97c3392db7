//! Submission endpoints.

use axum::Json;
use axum::extract::{Query, State};
use chrono::NaiveDate;
use mtd_core::models::{BusinessType, SubmissionRecord};
use mtd_core::payload::SubmissionPayload;
use mtd_core::submission::{SubmissionOutcome, SubmissionRequest};
use mtd_core::tax_year::TaxYear;
use serde::{Deserialize, Serialize};

use super::fraud::FraudSignals;
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub nino: String,
    pub business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub payload: SubmissionPayload,
}

impl SubmitBody {
    fn into_request(self, user: &AuthenticatedUser) -> SubmissionRequest {
        SubmissionRequest {
            user_id: user.user_id().to_string(),
            nino: self.nino,
            business_id: self.business_id,
            business_type: self.business_type,
            tax_year: self.tax_year,
            payload: self.payload,
        }
    }
}

/// `POST /mtd/submissions/period`: file a period summary (before 2025-26).
pub async fn submit_period_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    signals: FraudSignals,
    Json(body): Json<SubmitBody>,
) -> AppResult<Json<SubmissionOutcome>> {
    let ctx = signals.context(user.user_id());
    let outcome = state
        .submissions
        .submit_period(body.into_request(&user), &signals.client, &ctx)
        .await?;
    Ok(Json(outcome))
}

/// `POST /mtd/submissions/cumulative`: create or amend the year-to-date summary.
pub async fn submit_cumulative_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    signals: FraudSignals,
    Json(body): Json<SubmitBody>,
) -> AppResult<Json<SubmissionOutcome>> {
    let ctx = signals.context(user.user_id());
    let outcome = state
        .submissions
        .submit_cumulative(body.into_request(&user), &signals.client, &ctx)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestParams {
    pub business_id: String,
    pub tax_year: TaxYear,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub submission: Option<SubmissionRecord>,
}

/// `GET /mtd/submissions/latest`: most recent ledger row for a period.
pub async fn latest_submission_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(params): Query<LatestParams>,
) -> AppResult<Json<LatestResponse>> {
    let submission = state
        .submissions
        .ledger()
        .latest_for(
            user.user_id(),
            &params.business_id,
            params.tax_year,
            params.period_start,
            params.period_end,
        )
        .await?;
    Ok(Json(LatestResponse { submission }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCumulativeParams {
    pub nino: String,
    pub business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
}

#[derive(Debug, Serialize)]
pub struct RemoteCumulativeResponse {
    pub summary: Option<serde_json::Value>,
}

/// `GET /mtd/submissions/cumulative/remote`: what HMRC currently holds.
pub async fn remote_cumulative_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    signals: FraudSignals,
    Query(params): Query<RemoteCumulativeParams>,
) -> AppResult<Json<RemoteCumulativeResponse>> {
    let ctx = signals.context(user.user_id());
    let summary = state
        .submissions
        .remote_cumulative(
            user.user_id(),
            &params.nino,
            params.business_type,
            &params.business_id,
            params.tax_year,
            &signals.client,
            &ctx,
        )
        .await?;
    Ok(Json(RemoteCumulativeResponse { summary }))
}
