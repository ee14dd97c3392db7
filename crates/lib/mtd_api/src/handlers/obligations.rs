//! Obligations lookup.

use axum::Json;
use axum::extract::{Query, State};
use chrono::NaiveDate;
use mtd_core::hmrc::obligations::ObligationQuery;
use mtd_core::models::{BusinessType, Obligation};
use serde::{Deserialize, Serialize};

use super::fraud::FraudSignals;
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationParams {
    pub nino: String,
    pub business_type: Option<BusinessType>,
    pub business_id: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ObligationListResponse {
    pub obligations: Vec<Obligation>,
}

/// `GET /mtd/obligations`: income and expenditure obligations, oldest first.
pub async fn list_obligations_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    signals: FraudSignals,
    Query(params): Query<ObligationParams>,
) -> AppResult<Json<ObligationListResponse>> {
    let ctx = signals.context(user.user_id());
    let query = ObligationQuery {
        business_type: params.business_type,
        business_id: params.business_id,
        from: params.from_date,
        to: params.to_date,
    };
    let obligations = state
        .submissions
        .obligations(user.user_id(), &params.nino, &query, &signals.client, &ctx)
        .await?;
    Ok(Json(ObligationListResponse { obligations }))
}
