//! Manual adjustment CRUD.

use axum::Json;
use axum::extract::{Path, Query, State};
use mtd_core::models::{AdjustmentRecord, BusinessType, NewAdjustment};
use mtd_core::tax_year::TaxYear;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentListParams {
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub business_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustmentListResponse {
    pub adjustments: Vec<AdjustmentRecord>,
}

/// `GET /mtd/adjustments`: adjustments for a tax year.
pub async fn list_adjustments_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(params): Query<AdjustmentListParams>,
) -> AppResult<Json<AdjustmentListResponse>> {
    let adjustments = state
        .adjustments
        .list_adjustments(
            user.user_id(),
            params.business_type,
            params.business_id.as_deref(),
            params.tax_year,
        )
        .await?;
    Ok(Json(AdjustmentListResponse { adjustments }))
}

/// `POST /mtd/adjustments`: create an adjustment.
pub async fn create_adjustment_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<NewAdjustment>,
) -> AppResult<Json<AdjustmentRecord>> {
    body.validate()?;
    let record = state
        .adjustments
        .insert_adjustment(user.user_id(), &body)
        .await?;
    info!(
        adjustment_id = %record.id,
        business_id = %record.business_id,
        tax_year = %record.tax_year,
        target_box = %record.target_box,
        "adjustment created"
    );
    Ok(Json(record))
}

/// `PUT /mtd/adjustments/{id}`: replace an adjustment.
pub async fn update_adjustment_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<NewAdjustment>,
) -> AppResult<Json<AdjustmentRecord>> {
    body.validate()?;
    state
        .adjustments
        .update_adjustment(user.user_id(), id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Adjustment {id} not found")))
}

/// `DELETE /mtd/adjustments/{id}`: remove an adjustment.
pub async fn delete_adjustment_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !state.adjustments.delete_adjustment(user.user_id(), id).await? {
        return Err(AppError::NotFound(format!("Adjustment {id} not found")));
    }
    Ok(Json(serde_json::json!({"success": true})))
}
