//! HMRC connection (OAuth authorization code flow).

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
}

/// `GET /mtd/oauth/authorize`: URL to send the user to.
pub async fn authorize_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<AuthorizeResponse>> {
    let url = state.tokens.begin_authorization(user.user_id())?;
    Ok(Json(AuthorizeResponse { url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

/// `POST /mtd/oauth/callback`: exchange the code HMRC redirected back with.
pub async fn callback_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CallbackBody>,
) -> AppResult<Json<ConnectionStatus>> {
    state
        .tokens
        .complete_authorization(user.user_id(), &body.state, &body.code)
        .await?;
    Ok(Json(ConnectionStatus { connected: true }))
}

/// `GET /mtd/oauth/status`
pub async fn status_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<ConnectionStatus>> {
    let connected = state.tokens.is_connected(user.user_id()).await?;
    Ok(Json(ConnectionStatus { connected }))
}

/// `DELETE /mtd/oauth/connection`: forget the user's HMRC tokens.
pub async fn disconnect_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = state.tokens.disconnect(user.user_id()).await?;
    Ok(Json(serde_json::json!({"success": true, "removed": removed})))
}
