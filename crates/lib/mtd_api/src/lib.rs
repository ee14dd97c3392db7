//! # mtd_api
//!
//! HTTP API library for Making Tax Digital submissions.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use mtd_core::aggregate::Aggregator;
use mtd_core::fraud_headers::FraudHeaderComposer;
use mtd_core::hmrc::HmrcClient;
use mtd_core::hmrc::business::resolver_for;
use mtd_core::store::{AdjustmentRepository, SubmissionLedger, TokenRepository, TransactionSource};
use mtd_core::submission::SubmissionAdapter;
use mtd_core::tokens::{OAuthClient, TokenManager};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{adjustments, aggregate, obligations, oauth, submissions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub tokens: Arc<TokenManager>,
    pub aggregator: Arc<Aggregator>,
    pub submissions: SubmissionAdapter,
    pub adjustments: Arc<dyn AdjustmentRepository>,
}

impl AppState {
    /// Wire the pipeline over one store implementing every storage seam.
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Self
    where
        S: TokenRepository + TransactionSource + AdjustmentRepository + SubmissionLedger + 'static,
    {
        let http = reqwest::Client::new();
        let client = HmrcClient::new(http.clone(), config.mtd.api_base_url.clone());
        let tokens = Arc::new(TokenManager::new(
            store.clone(),
            OAuthClient::new(http, &config.mtd),
            config.mtd.token_refresh_threshold,
        ));
        let submissions = SubmissionAdapter::new(
            client.clone(),
            tokens.clone(),
            FraudHeaderComposer::new(config.mtd.vendor.clone()),
            resolver_for(&config.mtd, client),
            store.clone(),
        );
        Self {
            aggregator: Arc::new(Aggregator::new(store.clone(), store.clone(), store.clone())),
            adjustments: store,
            tokens,
            submissions,
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `mtd_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    mtd_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/mtd/aggregate", get(aggregate::aggregate_handler))
        .route(
            "/mtd/submissions/period",
            post(submissions::submit_period_handler),
        )
        .route(
            "/mtd/submissions/cumulative",
            post(submissions::submit_cumulative_handler),
        )
        .route(
            "/mtd/submissions/latest",
            get(submissions::latest_submission_handler),
        )
        .route(
            "/mtd/submissions/cumulative/remote",
            get(submissions::remote_cumulative_handler),
        )
        .route("/mtd/obligations", get(obligations::list_obligations_handler))
        .route(
            "/mtd/adjustments",
            get(adjustments::list_adjustments_handler)
                .post(adjustments::create_adjustment_handler),
        )
        .route(
            "/mtd/adjustments/{id}",
            put(adjustments::update_adjustment_handler)
                .delete(adjustments::delete_adjustment_handler),
        )
        .route("/mtd/oauth/authorize", get(oauth::authorize_handler))
        .route("/mtd/oauth/callback", post(oauth::callback_handler))
        .route("/mtd/oauth/status", get(oauth::status_handler))
        .route(
            "/mtd/oauth/connection",
            axum::routing::delete(oauth::disconnect_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
