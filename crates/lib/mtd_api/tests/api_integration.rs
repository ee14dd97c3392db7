//! Integration tests: in-memory store, mock HMRC, router driven with `oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDate, Utc};
use httpmock::prelude::*;
use mtd_api::auth::generate_access_token;
use mtd_api::{AppState, config::ApiConfig};
use mtd_core::config::{Environment, MtdConfig};
use mtd_core::models::{BusinessType, CategorizedTransaction, OAuthTokenRecord, ReviewStatus};
use mtd_core::store::{MemoryStore, TokenRepository};
use mtd_core::tokens::SCOPES;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

const JWT_SECRET: &str = "test-secret";

fn app(server: &MockServer, store: Arc<MemoryStore>) -> Router {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: "postgres://unused".into(),
        jwt_secret: JWT_SECRET.into(),
        mtd: MtdConfig::for_base_url(Environment::Production, server.base_url()),
    };
    mtd_api::router(AppState::new(config, store))
}

fn bearer(user_id: &str) -> String {
    let token = generate_access_token(user_id, Duration::minutes(5), JWT_SECRET.as_bytes())
        .expect("sign token");
    format!("Bearer {token}")
}

async fn connect(store: &MemoryStore, user_id: &str) {
    store
        .save_token(
            user_id,
            &OAuthTokenRecord {
                access_token: "hmrc-token".into(),
                refresh_token: "hmrc-refresh".into(),
                expires_at: Utc::now() + Duration::hours(4),
                token_type: "bearer".into(),
                scope: SCOPES.into(),
            },
        )
        .await
        .expect("save token");
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("parse JSON")
    };
    (status, json)
}

fn get(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", bearer(user_id))
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, user_id: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer(user_id))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn period_body() -> Value {
    json!({
        "nino": "AA123456A",
        "businessId": "XAIS1",
        "businessType": "self-employment",
        "taxYear": "2024-25",
        "payload": {
            "periodStart": "2024-04-06",
            "periodEnd": "2024-07-05",
            "incomes": {"turnover": 1200.5, "other": 0},
            "expenses": {"consolidatedExpenses": 300}
        }
    })
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let server = MockServer::start_async().await;
    let app = app(&server, Arc::new(MemoryStore::new()));

    let req = Request::builder()
        .uri("/mtd/oauth/status")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");
}

#[tokio::test]
async fn aggregate_returns_buckets_warnings_and_a_proposal() {
    let server = MockServer::start_async().await;
    let store = Arc::new(MemoryStore::new());
    let on = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
    for (id, date, amount, code) in [
        ("t1", on(4, 10), dec!(800), Some("se_sales")),
        ("t2", on(5, 1), dec!(-120.25), Some("se_admin")),
        ("t3", on(6, 2), dec!(-40), None),
    ] {
        store
            .add_transaction(
                "u1",
                BusinessType::SelfEmployment,
                CategorizedTransaction {
                    id: id.into(),
                    date,
                    amount,
                    category_code: code.map(str::to_string),
                    review_status: ReviewStatus::Confirmed,
                },
            )
            .await;
    }
    let app = app(&server, store);

    let (status, json) = send(
        &app,
        get(
            "/mtd/aggregate?businessType=self-employment&taxYear=2024-25\
             &periodStart=2024-04-06&periodEnd=2024-07-05",
            "u1",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["protocol"], "period");
    assert_eq!(json["totals"]["thisPeriod"]["income"], json!(800.0));
    assert_eq!(json["totals"]["thisPeriod"]["expenses"], json!(120.25));
    assert_eq!(json["warnings"]["uncategorisedCount"], 1);
    assert!(json["previousSubmission"].is_null());
    assert_eq!(json["proposedPayload"]["expenses"]["adminCosts"], json!(120.25));
}

#[tokio::test]
async fn period_submission_round_trip() {
    let server = MockServer::start_async().await;
    let store = Arc::new(MemoryStore::new());
    connect(&store, "u1").await;
    let hmrc = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/individuals/business/self-employment/AA123456A/XAIS1/period")
                .header("authorization", "Bearer hmrc-token")
                .header("gov-client-device-id", "device-1")
                .header("gov-client-public-ip", "203.0.113.50")
                .body_includes("\"consolidatedExpenses\":300.0");
            then.status(201)
                .json_body(json!({"periodId": "2024-04-06_2024-07-05"}));
        })
        .await;
    let app = app(&server, store);

    let mut req = json_request("POST", "/mtd/submissions/period", "u1", &period_body());
    let headers = req.headers_mut();
    headers.insert("gov-client-device-id", "device-1".parse().unwrap());
    headers.insert("gov-client-timezone", "UTC+01:00".parse().unwrap());
    headers.insert("x-forwarded-for", "203.0.113.50, 10.0.0.2".parse().unwrap());
    let (status, json) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["submissionId"], "2024-04-06_2024-07-05");
    assert_eq!(json["state"], "submitted");
    hmrc.assert_async().await;

    let (status, json) = send(
        &app,
        get(
            "/mtd/submissions/latest?businessId=XAIS1&taxYear=2024-25\
             &periodStart=2024-04-06&periodEnd=2024-07-05",
            "u1",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["submission"]["remoteSubmissionId"], "2024-04-06_2024-07-05");

    // Another user cannot read the row.
    let (_, json) = send(
        &app,
        get(
            "/mtd/submissions/latest?businessId=XAIS1&taxYear=2024-25\
             &periodStart=2024-04-06&periodEnd=2024-07-05",
            "u2",
        ),
    )
    .await;
    assert!(json["submission"].is_null());
}

#[tokio::test]
async fn submission_without_fraud_headers_is_a_validation_error() {
    let server = MockServer::start_async().await;
    let store = Arc::new(MemoryStore::new());
    connect(&store, "u1").await;
    let any = server
        .mock_async(|_when, then| {
            then.status(500);
        })
        .await;
    let app = app(&server, store);

    let (status, json) = send(
        &app,
        json_request("POST", "/mtd/submissions/period", "u1", &period_body()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "validation_error");
    any.assert_calls_async(0).await;
}

#[tokio::test]
async fn cumulative_endpoint_rejects_period_tax_years() {
    let server = MockServer::start_async().await;
    let app = app(&server, Arc::new(MemoryStore::new()));

    let mut req = json_request("POST", "/mtd/submissions/cumulative", "u1", &period_body());
    req.headers_mut()
        .insert("gov-client-device-id", "device-1".parse().unwrap());
    let (status, json) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("2024-25"));
}

#[tokio::test]
async fn business_rule_errors_carry_the_remote_code() {
    let server = MockServer::start_async().await;
    let store = Arc::new(MemoryStore::new());
    connect(&store, "u1").await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(400).json_body(json!({
                "code": "INVALID_REQUEST",
                "message": "Invalid request",
                "errors": [{"code": "RULE_MISALIGNED_PERIOD", "message": "misaligned"}]
            }));
        })
        .await;
    let app = app(&server, store);

    let mut req = json_request("POST", "/mtd/submissions/period", "u1", &period_body());
    req.headers_mut()
        .insert("gov-client-device-id", "device-1".parse().unwrap());
    let (status, json) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "RULE_MISALIGNED_PERIOD");
    assert_eq!(
        json["message"],
        "The period dates do not match an HMRC obligation."
    );
    assert_eq!(json["details"][0]["code"], "RULE_MISALIGNED_PERIOD");
}

#[tokio::test]
async fn obligations_need_an_hmrc_connection() {
    let server = MockServer::start_async().await;
    let app = app(&server, Arc::new(MemoryStore::new()));

    let (status, json) = send(&app, get("/mtd/obligations?nino=AA123456A", "u1")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "hmrc_authorization_required");
}

#[tokio::test]
async fn adjustments_crud() {
    let server = MockServer::start_async().await;
    let app = app(&server, Arc::new(MemoryStore::new()));
    let body = json!({
        "businessId": "XPIS1",
        "businessType": "uk-property",
        "taxYear": "2025-26",
        "targetBox": {"boxKind": "expense", "boxKey": "repairsAndMaintenance"},
        "amount": 150,
        "description": "Boiler repair paid personally",
        "type": "correction",
        "effectiveDate": "2025-05-01"
    });

    let (status, created) = send(&app, json_request("POST", "/mtd/adjustments", "u1", &body)).await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let id = created["id"].as_str().unwrap().to_string();

    let (_, listed) = send(
        &app,
        get("/mtd/adjustments?businessType=uk-property&taxYear=2025-26", "u1"),
    )
    .await;
    assert_eq!(listed["adjustments"].as_array().unwrap().len(), 1);

    let mut changed = body.clone();
    changed["amount"] = json!(175.5);
    let (status, updated) = send(
        &app,
        json_request("PUT", &format!("/mtd/adjustments/{id}"), "u1", &changed),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["amount"], json!(175.5));

    let delete = |user: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/mtd/adjustments/{id}"))
            .header("authorization", bearer(user))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete("u2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, delete("u1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, delete("u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adjustment_for_a_foreign_box_is_rejected() {
    let server = MockServer::start_async().await;
    let app = app(&server, Arc::new(MemoryStore::new()));
    let body = json!({
        "businessId": "XAIS1",
        "businessType": "self-employment",
        "taxYear": "2025-26",
        "targetBox": {"boxKind": "expense", "boxKey": "travelCosts"},
        "amount": 10,
        "type": "other",
        "effectiveDate": "2025-05-01"
    });

    let (status, json) = send(&app, json_request("POST", "/mtd/adjustments", "u1", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "validation_error");
}
