//! API Integration Tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
};
use faucet_onboarding::domain::{BaseUnits, Unit};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

mod common;

use common::{addr, faucet, ONE};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let env = common::setup(0, 0).await;

    let response = env.router().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_onboard_e2e() {
    let env = common::setup(10 * ONE, 100 * ONE).await;
    let app = env.router();
    let address = addr(1).to_string();

    // 1. First onboarding funds both units
    let response = app
        .clone()
        .oneshot(post_json("/onboard", json!({ "address": address })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-correlation-id"));

    let body = json_body(response).await;
    assert_eq!(body["gas"]["state"], "attempted");
    assert_eq!(body["gas"]["status"], "confirmed");
    assert_eq!(body["token"]["status"], "confirmed");
    assert_eq!(body["token"]["amount"], "10");

    // 2. Second onboarding is a no-op
    let response = app
        .clone()
        .oneshot(post_json("/onboard", json!({ "address": address })))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["gas"]["status"], "already_funded");
    assert_eq!(body["token"]["status"], "already_funded");
    assert_eq!(env.ledger.submission_count().await, 2);

    // 3. History shows the single token transfer
    let response = app
        .oneshot(get(&format!("/history/{}", address)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["direction"], "received");
    assert_eq!(body["entries"][0]["counterparty"], faucet().to_string());
}

#[tokio::test]
async fn test_onboard_skips_tokens_when_gas_exhausted() {
    let env = common::setup(ONE / 20, 100 * ONE).await;

    let response = env
        .router()
        .oneshot(post_json("/onboard", json!({ "address": addr(2).to_string() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["gas"]["status"], "faucet_exhausted");
    assert_eq!(body["token"]["state"], "skipped");
}

#[tokio::test]
async fn test_onboard_rejects_bad_address() {
    let env = common::setup(10 * ONE, 100 * ONE).await;

    let response = env
        .router()
        .oneshot(post_json("/onboard", json!({ "address": "0x1234" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "invalid_address");
}

#[tokio::test]
async fn test_onboard_rejects_faucet() {
    let env = common::setup(10 * ONE, 100 * ONE).await;

    let response = env
        .router()
        .oneshot(post_json("/onboard", json!({ "address": faucet().to_string() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "faucet_recipient");
}

#[tokio::test]
async fn test_onboard_user_by_name() {
    let env = common::setup(10 * ONE, 100 * ONE).await;
    env.directory.insert("alice", addr(3)).await;
    let app = env.router();

    let response = app
        .clone()
        .oneshot(post_json("/users/alice/onboard", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["address"], addr(3).to_string());

    let response = app
        .oneshot(post_json("/users/nobody/onboard", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error_code"], "user_not_found");
}

#[tokio::test]
async fn test_reconcile_partial_top_up() {
    let env = common::setup(10 * ONE, 100 * ONE).await;
    env.ledger.set_balance(&addr(4), Unit::Token, BaseUnits(3 * ONE)).await;

    let response = env
        .router()
        .oneshot(post_json(
            "/reconcile",
            json!({ "address": addr(4).to_string(), "target": "5.5", "unit": "token" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["amount"], "2.5");
    assert_eq!(
        env.ledger.balance_of(&addr(4), Unit::Token).await,
        BaseUnits(5 * ONE + ONE / 2)
    );
}

#[tokio::test]
async fn test_reconcile_rejects_negative_target() {
    let env = common::setup(10 * ONE, 100 * ONE).await;

    let response = env
        .router()
        .oneshot(post_json(
            "/reconcile",
            json!({ "address": addr(4).to_string(), "target": "-1", "unit": "gas" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "invalid_amount");
}

#[tokio::test]
async fn test_reconcile_ledger_down_is_503() {
    let env = common::setup(10 * ONE, 100 * ONE).await;
    env.ledger.set_available(false).await;

    let response = env
        .router()
        .oneshot(post_json(
            "/reconcile",
            json!({ "address": addr(4).to_string(), "target": "1", "unit": "token" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error_code"], "gateway_unavailable");
}

#[tokio::test]
async fn test_history_limit_validation() {
    let env = common::setup(0, 0).await;
    let app = env.router();
    for n in 0..5u8 {
        env.ledger
            .record_block(&[(addr(10 + n), addr(5), BaseUnits(ONE))])
            .await;
    }

    let response = app
        .clone()
        .oneshot(get(&format!("/history/{}?limit=2", addr(5))))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["entries"][0]["counterparty"], addr(14).to_string());

    let response = app
        .oneshot(get(&format!("/history/{}?limit=1000", addr(5))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "limit_too_large");
}

#[tokio::test]
async fn test_balance_after_onboarding() {
    let env = common::setup(10 * ONE, 100 * ONE).await;
    let app = env.router();
    let address = addr(6).to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/balance/{}", address)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["currency_balance"], "0");
    assert_eq!(body["token_balance"], "0");

    app.clone()
        .oneshot(post_json("/onboard", json!({ "address": address })))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/balance/{}", address)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["address"], address);
    assert_eq!(body["currency_balance"], "1");
    assert_eq!(body["token_balance"], "10");

    let response = app.oneshot(get("/balance/not-an-address")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_balance_ledger_down_is_503() {
    let env = common::setup(0, 0).await;
    env.ledger.set_available(false).await;

    let response = env
        .router()
        .oneshot(get(&format!("/balance/{}", addr(6))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_faucet_status() {
    let env = common::setup(2 * ONE, 50 * ONE).await;

    let response = env.router().oneshot(get("/faucet")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["address"], faucet().to_string());
    assert_eq!(body["currency_balance"], "2");
    assert_eq!(body["token_balance"], "50");
    assert_eq!(body["currency_reserve"], "0.1");
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let env = common::setup(0, 0).await;
    let id = "6f1c2b0e-8a7d-4a44-9d0a-2f9e5c1b7a30";

    let request = Request::builder()
        .uri("/faucet")
        .header("x-correlation-id", id)
        .body(Body::empty())
        .unwrap();
    let response = env.router().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-correlation-id"], id);
}
