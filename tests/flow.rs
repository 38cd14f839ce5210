//! End-to-end flow tests: the REST surface driven against the in-memory
//! store and a mock provider, through the full router.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use pledge_gateway::api;
use pledge_gateway::app_state::AppState;
use pledge_gateway::config::{GatewayConfig, StoreBackend};
use pledge_gateway::error::GatewayError;
use pledge_gateway::ingress::SignatureVerifier;
use pledge_gateway::ingress::signature::SIGNATURE_HEADER;
use pledge_gateway::persistence::{MemoryStore, PledgeStore};
use pledge_gateway::provider::{CheckoutProvider, CheckoutSession, SessionRequest};
use pledge_gateway::service::{ChallengeService, CheckoutService, ReconciliationService};

const SECRET: &str = "whsec_flow_test";
const USER: &str = "user_flow_1";

#[derive(Debug, Default)]
struct CountingProvider {
    calls: AtomicU32,
}

#[async_trait]
impl CheckoutProvider for CountingProvider {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSession {
            session_id: format!("cs_{call}"),
            redirect_url: format!("https://pay.example/{}/cs_{call}", request.challenge_id),
        })
    }
}

fn config() -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap_or_else(|_| panic!("addr")),
        store_backend: StoreBackend::Memory,
        database_url: String::new(),
        database_max_connections: 1,
        database_min_connections: 0,
        database_connect_timeout_secs: 1,
        webhook_signing_secret: SECRET.to_string(),
        signature_tolerance_secs: 300,
        commission_rate: dec!(0.15),
        min_stake_minor: 1_000,
        max_stake_minor: 50_000,
        currency: "eur".to_string(),
        checkout_expiry_secs: 1_800,
        checkout_rate_limit_max: 10,
        checkout_rate_limit_window_secs: 300,
        provider_api_base: String::new(),
        provider_secret_key: String::new(),
        app_base_url: "http://localhost:3000".to_string(),
    })
}

fn app(store: &Arc<MemoryStore>) -> axum::Router {
    let config = config();
    let store_dyn = Arc::clone(store) as Arc<dyn PledgeStore>;
    let state = AppState {
        challenges: Arc::new(ChallengeService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&config),
        )),
        checkout: Arc::new(CheckoutService::new(
            Arc::clone(&store_dyn),
            Arc::new(CountingProvider::default()),
            Arc::clone(&config),
        )),
        reconciliation: Arc::new(ReconciliationService::new(Arc::clone(&store_dyn))),
        verifier: Arc::new(SignatureVerifier::new(
            SECRET.to_string(),
            config.signature_tolerance_secs,
        )),
    };
    api::build_router().with_state(state)
}

fn sign(payload: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let timestamp = Utc::now().timestamp();
    let signed = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
    let Ok(mut mac) = HmacSha256::new_from_slice(SECRET.as_bytes()) else {
        panic!("hmac accepts any key size");
    };
    mac.update(signed.as_bytes());
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let Ok(response) = app.oneshot(request).await else {
        panic!("request failed");
    };
    let status = response.status();
    let Ok(collected) = response.into_body().collect().await else {
        panic!("body read failed");
    };
    let bytes = collected.to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_default()
    };
    (status, body)
}

fn authed_json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", USER)
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| panic!("request build failed"))
}

fn webhook(body: &serde_json::Value) -> Request<Body> {
    let raw = body.to_string();
    Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign(raw.as_bytes()))
        .body(Body::from(raw))
        .unwrap_or_else(|_| panic!("request build failed"))
}

async fn create_challenge(store: &Arc<MemoryStore>, amount_minor: i64) -> Uuid {
    let (status, body) = send(
        app(store),
        authed_json(
            "POST",
            "/api/v1/challenges",
            serde_json::json!({
                "title": "meditate daily",
                "amount_minor": amount_minor,
                "duration_days": 30,
                "start_date": Utc::now(),
                "association_id": Uuid::new_v4(),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    let Some(id) = body["id"].as_str().and_then(|s| s.parse().ok()) else {
        panic!("missing challenge id in {body}");
    };
    id
}

async fn start_checkout(store: &Arc<MemoryStore>, challenge_id: Uuid, amount_minor: i64) {
    let (status, body) = send(
        app(store),
        authed_json(
            "POST",
            &format!("/api/v1/challenges/{challenge_id}/checkout"),
            serde_json::json!({ "amount_minor": amount_minor }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "checkout failed: {body}");
    assert!(body["redirect_url"].is_string());
}

async fn deliver_payment_events(store: &Arc<MemoryStore>, challenge_id: Uuid, paid_minor: i64) {
    let completed = serde_json::json!({
        "id": format!("evt_completed_{challenge_id}"),
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": {"object": {
            "id": "cs_0",
            "payment_intent": format!("pi_{challenge_id}"),
            "metadata": {"challenge_id": challenge_id}
        }}
    });
    let (status, _) = send(app(store), webhook(&completed)).await;
    assert_eq!(status, StatusCode::OK);

    let succeeded = serde_json::json!({
        "id": format!("evt_succeeded_{challenge_id}"),
        "type": "payment_intent.succeeded",
        "created": Utc::now().timestamp(),
        "data": {"object": {
            "id": format!("pi_{challenge_id}"),
            "amount_received": paid_minor,
            "metadata": {"challenge_id": challenge_id}
        }}
    });
    let (status, _) = send(app(store), webhook(&succeeded)).await;
    assert_eq!(status, StatusCode::OK);
}

async fn get_challenge(store: &Arc<MemoryStore>, challenge_id: Uuid) -> serde_json::Value {
    let (status, body) = send(
        app(store),
        Request::builder()
            .method("GET")
            .uri(format!("/api/v1/challenges/{challenge_id}"))
            .header("x-user-id", USER)
            .body(Body::empty())
            .unwrap_or_else(|_| panic!("request build failed")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn paid_challenge_becomes_active_and_refunds_on_success() {
    let store = Arc::new(MemoryStore::new());

    let challenge_id = create_challenge(&store, 10_000).await;
    start_checkout(&store, challenge_id, 10_000).await;
    deliver_payment_events(&store, challenge_id, 10_000).await;

    let body = get_challenge(&store, challenge_id).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["transaction"]["status"], "paid");
    assert!(body["end_date"].is_string());

    let (status, outcome) = send(
        app(&store),
        authed_json(
            "POST",
            &format!("/api/v1/challenges/{challenge_id}/success"),
            serde_json::json!({ "note": "did it", "donate_anyway": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "declare failed: {outcome}");
    assert_eq!(outcome["challenge_status"], "validated");
    assert_eq!(outcome["transaction_status"], "refunded");
    assert_eq!(outcome["payout_minor"], 8_500);
}

#[tokio::test]
async fn short_paid_amount_fails_transaction_and_keeps_draft() {
    let store = Arc::new(MemoryStore::new());

    let challenge_id = create_challenge(&store, 5_000).await;
    start_checkout(&store, challenge_id, 5_000).await;
    deliver_payment_events(&store, challenge_id, 4_500).await;

    let body = get_challenge(&store, challenge_id).await;
    assert_eq!(body["status"], "draft");
    assert_eq!(body["transaction"]["status"], "failed");
}

#[tokio::test]
async fn declared_failure_donates_net_of_commission() {
    let store = Arc::new(MemoryStore::new());

    let challenge_id = create_challenge(&store, 10_000).await;
    start_checkout(&store, challenge_id, 10_000).await;
    deliver_payment_events(&store, challenge_id, 10_000).await;

    let (status, outcome) = send(
        app(&store),
        authed_json(
            "POST",
            &format!("/api/v1/challenges/{challenge_id}/failure"),
            serde_json::json!({ "note": "life happened" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "declare failed: {outcome}");
    assert_eq!(outcome["challenge_status"], "failed");
    assert_eq!(outcome["transaction_status"], "donated");
    assert_eq!(outcome["payout_minor"], 8_500);

    // Racing second declaration loses.
    let (status, _) = send(
        app(&store),
        authed_json(
            "POST",
            &format!("/api/v1/challenges/{challenge_id}/success"),
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_checkouts_leave_one_in_flight_attempt() {
    let store = Arc::new(MemoryStore::new());
    let challenge_id = create_challenge(&store, 5_000).await;

    let request = || {
        authed_json(
            "POST",
            &format!("/api/v1/challenges/{challenge_id}/checkout"),
            serde_json::json!({ "amount_minor": 5_000 }),
        )
    };
    let (a, b) = tokio::join!(
        send(app(&store), request()),
        send(app(&store), request()),
    );

    // Both may succeed (the second refreshes the slot) but never two
    // non-terminal attempts.
    assert!(a.0 == StatusCode::OK || a.0 == StatusCode::CONFLICT);
    assert!(b.0 == StatusCode::OK || b.0 == StatusCode::CONFLICT);
    let open = store
        .transactions_for_challenge(challenge_id)
        .await
        .into_iter()
        .filter(|t| !t.status.is_terminal())
        .count();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn redelivered_webhook_adds_no_rows() {
    let store = Arc::new(MemoryStore::new());
    let challenge_id = create_challenge(&store, 5_000).await;
    start_checkout(&store, challenge_id, 5_000).await;

    let event = serde_json::json!({
        "id": "evt_once",
        "type": "payment_intent.succeeded",
        "created": Utc::now().timestamp(),
        "data": {"object": {
            "id": "pi_1",
            "amount_received": 5_000,
            "metadata": {"challenge_id": challenge_id}
        }}
    });

    let (first, _) = send(app(&store), webhook(&event)).await;
    let (second, ack) = send(app(&store), webhook(&event)).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(ack["duplicate"], serde_json::json!(true));
    assert_eq!(store.processed_event_count().await, 1);
}

#[tokio::test]
async fn activation_sets_deadline_from_duration() {
    let store = Arc::new(MemoryStore::new());
    let challenge_id = create_challenge(&store, 5_000).await;
    start_checkout(&store, challenge_id, 5_000).await;
    deliver_payment_events(&store, challenge_id, 5_000).await;

    let Ok(Some((challenge, _))) = store.challenge_for_user(challenge_id, USER).await else {
        panic!("fetch failed");
    };
    assert_eq!(
        challenge.end_date,
        Some(challenge.start_date + Duration::days(30))
    );
}
