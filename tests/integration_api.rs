//! API Integration Tests

use serde_json::json;
use std::sync::Arc;

use flow_dashboard::engine::SettlementEngine;
use flow_dashboard::store::{self, MemoryStore, SnapshotStore, DEFAULT_STORAGE_KEY};

mod common;

use common::{address, call, setup_app, setup_app_with_store, ACCOUNT, ALICE, BOB};

#[tokio::test]
async fn test_health() {
    let (_chain, _session, app) = setup_app().await;

    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (_chain, session, app) = setup_app().await;

    let (status, body) = call(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["connected"], false);

    let (status, body) = call(&app, "POST", "/api/v1/session/connect", None).await;
    assert_eq!(status, 200, "connect failed: {}", body);
    assert_eq!(body["connected"], true);
    assert_eq!(body["chain_id"], 31337);
    assert_eq!(body["balances"]["underlying"], "10000");

    let (status, body) = call(&app, "POST", "/api/v1/session/disconnect", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["was_connected"], true);
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_streaming_e2e() {
    let (chain, session, app) = setup_app().await;
    call(&app, "POST", "/api/v1/session/connect", None).await;

    // 1. Wrap underlying tokens
    let (status, body) = call(&app, "POST", "/api/v1/wrap", Some(json!({"amount": "1000"}))).await;
    assert_eq!(status, 200, "wrap failed: {}", body);
    assert!(body["approval_tx_hash"].is_string());
    assert_eq!(body["balances"]["wrapped"], "1000");

    // 2. Add a recipient
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": ALICE})),
    )
    .await;
    assert_eq!(status, 201, "add failed: {}", body);
    assert_eq!(body["change"]["kind"], "opened");
    assert_eq!(body["recipient"]["status"], "active");
    assert_eq!(body["recipient"]["flowRate"], "2000");

    let flow = chain
        .query_flow(&address(ACCOUNT), &address(ALICE))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(flow.rate.wei_per_second().value(), 771_604_938_271_604);

    // 3. Duplicate add, differently cased
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": ALICE.to_lowercase()})),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "duplicate_recipient");

    // 4. Pause, then pause again
    let uri = format!("/api/v1/recipients/{}/pause", ALICE);
    let (status, body) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["recipient"]["status"], "paused");

    let (status, body) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "invalid_status");

    // 5. Resume
    let uri = format!("/api/v1/recipients/{}/resume", ALICE);
    let (status, body) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["recipient"]["status"], "active");

    // 6. Remove closes the running flow
    let uri = format!("/api/v1/recipients/{}", ALICE);
    let (status, body) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["change"]["kind"], "closed");

    let (status, body) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error_code"], "recipient_not_found");

    let (_, body) = call(&app, "GET", "/api/v1/recipients", None).await;
    assert_eq!(body, json!([]));

    session.disconnect().await;
}

#[tokio::test]
async fn test_validation_errors() {
    let (_chain, session, app) = setup_app().await;
    call(&app, "POST", "/api/v1/session/connect", None).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": "0x123"})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error_code"], "invalid_address");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": ACCOUNT})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error_code"], "self_flow");

    let (status, body) = call(&app, "POST", "/api/v1/wrap", Some(json!({"amount": "0"}))).await;
    assert_eq!(status, 400);
    assert_eq!(body["error_code"], "invalid_amount");

    let (status, body) =
        call(&app, "POST", "/api/v1/wrap", Some(json!({"amount": "20000"}))).await;
    assert_eq!(status, 422);
    assert_eq!(body["error_code"], "insufficient_balance");

    session.disconnect().await;
}

#[tokio::test]
async fn test_actions_before_connect() {
    let (_chain, _session, app) = setup_app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": ALICE})),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "not_connected");
}

#[tokio::test]
async fn test_reconcile_endpoint() {
    let (chain, session, app) = setup_app().await;
    call(&app, "POST", "/api/v1/session/connect", None).await;
    call(&app, "POST", "/api/v1/wrap", Some(json!({"amount": "1000"}))).await;
    call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": BOB})),
    )
    .await;

    // flow closed outside the dashboard
    chain
        .close_flow(&address(ACCOUNT), &address(BOB))
        .await
        .unwrap();

    let (status, body) = call(&app, "POST", "/api/v1/recipients/reconcile", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["checked"], 1);
    assert_eq!(body["transitions"][0]["from"], "active");
    assert_eq!(body["transitions"][0]["to"], "paused");

    let (_, body) = call(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(body["streaming"], false);
    assert_eq!(body["recipients"][0]["flowRate"], "0");

    session.disconnect().await;
}

#[tokio::test]
async fn test_partial_unwrap_endpoint() {
    let (chain, session, app) = setup_app().await;
    let alice = address(ALICE);
    let amount = "50".parse::<flow_dashboard::TokenAmount>().unwrap().to_wei();
    chain.mint_underlying(&alice, amount).await;
    chain.approve(&alice, flow_dashboard::Wei::MAX).await.unwrap();
    chain.wrap(&alice, amount).await.unwrap();
    call(&app, "POST", "/api/v1/session/connect", None).await;

    let uri = format!("/api/v1/recipients/{}/unwrap", ALICE);
    let (status, body) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, 200, "unwrap failed: {}", body);
    assert_eq!(body["amount"], "40");
    assert_eq!(body["percent"], 80);

    let uri = "/api/v1/recipients/0x1111111111111111111111111111111111111111/unwrap";
    let (status, body) = call(&app, "POST", uri, None).await;
    assert_eq!(status, 422);
    assert_eq!(body["error_code"], "unknown_signer");

    session.disconnect().await;
}

#[tokio::test]
async fn test_recipients_persist_across_sessions() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new(DEFAULT_STORAGE_KEY));

    let (_chain, session, app) = setup_app_with_store(store.clone()).await;
    call(&app, "POST", "/api/v1/session/connect", None).await;
    call(&app, "POST", "/api/v1/wrap", Some(json!({"amount": "1000"}))).await;
    call(
        &app,
        "POST",
        "/api/v1/recipients",
        Some(json!({"address": ALICE})),
    )
    .await;
    session.disconnect().await;

    let payload = store.read().await.unwrap().unwrap();
    let saved = store::decode(&payload).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].address.as_str(), ALICE);

    // a new session over the same store sees the recipient
    let (_chain, _session, app) = setup_app_with_store(store.clone()).await;
    let (_, body) = call(&app, "GET", "/api/v1/recipients", None).await;
    assert_eq!(body[0]["address"], ALICE);
    assert_eq!(body[0]["status"], "active");

    let (status, body) = call(&app, "DELETE", "/api/v1/recipients", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["removed"], 1);
    assert_eq!(store.read().await.unwrap().as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    let (_chain, _session, app) = setup_app().await;

    let request = Request::builder()
        .uri("/api/v1/session")
        .header("x-request-id", "trace-7")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-7");
}
