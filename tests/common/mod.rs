//! Common test utilities

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use flow_dashboard::engine::{LocalChain, LocalChainConfig};
use flow_dashboard::jobs::PollerConfig;
use flow_dashboard::session::{DashboardSession, SessionConfig};
use flow_dashboard::store::{MemoryStore, SnapshotStore, DEFAULT_STORAGE_KEY};
use flow_dashboard::{api, Address, TokenAmount};

pub const ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const BOB: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
pub const UNDERLYING: &str = "0x6384D5F8999EaAC8bcCfae137D4e535075b47494";
pub const WRAPPED: &str = "0x357f63DB7C18C99051f9507532F426c2A070975a";

pub fn address(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        account: address(ACCOUNT),
        underlying_token: address(UNDERLYING),
        wrapped_token: address(WRAPPED),
        default_monthly_amount: dec!(2000),
        partial_unwrap_percent: 80,
        signer_accounts: vec![address(ACCOUNT), address(ALICE), address(BOB)],
        pollers: PollerConfig::every(Duration::from_secs(5)),
    }
}

/// Local chain where the session account holds 10000 underlying tokens
pub async fn funded_chain() -> Arc<LocalChain> {
    let chain = LocalChain::new(LocalChainConfig {
        chain_id: 31337,
        underlying_token: address(UNDERLYING),
        wrapped_token: address(WRAPPED),
        confirmation_delay: Duration::ZERO,
    });
    let amount = "10000".parse::<TokenAmount>().unwrap().to_wei();
    chain.mint_underlying(&address(ACCOUNT), amount).await;
    Arc::new(chain)
}

/// Router over a fresh session with an in-memory store
pub async fn setup_app() -> (Arc<LocalChain>, Arc<DashboardSession>, Router) {
    setup_app_with_store(Arc::new(MemoryStore::new(DEFAULT_STORAGE_KEY))).await
}

pub async fn setup_app_with_store(
    store: Arc<dyn SnapshotStore>,
) -> (Arc<LocalChain>, Arc<DashboardSession>, Router) {
    let chain = funded_chain().await;
    let session = Arc::new(
        DashboardSession::open(chain.clone(), store, session_config())
            .await
            .expect("Failed to open session"),
    );
    let app = api::build_router(session.clone());
    (chain, session, app)
}

/// Send one request and decode the JSON response body
pub async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (u16, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Connect to the test database
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB")
}
