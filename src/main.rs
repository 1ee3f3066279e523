//! flow_dashboard - streaming payments dashboard service
//!
//! Tracks the recipients of the account's payment streams, keeps them in
//! line with the settlement engine and exposes wallet actions over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flow_dashboard::api;
use flow_dashboard::engine::{LocalChain, LocalChainConfig};
use flow_dashboard::session::{DashboardSession, SessionConfig};
use flow_dashboard::store::{JsonFileStore, PgSnapshotStore, SnapshotStore};
use flow_dashboard::{Config, Wei};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flow_dashboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the snapshot store: Postgres when configured, a JSON file otherwise
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;

            let store = PgSnapshotStore::new(pool, config.storage_key.clone());
            store.ensure_schema().await?;
            tracing::info!("Database connected successfully");
            Ok(Arc::new(store))
        }
        None => {
            let store = JsonFileStore::new(&config.storage_dir, config.storage_key.clone());
            tracing::info!(path = %store.path().display(), "Using file store");
            Ok(Arc::new(store))
        }
    }
}

/// Start the local chain and fund the session account
async fn start_chain(config: &Config) -> anyhow::Result<Arc<LocalChain>> {
    let chain = LocalChain::new(LocalChainConfig {
        chain_id: config.chain_id,
        underlying_token: config.underlying_token.clone(),
        wrapped_token: config.wrapped_token.clone(),
        confirmation_delay: config.confirmation_delay,
    });

    let seed = Wei::from_major(config.seed_underlying_amount)?;
    if seed.is_positive() {
        chain.mint_underlying(&config.account, seed).await;
    }

    tracing::info!(
        chain_id = config.chain_id,
        account = %config.account,
        seed = %config.seed_underlying_amount,
        "Local chain started"
    );
    Ok(Arc::new(chain))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting flow dashboard");

    let store = open_store(&config).await?;
    let chain = start_chain(&config).await?;

    let session =
        Arc::new(DashboardSession::open(chain, store, SessionConfig::from(&config)).await?);

    tracing::info!("Listening on http://{}", addr);

    let app = api::build_router(session.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    session.disconnect().await;
    tracing::info!("Pollers stopped. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
