//! Marketplace API Server
//!
//! Usage:
//!   cargo run --bin marketplace_api
//!
//! Environment (see `AppConfig::from_env` for the full list):
//!   PORT / MARKET_PORT      - Server port (default: 8080)
//!   MARKET_HOST             - Server host (default: 0.0.0.0)
//!   MARKET_DATA_FILE        - Store snapshot (default: ./data/marketplace.json)
//!   MARKET_SESSION_SECRET   - HS256 key for session JWTs
//!   RUST_LOG                - Log filter (default: info)

use chrono::Utc;
use marketplace::api::{create_router, AppState};
use marketplace::core::accounts;
use marketplace::{AppConfig, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = AppConfig::from_env()?;

    // Load persisted documents
    let store = Arc::new(Store::load(&config.data_file)?);

    if let Some(admin) = &config.admin {
        accounts::ensure_admin(&store, &admin.email, &admin.password, Utc::now())?;
    }

    let cleanup_enabled = config.cleanup_enabled;
    let data_file = config.data_file.clone();
    let addr: SocketAddr = config.bind_address().parse()?;

    // Create app state
    let state = Arc::new(AppState::new(config, store.clone()));

    state.rate_limiter.start_sweeper();
    if cleanup_enabled {
        state.scheduler.start();
    } else {
        warn!("🧹 Cleanup scheduler disabled (MARKET_CLEANUP_ENABLED=false)");
    }

    let scheduler = state.scheduler.clone();
    let app = create_router(state);

    info!("🚀 Marketplace API starting on http://{}", addr);
    info!("📚 Health check: http://{}/api/health", addr);
    info!("Press Ctrl+C for graceful shutdown");

    // Start server with graceful shutdown
    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Graceful shutdown sequence
    info!("🛑 Shutdown signal received, cleaning up...");
    scheduler.shutdown().await;

    match store.save(&data_file) {
        Ok(count) => info!("   ✅ {} documents saved to {}", count, data_file.display()),
        Err(e) => warn!("   ⚠️ Failed to save snapshot: {}", e),
    }

    info!("👋 Marketplace API shutdown complete");
    Ok(())
}
