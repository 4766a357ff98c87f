//! Trading Console
//!
//! Resolves the signed-in identity against the dashboard backend, then serves
//! the session core over HTTP:
//!
//! - **Authentication gate** deciding which route table applies
//! - **Feature flags** resolved once from `FEATURE_<NAME>` variables
//! - **Trading control** with optimistic pause/resume and rollback on failure
//! - **Query cache** shared by every read model and every connected client
//! - **SSE stream** so all surfaces observe the same state changes

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use trading_console::api::HttpApi;
use trading_console::config::AppConfig;
use trading_console::dashboard::{DashboardServer, DashboardState};
use trading_console::flags::FeatureFlag;
use trading_console::session::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trading_console=info".parse()?),
        )
        .init();

    info!("Trading Console v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // 1. CONFIGURATION
    // =========================================================================
    let config = AppConfig::from_env();
    info!("[CONFIG] Backend: {}", config.api.base_url);
    info!(
        "[CONFIG] Status refresh: {}s",
        config.status_refresh.as_secs()
    );
    for state in config.flags.list_all() {
        info!("[FLAGS] {} = {}", state.name, state.enabled);
    }
    if config.flags.is_enabled(FeatureFlag::LiveExchangeTrading) {
        warn!("[FLAGS] Live exchange trading is ENABLED");
    }

    // =========================================================================
    // 2. BACKEND CLIENT AND SESSION CORE
    // =========================================================================
    let api = HttpApi::new(config.api.clone()).context("Failed to build backend client")?;
    let core = Arc::new(SessionManager::new(Arc::new(api), config.flags.clone()));

    // =========================================================================
    // 3. IDENTITY
    // =========================================================================
    match core.bootstrap().await {
        Ok(session) if session.is_authenticated => {
            info!(
                "[SESSION] Signed in as {}",
                session.user_id.as_deref().unwrap_or("?")
            );
        }
        Ok(_) => info!("[SESSION] No signed-in user; serving public routes"),
        // Serve anyway: clients can retry via /api/session/resolve
        Err(e) => warn!("[SESSION] Identity unresolved: {}", e),
    }

    // =========================================================================
    // 4. DASHBOARD
    // =========================================================================
    let state = DashboardState::new(core, config.status_refresh);
    DashboardServer::new(state, config.dashboard)
        .run()
        .await
        .context("Dashboard server failed")?;

    info!("Shutdown complete");
    Ok(())
}
