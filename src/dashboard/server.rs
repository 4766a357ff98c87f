//! Axum server setup and configuration.
//!
//! Builds the JSON shell over the session core, with CORS, request tracing, the
//! background status poller and graceful shutdown.

use crate::dashboard::handlers::{
    api_briefing, api_briefing_generate, api_dismiss_notice, api_dna, api_emergency_stop,
    api_events, api_features, api_notices, api_orders, api_route, api_session,
    api_session_logout, api_session_resolve, api_trading, api_trading_pause, api_trading_resume,
    api_trading_toggle, api_watchlist, api_watchlist_add, api_watchlist_remove, health_check,
};
use crate::dashboard::sse::status_refresher;
use crate::dashboard::state::DashboardState;
use anyhow::Context;
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

const DEFAULT_DASHBOARD_PORT: u16 = 8080;
const DEFAULT_DASHBOARD_HOST: &str = "127.0.0.1";

/// Dashboard server configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub port: u16,
    pub host: String,
    /// Permissive CORS for a separately served frontend
    pub enable_cors: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DASHBOARD_PORT,
            host: DEFAULT_DASHBOARD_HOST.to_string(),
            enable_cors: true,
        }
    }
}

impl DashboardConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("DASHBOARD_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DASHBOARD_PORT),
            host: std::env::var("DASHBOARD_HOST")
                .unwrap_or_else(|_| DEFAULT_DASHBOARD_HOST.to_string()),
            enable_cors: std::env::var("DASHBOARD_CORS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        }
    }
}

pub struct DashboardServer {
    state: Arc<DashboardState>,
    config: DashboardConfig,
}

impl DashboardServer {
    pub fn new(state: Arc<DashboardState>, config: DashboardConfig) -> Self {
        Self { state, config }
    }

    /// Router with every shell route
    pub fn router(&self) -> Router {
        let cors = if self.config.enable_cors {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        } else {
            CorsLayer::new()
        };

        Router::new()
            // Session and routing
            .route("/api/session", get(api_session))
            .route("/api/session/resolve", post(api_session_resolve))
            .route("/api/session/logout", post(api_session_logout))
            .route("/api/route", get(api_route))
            .route("/api/features", get(api_features))
            // Trading control
            .route("/api/trading", get(api_trading))
            .route("/api/trading/pause", post(api_trading_pause))
            .route("/api/trading/resume", post(api_trading_resume))
            .route("/api/trading/toggle", post(api_trading_toggle))
            .route("/api/trading/emergency-stop", post(api_emergency_stop))
            // Notices
            .route("/api/notices", get(api_notices))
            .route("/api/notices/:id/dismiss", post(api_dismiss_notice))
            // Read models
            .route("/api/watchlist", get(api_watchlist).post(api_watchlist_add))
            .route("/api/watchlist/:symbol", delete(api_watchlist_remove))
            .route("/api/briefing", get(api_briefing).post(api_briefing_generate))
            .route("/api/dna", get(api_dna))
            .route("/api/orders", get(api_orders))
            .route("/api/events", get(api_events))
            .route("/health", get(health_check))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind, start the status poller and serve until a shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid dashboard address")?;

        info!("Starting dashboard server at http://{}", addr);

        let router = self.router();

        let poller = tokio::spawn(status_refresher(self.state.clone()));

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Dashboard ready at http://{}", addr);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        poller.abort();
        served.context("Dashboard server failed")?;

        info!("Dashboard server shut down");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
