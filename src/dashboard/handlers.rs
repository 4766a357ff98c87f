//! HTTP route handlers for the dashboard shell.
//!
//! Handlers are thin: they pick the user session, call one core operation and
//! serialize the result. Core errors are turned into status codes by
//! [`ShellError`].

use crate::auth::SessionSnapshot;
use crate::control::{ToggleOutcome, TradingView};
use crate::dashboard::sse::create_sse_stream;
use crate::dashboard::state::DashboardState;
use crate::error::CoreError;
use crate::flags::FlagState;
use crate::notify::Notice;
use crate::routes::RouteResolution;
use crate::types::{Briefing, DnaProfile, Order, WatchlistItem};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

type Shared = State<Arc<DashboardState>>;
type ShellResult<T> = Result<Json<T>, ShellError>;

// ============================================================================
// ERRORS
// ============================================================================

/// Core error rendered as a JSON body with a matching status code
#[derive(Debug)]
pub struct ShellError(pub CoreError);

impl From<CoreError> for ShellError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ShellError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            CoreError::AuthUnresolved => (StatusCode::UNAUTHORIZED, "auth_unresolved"),
            CoreError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            CoreError::FeatureDisabled { .. } => (StatusCode::FORBIDDEN, "feature_disabled"),
            CoreError::TransitionConflict { .. } => (StatusCode::CONFLICT, "transition_conflict"),
            CoreError::CommandFailed { .. } => (StatusCode::BAD_GATEWAY, "command_failed"),
            CoreError::Api(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            CoreError::CacheType { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ShellError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// SESSION AND ROUTING
// ============================================================================

pub async fn api_session(State(state): Shared) -> Json<SessionSnapshot> {
    Json(state.core.snapshot())
}

/// Re-run identity resolution against the backend
pub async fn api_session_resolve(State(state): Shared) -> ShellResult<SessionSnapshot> {
    Ok(Json(state.core.resolve_identity().await?))
}

pub async fn api_session_logout(State(state): Shared) -> Json<SessionSnapshot> {
    state.core.logout().await;
    Json(state.core.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub path: Option<String>,
}

pub async fn api_route(
    State(state): Shared,
    Query(query): Query<RouteQuery>,
) -> Json<RouteResolution> {
    let path = query.path.unwrap_or_else(|| "/".to_string());
    Json(state.core.route(&path))
}

pub async fn api_features(State(state): Shared) -> Json<Vec<FlagState>> {
    Json(state.core.flags().list_all())
}

// ============================================================================
// TRADING CONTROL
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub result: ToggleOutcome,
    pub view: TradingView,
}

pub async fn api_trading(State(state): Shared) -> ShellResult<TradingView> {
    let session = state.session().await?;
    Ok(Json(session.control.view()))
}

pub async fn api_trading_pause(State(state): Shared) -> ShellResult<ControlResponse> {
    let session = state.session().await?;
    let result = session.control.pause().await?;
    Ok(Json(ControlResponse {
        result,
        view: session.control.view(),
    }))
}

pub async fn api_trading_resume(State(state): Shared) -> ShellResult<ControlResponse> {
    let session = state.session().await?;
    let result = session.control.resume().await?;
    Ok(Json(ControlResponse {
        result,
        view: session.control.view(),
    }))
}

pub async fn api_trading_toggle(State(state): Shared) -> ShellResult<ControlResponse> {
    let session = state.session().await?;
    let result = session.control.toggle().await?;
    Ok(Json(ControlResponse {
        result,
        view: session.control.view(),
    }))
}

pub async fn api_emergency_stop(State(state): Shared) -> ShellResult<ControlResponse> {
    let session = state.session().await?;
    let result = session.control.emergency_stop().await?;
    Ok(Json(ControlResponse {
        result,
        view: session.control.view(),
    }))
}

// ============================================================================
// NOTICES
// ============================================================================

pub async fn api_notices(State(state): Shared) -> Json<Vec<Notice>> {
    Json(state.core.notices().active())
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub id: u64,
    pub dismissed: bool,
}

pub async fn api_dismiss_notice(
    State(state): Shared,
    Path(id): Path<u64>,
) -> Json<DismissResponse> {
    Json(DismissResponse {
        id,
        dismissed: state.core.notices().dismiss(id),
    })
}

// ============================================================================
// READ MODELS
// ============================================================================

pub async fn api_watchlist(State(state): Shared) -> ShellResult<Vec<WatchlistItem>> {
    let session = state.session().await?;
    Ok(Json(session.read_models.watchlist().await?))
}

#[derive(Debug, Deserialize)]
pub struct WatchlistAdd {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct SymbolResponse {
    pub symbol: String,
}

pub async fn api_watchlist_add(
    State(state): Shared,
    Json(request): Json<WatchlistAdd>,
) -> ShellResult<SymbolResponse> {
    let session = state.session().await?;
    let symbol = session.read_models.add_to_watchlist(&request.symbol).await?;
    Ok(Json(SymbolResponse { symbol }))
}

pub async fn api_watchlist_remove(
    State(state): Shared,
    Path(symbol): Path<String>,
) -> ShellResult<SymbolResponse> {
    let session = state.session().await?;
    let symbol = session.read_models.remove_from_watchlist(&symbol).await?;
    Ok(Json(SymbolResponse { symbol }))
}

pub async fn api_briefing(State(state): Shared) -> ShellResult<Option<Briefing>> {
    let session = state.session().await?;
    Ok(Json(session.read_models.briefing().await?))
}

/// Generate a new briefing and return it
pub async fn api_briefing_generate(State(state): Shared) -> ShellResult<Option<Briefing>> {
    let session = state.session().await?;
    session.read_models.generate_briefing().await?;
    Ok(Json(session.read_models.briefing().await?))
}

pub async fn api_dna(State(state): Shared) -> ShellResult<Option<DnaProfile>> {
    let session = state.session().await?;
    Ok(Json(session.read_models.dna_profile().await?))
}

pub async fn api_orders(State(state): Shared) -> ShellResult<Vec<Order>> {
    let session = state.session().await?;
    Ok(Json(session.read_models.orders().await?))
}

/// SSE events endpoint
pub async fn api_events(State(state): Shared) -> impl IntoResponse {
    create_sse_stream(state)
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub authenticated: bool,
    pub subscribers: usize,
}

pub async fn health_check(State(state): Shared) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        authenticated: state.core.snapshot().is_authenticated,
        subscribers: state.core.bus().subscriber_count(),
    })
}
