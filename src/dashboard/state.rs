//! Shared state for the dashboard handlers.
//!
//! The shell holds no trading data of its own. Every handler reads through the
//! [`SessionManager`], so HTTP clients, SSE subscribers and the background
//! poller all observe the same stores.

use crate::error::CoreResult;
use crate::events::CoreEvent;
use crate::session::{SessionManager, UserSession};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub struct DashboardState {
    pub core: Arc<SessionManager>,
    /// Background risk-status refresh period; zero disables the poller
    pub status_refresh: Duration,
    started_at: Instant,
}

impl DashboardState {
    pub fn new(core: Arc<SessionManager>, status_refresh: Duration) -> Arc<Self> {
        Arc::new(Self {
            core,
            status_refresh,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.core.bus().subscribe()
    }

    /// Session of the authenticated user; errors map to 401 in the handlers
    pub async fn session(&self) -> CoreResult<Arc<UserSession>> {
        self.core.session().await
    }
}
