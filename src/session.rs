//! Session lifecycle.
//!
//! [`SessionManager`] owns the process-wide pieces (transport, cache, flags,
//! auth gate, notices, event bus) and builds a [`UserSession`] only once the
//! gate reports `authenticated`. Identity resolution is performed here, outside
//! the gate, and its outcome is handed to the gate.

use crate::api::DashboardApi;
use crate::auth::{AuthGate, AuthState, SessionSnapshot};
use crate::cache::QueryCache;
use crate::control::TradingControl;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBus;
use crate::flags::FeatureFlags;
use crate::notify::NoticeBoard;
use crate::read_models::ReadModels;
use crate::risk::RiskStatusStore;
use crate::routes::{RouteResolution, RouteTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Attempts made by [`SessionManager::bootstrap`] before giving up
const MAX_RESOLVE_ATTEMPTS: u32 = 5;

/// Initial backoff between identity resolution attempts (milliseconds)
const INITIAL_BACKOFF_MS: u64 = 500;

const MAX_BACKOFF_MS: u64 = 8000;

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Components that exist only for an authenticated user
pub struct UserSession {
    pub user_id: String,
    pub control: TradingControl,
    pub read_models: ReadModels,
}

pub struct SessionManager {
    api: Arc<dyn DashboardApi>,
    cache: Arc<QueryCache>,
    flags: Arc<FeatureFlags>,
    routes: RouteTable,
    auth: AuthGate,
    notices: Arc<NoticeBoard>,
    bus: EventBus,
    session: RwLock<Option<Arc<UserSession>>>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn DashboardApi>, flags: FeatureFlags) -> Self {
        let bus = EventBus::new();
        Self {
            api,
            cache: Arc::new(QueryCache::new()),
            routes: RouteTable::new(&flags),
            flags: Arc::new(flags),
            auth: AuthGate::new(bus.clone()),
            notices: Arc::new(NoticeBoard::new(bus.clone())),
            bus,
            session: RwLock::new(None),
        }
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.auth.session()
    }

    /// Resolve `path` against the current authentication state
    pub fn route(&self, path: &str) -> RouteResolution {
        self.routes.resolve(&self.auth.state(), path)
    }

    /// Ask the backend who we are and feed the answer to the gate.
    ///
    /// On transport failure the gate stays `loading` and the error is returned
    /// so the caller can retry.
    pub async fn resolve_identity(&self) -> CoreResult<SessionSnapshot> {
        let ticket = self.auth.begin_resolution();
        self.end_session().await;

        let user = self.api.current_user().await?;
        if self.auth.complete_resolution(ticket, user) {
            if let Err(e) = self.session().await {
                warn!("[SESSION] Could not start user session yet: {}", e);
            }
        }
        Ok(self.auth.session())
    }

    /// Resolve identity at startup, retrying transport failures with
    /// exponential backoff. The gate stays `loading` until one attempt succeeds.
    pub async fn bootstrap(&self) -> CoreResult<SessionSnapshot> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            match self.resolve_identity().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempt < MAX_RESOLVE_ATTEMPTS => {
                    warn!(
                        "[SESSION] Identity resolution failed (attempt {}): {}, retrying in {}ms",
                        attempt, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms as f64 * BACKOFF_MULTIPLIER)
                        .min(MAX_BACKOFF_MS as f64) as u64;
                }
                Err(e) => {
                    error!(
                        "[SESSION] Identity resolution failed after {} attempts: {}",
                        MAX_RESOLVE_ATTEMPTS, e
                    );
                    return Err(e);
                }
            }
        }

        Err(CoreError::AuthUnresolved)
    }

    /// The authenticated user's session, built on first use
    pub async fn session(&self) -> CoreResult<Arc<UserSession>> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let user_id = self.auth.require_user()?;
        let session = Arc::new(self.start_session(&user_id).await?);

        // Identity may have changed while the status was being read
        if self.auth.require_user().ok().as_deref() != Some(user_id.as_str()) {
            return Err(CoreError::AuthUnresolved);
        }

        *slot = Some(session.clone());
        info!("[SESSION] Started session for {}", user_id);
        Ok(session)
    }

    async fn start_session(&self, user_id: &str) -> CoreResult<UserSession> {
        let store = RiskStatusStore::new(self.api.clone(), self.cache.clone());
        let control = TradingControl::connect(
            user_id,
            self.api.clone(),
            store,
            self.notices.clone(),
            self.bus.clone(),
        )
        .await?;

        Ok(UserSession {
            user_id: user_id.to_string(),
            control,
            read_models: ReadModels::new(
                user_id,
                self.api.clone(),
                self.cache.clone(),
                self.flags.clone(),
            ),
        })
    }

    /// Session if one is already running; never builds one
    pub async fn current_session(&self) -> Option<Arc<UserSession>> {
        self.session.read().await.clone()
    }

    async fn end_session(&self) {
        if let Some(session) = self.session.write().await.take() {
            info!("[SESSION] Ended session for {}", session.user_id);
        }
        self.cache.clear();
    }

    pub async fn logout(&self) {
        self.auth.logout();
        self.end_session().await;
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }
}
