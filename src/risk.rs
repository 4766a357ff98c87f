//! Server-confirmed risk status, read through the query cache.

use crate::api::DashboardApi;
use crate::cache::{CacheEntry, QueryCache, QueryKey};
use crate::error::CoreResult;
use crate::types::RiskStatus;
use std::sync::Arc;

/// Lazily fetched, invalidation-driven view of a user's risk status
#[derive(Clone)]
pub struct RiskStatusStore {
    api: Arc<dyn DashboardApi>,
    cache: Arc<QueryCache>,
}

impl RiskStatusStore {
    pub fn new(api: Arc<dyn DashboardApi>, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    /// Current status, fetched when absent or invalidated.
    ///
    /// A user with no configured status reads as active and unpaused.
    pub async fn status(&self, user_id: &str) -> CoreResult<RiskStatus> {
        let api = self.api.clone();
        let user = user_id.to_string();
        self.cache
            .read(&QueryKey::risk_status(user_id), move || async move {
                api.risk_status(&user).await
            })
            .await
    }

    /// Mark the status stale; the next [`status`](Self::status) re-fetches
    pub fn invalidate(&self, user_id: &str) {
        self.cache.invalidate(&QueryKey::risk_status(user_id));
    }

    /// Last stored status without fetching
    pub fn cached(&self, user_id: &str) -> CoreResult<Option<CacheEntry<RiskStatus>>> {
        self.cache.peek(&QueryKey::risk_status(user_id))
    }
}
