//! Watchlist, briefing, DNA and order read models.
//!
//! All of them share the query cache contract with the risk status: reads go
//! through the cache, mutations call the backend and then invalidate the key.
//! Missing briefings and DNA profiles read as `None`, unlike the risk status,
//! which falls back to an active default.

use crate::api::DashboardApi;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{CoreError, CoreResult};
use crate::flags::{FeatureFlag, FeatureFlags};
use crate::types::{normalize_symbol, Briefing, DnaProfile, Order, WatchlistItem};
use std::sync::Arc;
use tracing::info;

/// Read models of one authenticated user
#[derive(Clone)]
pub struct ReadModels {
    user_id: String,
    api: Arc<dyn DashboardApi>,
    cache: Arc<QueryCache>,
    flags: Arc<FeatureFlags>,
}

impl ReadModels {
    pub fn new(
        user_id: &str,
        api: Arc<dyn DashboardApi>,
        cache: Arc<QueryCache>,
        flags: Arc<FeatureFlags>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            api,
            cache,
            flags,
        }
    }

    pub async fn watchlist(&self) -> CoreResult<Vec<WatchlistItem>> {
        let api = self.api.clone();
        let user = self.user_id.clone();
        self.cache
            .read(&QueryKey::watchlist(&self.user_id), move || async move {
                api.watchlist(&user).await
            })
            .await
    }

    /// Add a symbol; it is trimmed and uppercased before submission
    pub async fn add_to_watchlist(&self, symbol: &str) -> CoreResult<String> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| CoreError::InvalidInput("symbol must not be empty".to_string()))?;

        self.api.add_to_watchlist(&self.user_id, &symbol).await?;
        self.cache.invalidate(&QueryKey::watchlist(&self.user_id));
        info!("Added {} to watchlist of {}", symbol, self.user_id);
        Ok(symbol)
    }

    pub async fn remove_from_watchlist(&self, symbol: &str) -> CoreResult<String> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| CoreError::InvalidInput("symbol must not be empty".to_string()))?;

        self.api.remove_from_watchlist(&self.user_id, &symbol).await?;
        self.cache.invalidate(&QueryKey::watchlist(&self.user_id));
        info!("Removed {} from watchlist of {}", symbol, self.user_id);
        Ok(symbol)
    }

    /// Latest AI briefing, `None` if none exists yet
    pub async fn briefing(&self) -> CoreResult<Option<Briefing>> {
        self.flags.require_enabled(FeatureFlag::AiBriefing)?;
        let api = self.api.clone();
        let user = self.user_id.clone();
        self.cache
            .read(&QueryKey::briefing(&self.user_id), move || async move {
                api.briefing(&user).await
            })
            .await
    }

    /// Ask the backend for a new briefing
    pub async fn generate_briefing(&self) -> CoreResult<()> {
        self.flags.require_enabled(FeatureFlag::AiBriefing)?;
        self.api.generate_briefing(&self.user_id).await?;
        self.cache.invalidate(&QueryKey::briefing(&self.user_id));
        info!("Generated briefing for {}", self.user_id);
        Ok(())
    }

    pub async fn dna_profile(&self) -> CoreResult<Option<DnaProfile>> {
        self.flags.require_enabled(FeatureFlag::DnaStorage)?;
        let api = self.api.clone();
        let user = self.user_id.clone();
        self.cache
            .read(&QueryKey::dna(&self.user_id), move || async move {
                api.dna_profile(&user).await
            })
            .await
    }

    pub async fn orders(&self) -> CoreResult<Vec<Order>> {
        let api = self.api.clone();
        let user = self.user_id.clone();
        self.cache
            .read(&QueryKey::orders(&self.user_id), move || async move {
                api.orders(&user).await
            })
            .await
    }
}
