//! Keyed, invalidation-driven cache of server read models.
//!
//! Readers go through [`QueryCache::read`], which serves the stored value when it
//! is present and fresh, and otherwise runs the supplied fetcher. Concurrent
//! readers of the same key share a single in-flight fetch.
//!
//! Mutations never write values: they call [`QueryCache::invalidate`] and the
//! next read re-fetches. Every fetch is stamped with a sequence number when it
//! starts; a completion older than the stored value is discarded, and a
//! completion that started before the latest invalidation is stored but left
//! stale.

use crate::error::{ApiError, CoreError, CoreResult};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, ApiError>>>;

/// Ordered tuple of strings identifying a read model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn risk_status(user_id: &str) -> Self {
        Self::new(["risk-status", user_id])
    }

    pub fn watchlist(user_id: &str) -> Self {
        Self::new(["watchlist", user_id])
    }

    pub fn briefing(user_id: &str) -> Self {
        Self::new(["briefing", user_id])
    }

    pub fn dna(user_id: &str) -> Self {
        Self::new(["dna", user_id])
    }

    pub fn orders(user_id: &str) -> Self {
        Self::new(["orders", user_id])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether this key begins with `prefix`
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.0.len() && self.0.iter().zip(prefix).all(|(a, b)| a == b)
    }

    /// The user this key belongs to. Per-user keys are `[kind, user_id, ..]`.
    pub fn user_id(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Typed view of a stored entry
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    pub value: Option<T>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[derive(Default)]
struct Entry {
    value: Option<CachedValue>,
    fetched_at: Option<DateTime<Utc>>,
    stored_seq: u64,
    invalidated_seq: u64,
    stale: bool,
}

struct InFlight {
    seq: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
    next_seq: u64,
}

impl Inner {
    fn store(&mut self, key: &QueryKey, seq: u64, value: CachedValue) {
        let entry = self.entries.entry(key.clone()).or_default();
        if seq <= entry.stored_seq {
            debug!("Discarding out-of-date fetch #{} for {}", seq, key);
            return;
        }
        entry.value = Some(value);
        entry.stored_seq = seq;
        entry.fetched_at = Some(Utc::now());
        entry.stale = entry.invalidated_seq >= seq;
    }
}

/// Shared read-model cache
#[derive(Default)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
    fetches_started: AtomicU64,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn downcast<T: Clone + 'static>(key: &QueryKey, value: &CachedValue) -> CoreResult<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| CoreError::CacheType {
            key: key.to_string(),
        })
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read through the cache, fetching when the entry is absent or stale
    pub async fn read<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> CoreResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetch = {
            let mut inner = lock(&self.inner);

            if let Some(value) = inner
                .entries
                .get(key)
                .filter(|e| !e.stale)
                .and_then(|e| e.value.as_ref())
            {
                return downcast(key, value);
            }

            if let Some(in_flight) = inner.in_flight.get(key) {
                debug!("Joining in-flight fetch #{} for {}", in_flight.seq, key);
                in_flight.fetch.clone()
            } else {
                inner.next_seq += 1;
                let seq = inner.next_seq;
                let fetch = Self::start_fetch(self.inner.clone(), key.clone(), seq, fetcher());
                inner.in_flight.insert(
                    key.clone(),
                    InFlight {
                        seq,
                        fetch: fetch.clone(),
                    },
                );
                self.fetches_started.fetch_add(1, Ordering::Relaxed);
                debug!("Started fetch #{} for {}", seq, key);
                fetch
            }
        };

        let value = fetch.await?;
        downcast(key, &value)
    }

    fn start_fetch<T, Fut>(
        inner: Arc<Mutex<Inner>>,
        key: QueryKey,
        seq: u64,
        fetch: Fut,
    ) -> SharedFetch
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        async move {
            let result = fetch.await.map(|v| Arc::new(v) as CachedValue);

            let mut guard = lock(&inner);
            if guard.in_flight.get(&key).map(|f| f.seq) == Some(seq) {
                guard.in_flight.remove(&key);
            }
            match &result {
                Ok(value) => guard.store(&key, seq, value.clone()),
                Err(e) => debug!("Fetch #{} for {} failed: {}", seq, key, e),
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Mark an entry stale so the next read re-fetches. An in-flight fetch for
    /// the key is detached; its result can no longer be joined.
    pub fn invalidate(&self, key: &QueryKey) {
        let mut inner = lock(&self.inner);
        let marker = inner.next_seq;
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.stale = true;
        entry.invalidated_seq = marker;
        inner.in_flight.remove(key);
        debug!("Invalidated {}", key);
    }

    /// Invalidate every key beginning with `prefix`
    pub fn invalidate_prefix(&self, prefix: &[&str]) {
        let keys: Vec<QueryKey> = {
            let inner = lock(&self.inner);
            inner
                .entries
                .keys()
                .chain(inner.in_flight.keys())
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        };
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Invalidate every key owned by `user_id`
    pub fn invalidate_user(&self, user_id: &str) {
        let keys: Vec<QueryKey> = {
            let inner = lock(&self.inner);
            inner
                .entries
                .keys()
                .chain(inner.in_flight.keys())
                .filter(|k| k.user_id() == Some(user_id))
                .cloned()
                .collect()
        };
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Inspect an entry without fetching
    pub fn peek<T: Clone + 'static>(&self, key: &QueryKey) -> CoreResult<Option<CacheEntry<T>>> {
        let inner = lock(&self.inner);
        let Some(entry) = inner.entries.get(key) else {
            return Ok(None);
        };
        let value = entry
            .value
            .as_ref()
            .map(|v| downcast::<T>(key, v))
            .transpose()?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            value,
            fetched_at: entry.fetched_at,
            stale: entry.stale,
        }))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        lock(&self.inner).in_flight.contains_key(key)
    }

    /// Number of fetches started since creation
    pub fn fetch_count(&self) -> u64 {
        self.fetches_started.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.in_flight.clear();
    }
}
