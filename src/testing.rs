//! In-memory backend used by unit tests.

use crate::api::{ApiResult, DashboardApi};
use crate::error::ApiError;
use crate::types::{Briefing, DnaProfile, Order, RiskLevel, RiskStatus, User, WatchlistItem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct FakeState {
    user: Option<User>,
    identity_failures: u32,
    paused: HashMap<String, bool>,
    risk_level: HashMap<String, RiskLevel>,
    status_fetches: HashMap<String, usize>,
    commands: Vec<String>,
    fail_commands: bool,
    fail_status: bool,
    ignore_commands: bool,
    latency_ms: u64,
    command_gate: Option<Arc<Notify>>,
    watchlist: HashMap<String, Vec<String>>,
    briefings: HashMap<String, Briefing>,
    dna: HashMap<String, DnaProfile>,
    orders: HashMap<String, Vec<Order>>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_user(&self, id: &str) {
        self.with(|s| {
            s.user = Some(User {
                id: id.to_string(),
                email: None,
                first_name: None,
                last_name: None,
            })
        });
    }

    /// Fail the next `n` identity lookups with a transport error
    pub fn fail_identity(&self, n: u32) {
        self.with(|s| s.identity_failures = n);
    }

    pub fn set_paused(&self, user_id: &str, paused: bool) {
        self.with(|s| s.paused.insert(user_id.to_string(), paused));
    }

    pub fn set_risk_level(&self, user_id: &str, level: RiskLevel) {
        self.with(|s| s.risk_level.insert(user_id.to_string(), level));
    }

    pub fn set_latency_ms(&self, ms: u64) {
        self.with(|s| s.latency_ms = ms);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.with(|s| s.fail_commands = fail);
    }

    pub fn fail_status(&self, fail: bool) {
        self.with(|s| s.fail_status = fail);
    }

    /// Acknowledge commands without changing server state
    pub fn ignore_commands(&self, ignore: bool) {
        self.with(|s| s.ignore_commands = ignore);
    }

    /// Block commands until the returned handle is notified
    pub fn hold_commands(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with(|s| s.command_gate = Some(gate.clone()));
        gate
    }

    pub fn release_commands(&self) {
        self.with(|s| s.command_gate = None);
    }

    pub fn set_briefing(&self, user_id: &str, content: serde_json::Value) {
        self.with(|s| {
            s.briefings.insert(
                user_id.to_string(),
                Briefing {
                    id: Some("b1".to_string()),
                    user_id: Some(user_id.to_string()),
                    content,
                    created_at: None,
                },
            )
        });
    }

    pub fn status_fetches(&self, user_id: &str) -> usize {
        self.with(|s| s.status_fetches.get(user_id).copied().unwrap_or(0))
    }

    pub fn commands(&self) -> Vec<String> {
        self.with(|s| s.commands.clone())
    }

    pub fn watchlist_symbols(&self, user_id: &str) -> Vec<String> {
        self.with(|s| s.watchlist.get(user_id).cloned().unwrap_or_default())
    }

    async fn delay(&self) {
        let ms = self.with(|s| s.latency_ms);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn command(&self, name: &str, user_id: &str, paused: bool) -> ApiResult<()> {
        let gate = self.with(|s| {
            s.commands.push(format!("{}:{}", name, user_id));
            s.command_gate.clone()
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.delay().await;

        self.with(|s| {
            if s.fail_commands {
                return Err(ApiError::Status {
                    status: 500,
                    body: "risk service unavailable".to_string(),
                });
            }
            if !s.ignore_commands {
                s.paused.insert(user_id.to_string(), paused);
            }
            Ok(())
        })
    }
}

fn failure() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn current_user(&self) -> ApiResult<Option<User>> {
        self.with(|s| {
            if s.identity_failures > 0 {
                s.identity_failures -= 1;
                return Err(ApiError::Transport("connection refused".to_string()));
            }
            Ok(s.user.clone())
        })
    }

    async fn risk_status(&self, user_id: &str) -> ApiResult<RiskStatus> {
        self.with(|s| *s.status_fetches.entry(user_id.to_string()).or_insert(0) += 1);
        self.delay().await;

        self.with(|s| {
            if s.fail_status {
                return Err(failure());
            }
            let mut status = RiskStatus::default_for(user_id);
            if let Some(&paused) = s.paused.get(user_id) {
                status.trading_paused = paused;
                status.status = if paused { "paused" } else { "active" }.to_string();
            }
            if let Some(&level) = s.risk_level.get(user_id) {
                status.risk_level = level;
            }
            Ok(status)
        })
    }

    async fn pause_trading(&self, user_id: &str) -> ApiResult<()> {
        self.command("pause", user_id, true).await
    }

    async fn resume_trading(&self, user_id: &str) -> ApiResult<()> {
        self.command("resume", user_id, false).await
    }

    async fn watchlist(&self, user_id: &str) -> ApiResult<Vec<WatchlistItem>> {
        Ok(self.with(|s| {
            s.watchlist
                .get(user_id)
                .map(|symbols| {
                    symbols
                        .iter()
                        .map(|symbol| WatchlistItem {
                            id: None,
                            symbol: symbol.clone(),
                            name: None,
                            price: None,
                            change_percent: None,
                            added_at: None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    async fn add_to_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()> {
        self.with(|s| {
            if s.fail_commands {
                return Err(failure());
            }
            s.watchlist
                .entry(user_id.to_string())
                .or_default()
                .push(symbol.to_string());
            Ok(())
        })
    }

    async fn remove_from_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()> {
        self.with(|s| {
            if s.fail_commands {
                return Err(failure());
            }
            if let Some(list) = s.watchlist.get_mut(user_id) {
                list.retain(|sym| sym != symbol);
            }
            Ok(())
        })
    }

    async fn briefing(&self, user_id: &str) -> ApiResult<Option<Briefing>> {
        Ok(self.with(|s| s.briefings.get(user_id).cloned()))
    }

    async fn generate_briefing(&self, user_id: &str) -> ApiResult<()> {
        self.with(|s| {
            if s.fail_commands {
                return Err(failure());
            }
            s.commands.push(format!("briefing:{}", user_id));
            Ok(())
        })?;
        self.set_briefing(user_id, serde_json::json!({ "summary": "generated" }));
        Ok(())
    }

    async fn dna_profile(&self, user_id: &str) -> ApiResult<Option<DnaProfile>> {
        Ok(self.with(|s| s.dna.get(user_id).cloned()))
    }

    async fn orders(&self, user_id: &str) -> ApiResult<Vec<Order>> {
        Ok(self.with(|s| s.orders.get(user_id).cloned().unwrap_or_default()))
    }
}
