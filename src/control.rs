//! Pause/resume control with optimistic updates.
//!
//! Per user session the control is `active`, `paused` or `transitioning`. A
//! pause or resume flips the displayed state immediately, sends the command,
//! and then either settles on the new state (invalidating the cached risk
//! status and re-reading it) or rolls back and raises an error notice.
//!
//! While a transition is in flight every further toggle is rejected with
//! [`CoreError::TransitionConflict`]; requests are never queued. The state check
//! happens under a synchronous lock that is never held across an await. The
//! command itself runs on a spawned task, so the transition ends only when the
//! backend has answered, never because the caller went away.
//!
//! Risk level is carried through to the view for display only. It never takes
//! part in deciding whether a transition is allowed.

use crate::api::DashboardApi;
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::notify::NoticeBoard;
use crate::risk::RiskStatusStore;
use crate::types::{RiskLevel, RiskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingState {
    Active,
    Paused,
    Transitioning,
}

impl TradingState {
    fn settled(paused: bool) -> Self {
        if paused {
            TradingState::Paused
        } else {
            TradingState::Active
        }
    }
}

impl std::fmt::Display for TradingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingState::Active => write!(f, "active"),
            TradingState::Paused => write!(f, "paused"),
            TradingState::Transitioning => write!(f, "transitioning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
        }
    }

    fn target(&self) -> TradingState {
        match self {
            ControlCommand::Pause => TradingState::Paused,
            ControlCommand::Resume => TradingState::Active,
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            ControlCommand::Pause => "Failed to pause trading",
            ControlCommand::Resume => "Failed to resume trading",
        }
    }
}

/// Result of a toggle request that was not rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "state", rename_all = "lowercase")]
pub enum ToggleOutcome {
    /// The command was confirmed by the server
    Applied(TradingState),
    /// Already in the requested state; nothing was sent
    Unchanged(TradingState),
}

/// What every control surface renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingView {
    pub user_id: String,
    pub state: TradingState,
    /// Displayed pause state; optimistic while a transition is pending
    pub trading_paused: bool,
    pub pending: Option<ControlCommand>,
    pub headline: String,
    pub risk_level: RiskLevel,
    pub risk_label: String,
    pub status_message: String,
    pub updated_at: DateTime<Utc>,
}

struct ControlInner {
    state: TradingState,
    pending: Option<ControlCommand>,
    status: RiskStatus,
    /// Bumped whenever a transition starts; stale reconciliations are dropped
    epoch: u64,
    updated_at: DateTime<Utc>,
}

/// State shared by the control handle and its in-flight command tasks
struct ControlCore {
    user_id: String,
    api: Arc<dyn DashboardApi>,
    store: RiskStatusStore,
    notices: Arc<NoticeBoard>,
    bus: EventBus,
    inner: Mutex<ControlInner>,
}

/// Trading control for one authenticated user.
///
/// Each command runs on its own task. A caller that stops waiting (a dropped
/// HTTP request, an aborted task) does not end the transition: the lock stays
/// held until the backend answers and the task settles.
pub struct TradingControl {
    core: Arc<ControlCore>,
}

/// Restores the pre-transition state if the command task is torn down before
/// it settles (panic or runtime shutdown).
struct TransitionGuard {
    core: Arc<ControlCore>,
    from: TradingState,
    armed: bool,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Transition for {} torn down before settling, restoring {}",
                self.core.user_id, self.from
            );
            self.core.store.invalidate(&self.core.user_id);
            self.core.settle(self.from);
        }
    }
}

impl TradingControl {
    /// Build the control, deriving the initial state from the server status
    pub async fn connect(
        user_id: &str,
        api: Arc<dyn DashboardApi>,
        store: RiskStatusStore,
        notices: Arc<NoticeBoard>,
        bus: EventBus,
    ) -> CoreResult<Self> {
        let status = store.status(user_id).await?;
        info!(
            "[CONTROL] {} starts {} (risk {})",
            user_id,
            TradingState::settled(status.trading_paused),
            status.risk_level
        );

        let core = Arc::new(ControlCore {
            user_id: user_id.to_string(),
            api,
            store,
            notices,
            bus,
            inner: Mutex::new(ControlInner {
                state: TradingState::settled(status.trading_paused),
                pending: None,
                status,
                epoch: 0,
                updated_at: Utc::now(),
            }),
        });
        core.publish();
        Ok(Self { core })
    }

    pub fn user_id(&self) -> &str {
        &self.core.user_id
    }

    pub fn state(&self) -> TradingState {
        self.core.lock().state
    }

    pub fn view(&self) -> TradingView {
        self.core.view()
    }

    pub async fn pause(&self) -> CoreResult<ToggleOutcome> {
        self.run(ControlCommand::Pause).await
    }

    pub async fn resume(&self) -> CoreResult<ToggleOutcome> {
        self.run(ControlCommand::Resume).await
    }

    /// Emergency stop is the same pause, reached from a different surface
    pub async fn emergency_stop(&self) -> CoreResult<ToggleOutcome> {
        warn!("[CONTROL] Emergency stop requested for {}", self.core.user_id);
        self.pause().await
    }

    /// Pause when active, resume when paused
    pub async fn toggle(&self) -> CoreResult<ToggleOutcome> {
        let command = match self.state() {
            TradingState::Active => ControlCommand::Pause,
            TradingState::Paused => ControlCommand::Resume,
            TradingState::Transitioning => return Err(self.core.conflict()),
        };
        self.run(command).await
    }

    async fn run(&self, command: ControlCommand) -> CoreResult<ToggleOutcome> {
        let from = {
            let mut inner = self.core.lock();
            let current = inner.state;
            match current {
                TradingState::Transitioning => {
                    drop(inner);
                    return Err(self.core.conflict());
                }
                state if state == command.target() => {
                    debug!("{} already {}, nothing to do", self.core.user_id, state);
                    return Ok(ToggleOutcome::Unchanged(state));
                }
                state => {
                    inner.state = TradingState::Transitioning;
                    inner.pending = Some(command);
                    inner.epoch += 1;
                    inner.updated_at = Utc::now();
                    state
                }
            }
        };
        self.core.publish();
        info!(
            "[CONTROL] {} {} -> {}",
            command.as_str(),
            from,
            command.target()
        );

        let task = tokio::spawn(self.core.clone().execute(command, from));
        match task.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::CommandFailed {
                command: command.as_str().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Invalidate and re-read the server status
    pub async fn refresh(&self) -> CoreResult<TradingView> {
        let epoch = self.core.lock().epoch;
        self.core.store.invalidate(&self.core.user_id);
        let status = self.core.store.status(&self.core.user_id).await?;
        self.core.apply_status(epoch, status);
        Ok(self.view())
    }
}

impl ControlCore {
    fn lock(&self) -> MutexGuard<'_, ControlInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> TradingView {
        let inner = self.lock();
        let trading_paused = match (inner.state, inner.pending) {
            (TradingState::Transitioning, Some(cmd)) => cmd.target() == TradingState::Paused,
            (state, _) => state == TradingState::Paused,
        };

        TradingView {
            user_id: self.user_id.clone(),
            state: inner.state,
            trading_paused,
            pending: inner.pending,
            headline: if trading_paused {
                "Trading Paused".to_string()
            } else {
                "Trading Active".to_string()
            },
            risk_level: inner.status.risk_level,
            risk_label: inner.status.risk_level.label().to_string(),
            status_message: inner.status.status_message.clone(),
            updated_at: inner.updated_at,
        }
    }

    fn publish(&self) {
        self.bus.publish(CoreEvent::Trading(self.view()));
    }

    fn conflict(&self) -> CoreError {
        warn!(
            "[CONTROL] Rejected toggle for {}: transition in flight",
            self.user_id
        );
        CoreError::TransitionConflict {
            user_id: self.user_id.clone(),
        }
    }

    /// Send the command and settle. Owns the transition until it returns.
    async fn execute(
        self: Arc<Self>,
        command: ControlCommand,
        from: TradingState,
    ) -> CoreResult<ToggleOutcome> {
        let mut guard = TransitionGuard {
            core: self.clone(),
            from,
            armed: true,
        };

        let result = match command {
            ControlCommand::Pause => self.api.pause_trading(&self.user_id).await,
            ControlCommand::Resume => self.api.resume_trading(&self.user_id).await,
        };
        guard.armed = false;

        match result {
            Ok(()) => {
                self.store.invalidate(&self.user_id);
                self.settle(command.target());
                self.reconcile().await;
                Ok(ToggleOutcome::Applied(command.target()))
            }
            Err(e) => {
                self.settle(from);
                self.notices.error(command.failure_title(), e.to_string());
                Err(CoreError::CommandFailed {
                    command: command.as_str().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn settle(&self, state: TradingState) {
        {
            let mut inner = self.lock();
            inner.state = state;
            inner.pending = None;
            inner.updated_at = Utc::now();
        }
        debug!("{} settled {}", self.user_id, state);
        self.publish();
    }

    /// Re-read the server status and adopt it unless a transition has started
    /// since the read began.
    async fn reconcile(&self) {
        let epoch = self.lock().epoch;
        match self.store.status(&self.user_id).await {
            Ok(status) => self.apply_status(epoch, status),
            Err(e) => warn!("Could not re-read risk status for {}: {}", self.user_id, e),
        }
    }

    fn apply_status(&self, epoch: u64, status: RiskStatus) {
        {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.state == TradingState::Transitioning {
                debug!("Dropping status read for {} taken before a newer transition", self.user_id);
                return;
            }

            let server = TradingState::settled(status.trading_paused);
            if inner.state != server {
                info!(
                    "[CONTROL] {} reconciled {} -> {} from server",
                    self.user_id, inner.state, server
                );
                inner.state = server;
                inner.updated_at = Utc::now();
            }
            inner.status = status;
        }
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::notify::NoticeLevel;
    use crate::testing::FakeApi;

    struct Harness {
        api: Arc<FakeApi>,
        notices: Arc<NoticeBoard>,
        bus: EventBus,
        control: Arc<TradingControl>,
    }

    async fn harness(paused: bool) -> Harness {
        let api = Arc::new(FakeApi::new());
        api.set_paused("u1", paused);
        let bus = EventBus::new();
        let notices = Arc::new(NoticeBoard::new(bus.clone()));
        let store = RiskStatusStore::new(api.clone(), Arc::new(QueryCache::new()));
        let control = TradingControl::connect("u1", api.clone(), store, notices.clone(), bus.clone())
            .await
            .unwrap();
        Harness {
            api,
            notices,
            bus,
            control: Arc::new(control),
        }
    }

    async fn wait_for_transition(control: &TradingControl) {
        while control.state() != TradingState::Transitioning {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_initial_state_from_status() {
        assert_eq!(harness(false).await.control.state(), TradingState::Active);
        assert_eq!(harness(true).await.control.state(), TradingState::Paused);
    }

    #[tokio::test]
    async fn test_pause_confirms_and_refetches() {
        let h = harness(false).await;

        let outcome = h.control.pause().await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Applied(TradingState::Paused));
        assert_eq!(h.control.state(), TradingState::Paused);
        assert_eq!(h.api.commands(), vec!["pause:u1"]);
        // initial read plus the re-read after invalidation
        assert_eq!(h.api.status_fetches("u1"), 2);

        let view = h.control.view();
        assert!(view.trading_paused);
        assert_eq!(view.headline, "Trading Paused");
        assert!(h.notices.active().is_empty());
    }

    #[tokio::test]
    async fn test_pause_when_paused_is_noop() {
        let h = harness(true).await;

        let outcome = h.control.pause().await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Unchanged(TradingState::Paused));
        assert!(h.api.commands().is_empty());

        let outcome = h.control.emergency_stop().await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Unchanged(TradingState::Paused));
        assert!(h.api.commands().is_empty());
    }

    #[tokio::test]
    async fn test_resume_when_active_is_noop() {
        let h = harness(false).await;
        let outcome = h.control.resume().await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Unchanged(TradingState::Active));
        assert!(h.api.commands().is_empty());
    }

    #[tokio::test]
    async fn test_second_toggle_rejected_while_transitioning() {
        let h = harness(false).await;
        let gate = h.api.hold_commands();

        let pending = {
            let control = h.control.clone();
            tokio::spawn(async move { control.pause().await })
        };
        wait_for_transition(&h.control).await;

        // optimistic flip is visible before the server answers
        let view = h.control.view();
        assert!(view.trading_paused);
        assert_eq!(view.headline, "Trading Paused");
        assert_eq!(view.pending, Some(ControlCommand::Pause));

        let rejected = h.control.resume().await;
        assert!(matches!(rejected, Err(CoreError::TransitionConflict { .. })));
        let rejected = h.control.toggle().await;
        assert!(matches!(rejected, Err(CoreError::TransitionConflict { .. })));
        assert_eq!(h.control.state(), TradingState::Transitioning);
        assert_eq!(h.api.commands(), vec!["pause:u1"]);

        gate.notify_one();
        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, ToggleOutcome::Applied(TradingState::Paused));
        assert_eq!(h.control.state(), TradingState::Paused);
    }

    #[tokio::test]
    async fn test_failed_pause_rolls_back_with_one_notice() {
        let h = harness(false).await;
        h.api.fail_commands(true);

        let result = h.control.pause().await;
        assert!(matches!(result, Err(CoreError::CommandFailed { .. })));
        assert_eq!(h.control.state(), TradingState::Active);
        assert!(!h.control.view().trading_paused);

        let notices = h.notices.active();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].title, "Failed to pause trading");
    }

    #[tokio::test]
    async fn test_failed_resume_rolls_back() {
        let h = harness(true).await;
        h.api.fail_commands(true);

        assert!(h.control.resume().await.is_err());
        assert_eq!(h.control.state(), TradingState::Paused);
        assert_eq!(h.notices.count_at_level(NoticeLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_risk_level_does_not_gate() {
        let api = Arc::new(FakeApi::new());
        api.set_risk_level("u1", RiskLevel::High);
        let bus = EventBus::new();
        let store = RiskStatusStore::new(api.clone(), Arc::new(QueryCache::new()));
        let control = TradingControl::connect(
            "u1",
            api.clone(),
            store,
            Arc::new(NoticeBoard::new(bus.clone())),
            bus,
        )
        .await
        .unwrap();

        assert_eq!(control.view().risk_label, "High Risk");
        control.pause().await.unwrap();
        assert_eq!(control.state(), TradingState::Paused);
        control.resume().await.unwrap();
        assert_eq!(control.state(), TradingState::Active);
    }

    #[tokio::test]
    async fn test_toggle_alternates() {
        let h = harness(false).await;
        h.control.toggle().await.unwrap();
        assert_eq!(h.control.state(), TradingState::Paused);
        h.control.toggle().await.unwrap();
        assert_eq!(h.control.state(), TradingState::Active);
        assert_eq!(h.api.commands(), vec!["pause:u1", "resume:u1"]);
    }

    #[tokio::test]
    async fn test_confirmation_converges_to_server_truth() {
        let h = harness(false).await;
        h.api.ignore_commands(true);

        h.control.pause().await.unwrap();
        // server acknowledged but still reports active
        assert_eq!(h.control.state(), TradingState::Active);
    }

    #[tokio::test]
    async fn test_abandoned_caller_keeps_transition_lock() {
        let h = harness(false).await;
        let gate = h.api.hold_commands();

        let pending = {
            let control = h.control.clone();
            tokio::spawn(async move { control.pause().await })
        };
        wait_for_transition(&h.control).await;

        pending.abort();
        let _ = pending.await;

        // the command is still in flight at the backend
        assert_eq!(h.control.state(), TradingState::Transitioning);
        assert!(h.control.view().trading_paused);
        assert!(matches!(
            h.control.pause().await,
            Err(CoreError::TransitionConflict { .. })
        ));
        assert!(matches!(
            h.control.toggle().await,
            Err(CoreError::TransitionConflict { .. })
        ));
        assert_eq!(h.api.commands(), vec!["pause:u1"]);

        gate.notify_one();
        while h.control.state() == TradingState::Transitioning {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.control.state(), TradingState::Paused);
        assert_eq!(h.api.commands(), vec!["pause:u1"]);
        assert!(h.notices.active().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_failing_command_still_rolls_back() {
        let h = harness(false).await;
        let gate = h.api.hold_commands();
        h.api.fail_commands(true);

        let pending = {
            let control = h.control.clone();
            tokio::spawn(async move { control.pause().await })
        };
        wait_for_transition(&h.control).await;
        pending.abort();
        let _ = pending.await;

        gate.notify_one();
        while h.control.state() == TradingState::Transitioning {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.control.state(), TradingState::Active);
        assert_eq!(h.notices.count_at_level(NoticeLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_change() {
        let h = harness(false).await;
        h.api.set_paused("u1", true);
        assert_eq!(h.control.state(), TradingState::Active);

        let view = h.control.refresh().await.unwrap();
        assert_eq!(view.state, TradingState::Paused);
        assert!(view.trading_paused);
    }

    #[tokio::test]
    async fn test_surfaces_observe_same_sequence() {
        let h = harness(false).await;
        let mut header = h.bus.subscribe();
        let mut banner = h.bus.subscribe();

        h.control.pause().await.unwrap();

        fn collect(
            rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>,
        ) -> Vec<(TradingState, bool)> {
            let mut views = Vec::new();
            while let Ok(CoreEvent::Trading(view)) = rx.try_recv() {
                views.push((view.state, view.trading_paused));
            }
            views
        }

        let header_views = collect(&mut header);
        let banner_views = collect(&mut banner);
        assert_eq!(header_views, banner_views);
        assert_eq!(header_views.first(), Some(&(TradingState::Transitioning, true)));
        assert_eq!(header_views.last(), Some(&(TradingState::Paused, true)));
    }
}
