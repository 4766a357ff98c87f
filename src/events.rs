//! Broadcast channel carrying state changes to every observer.
//!
//! All UI surfaces subscribe to the same bus and read the same stores, so no
//! surface holds its own copy of the trading state.

use crate::auth::SessionSnapshot;
use crate::control::TradingView;
use crate::notify::Notice;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Event published by the core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum CoreEvent {
    #[serde(rename = "session")]
    Session(SessionSnapshot),
    #[serde(rename = "trading")]
    Trading(TradingView),
    #[serde(rename = "notice")]
    Notice(Notice),
    #[serde(rename = "notice_dismissed")]
    NoticeDismissed { id: u64 },
}

impl CoreEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Session(_) => "session",
            CoreEvent::Trading(_) => "trading",
            CoreEvent::Notice(_) => "notice",
            CoreEvent::NoticeDismissed { .. } => "notice_dismissed",
        }
    }
}

/// Cloneable handle to the broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
