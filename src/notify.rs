//! Uniform notification channel.
//!
//! Every user-visible failure is raised here as a [`Notice`]: non-blocking,
//! dismissible, and broadcast to all surfaces over the [`EventBus`].

use crate::events::{CoreEvent, EventBus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Oldest notices are dropped beyond this many
const MAX_ACTIVE_NOTICES: usize = 50;

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Active notices plus the broadcast side of the channel
pub struct NoticeBoard {
    bus: EventBus,
    notices: Mutex<Vec<Notice>>,
    next_id: AtomicU64,
}

impl NoticeBoard {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            notices: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Raise a notice and return its id
    pub fn raise(&self, level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> u64 {
        let notice = Notice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            level,
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
        };
        let id = notice.id;

        match level {
            NoticeLevel::Error => tracing::error!("{}: {}", notice.title, notice.message),
            NoticeLevel::Warning => tracing::warn!("{}: {}", notice.title, notice.message),
            NoticeLevel::Info => tracing::info!("{}: {}", notice.title, notice.message),
        }

        {
            let mut notices = self.notices.lock().unwrap_or_else(PoisonError::into_inner);
            notices.push(notice.clone());
            if notices.len() > MAX_ACTIVE_NOTICES {
                notices.remove(0);
            }
        }

        self.bus.publish(CoreEvent::Notice(notice));
        id
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.raise(NoticeLevel::Info, title, message)
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.raise(NoticeLevel::Error, title, message)
    }

    /// Dismiss a notice. Returns false if it was not active.
    pub fn dismiss(&self, id: u64) -> bool {
        let removed = {
            let mut notices = self.notices.lock().unwrap_or_else(PoisonError::into_inner);
            let before = notices.len();
            notices.retain(|n| n.id != id);
            notices.len() != before
        };

        if removed {
            self.bus.publish(CoreEvent::NoticeDismissed { id });
        }
        removed
    }

    /// Active notices, oldest first
    pub fn active(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_at_level(&self, level: NoticeLevel) -> usize {
        self.active().iter().filter(|n| n.level == level).count()
    }
}
