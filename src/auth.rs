//! Authentication gate.
//!
//! A three-state machine: `loading → {authenticated, unauthenticated}`. The gate
//! never resolves identity itself; a collaborator calls
//! [`AuthGate::begin_resolution`] and later [`AuthGate::complete_resolution`]
//! with whatever identity it found. Each resolution applies at most once, and
//! only if no newer resolution or logout has happened in the meantime.

use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Loading,
    Unauthenticated,
    Authenticated { user: User },
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user().map(|u| u.id.clone()),
            is_authenticated: self.is_authenticated(),
            is_loading: self.is_loading(),
        }
    }
}

/// Serializable session view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user_id: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

/// Identifies one identity resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTicket(u64);

pub struct AuthGate {
    state: watch::Sender<AuthState>,
    resolution: AtomicU64,
    bus: EventBus,
}

impl AuthGate {
    /// New gate in the `loading` state
    pub fn new(bus: EventBus) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            state,
            resolution: AtomicU64::new(0),
            bus,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.state.borrow().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Enter `loading` for a new identity resolution
    pub fn begin_resolution(&self) -> ResolutionTicket {
        let ticket = ResolutionTicket(self.resolution.fetch_add(1, Ordering::SeqCst) + 1);
        self.transition(AuthState::Loading);
        debug!("Identity resolution #{} started", ticket.0);
        ticket
    }

    /// Apply the outcome of a resolution. Returns false when the ticket is
    /// outdated or the resolution already completed.
    pub fn complete_resolution(&self, ticket: ResolutionTicket, identity: Option<User>) -> bool {
        if self.resolution.load(Ordering::SeqCst) != ticket.0 {
            debug!("Ignoring outdated identity resolution #{}", ticket.0);
            return false;
        }

        let next = match identity {
            Some(user) => AuthState::Authenticated { user },
            None => AuthState::Unauthenticated,
        };

        let applied = self.state.send_if_modified(|state| {
            if state.is_loading() {
                *state = next;
                true
            } else {
                false
            }
        });

        if applied {
            let session = self.session();
            info!(
                "[AUTH] Resolution #{} -> {}",
                ticket.0,
                session.user_id.as_deref().unwrap_or("unauthenticated")
            );
            self.bus.publish(CoreEvent::Session(session));
        } else {
            debug!("Identity resolution #{} already applied", ticket.0);
        }
        applied
    }

    /// Drop the identity. Any resolution still in flight is discarded.
    pub fn logout(&self) {
        self.resolution.fetch_add(1, Ordering::SeqCst);
        self.transition(AuthState::Unauthenticated);
        info!("[AUTH] Logged out");
    }

    /// User id of the authenticated session
    pub fn require_user(&self) -> CoreResult<String> {
        match &*self.state.borrow() {
            AuthState::Authenticated { user } => Ok(user.id.clone()),
            AuthState::Loading => Err(CoreError::AuthUnresolved),
            AuthState::Unauthenticated => Err(CoreError::Unauthenticated),
        }
    }

    fn transition(&self, next: AuthState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            self.bus.publish(CoreEvent::Session(self.session()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: None,
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_starts_loading() {
        let gate = AuthGate::new(EventBus::new());
        assert!(gate.state().is_loading());
        assert!(matches!(gate.require_user(), Err(CoreError::AuthUnresolved)));

        let session = gate.session();
        assert!(session.is_loading);
        assert!(!session.is_authenticated);
        assert!(session.user_id.is_none());
    }

    #[test]
    fn test_resolution_to_authenticated() {
        let gate = AuthGate::new(EventBus::new());
        let ticket = gate.begin_resolution();
        assert!(gate.complete_resolution(ticket, Some(user("u1"))));
        assert_eq!(gate.require_user().unwrap(), "u1");
        assert!(gate.session().is_authenticated);
    }

    #[test]
    fn test_resolution_applies_once() {
        let gate = AuthGate::new(EventBus::new());
        let ticket = gate.begin_resolution();
        assert!(gate.complete_resolution(ticket, None));
        assert!(!gate.complete_resolution(ticket, Some(user("u1"))));
        assert_eq!(gate.state(), AuthState::Unauthenticated);
        assert!(matches!(gate.require_user(), Err(CoreError::Unauthenticated)));
    }

    #[test]
    fn test_outdated_ticket_ignored() {
        let gate = AuthGate::new(EventBus::new());
        let first = gate.begin_resolution();
        let second = gate.begin_resolution();

        assert!(!gate.complete_resolution(first, Some(user("stale"))));
        assert!(gate.state().is_loading());
        assert!(gate.complete_resolution(second, Some(user("u2"))));
        assert_eq!(gate.require_user().unwrap(), "u2");
    }

    #[test]
    fn test_logout_discards_in_flight_resolution() {
        let gate = AuthGate::new(EventBus::new());
        let ticket = gate.begin_resolution();
        gate.logout();
        assert!(!gate.complete_resolution(ticket, Some(user("u1"))));
        assert_eq!(gate.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_session_events_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let gate = AuthGate::new(bus);
        let mut watcher = gate.subscribe();

        let ticket = gate.begin_resolution();
        gate.complete_resolution(ticket, Some(user("u1")));

        match rx.recv().await.unwrap() {
            CoreEvent::Session(s) => {
                assert!(s.is_authenticated);
                assert_eq!(s.user_id.as_deref(), Some("u1"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        watcher.changed().await.unwrap();
        assert!(watcher.borrow().is_authenticated());
    }
}
