//! Server-Sent Events stream and the background status poller.
//!
//! A new client first receives the current session, trading view and active
//! notices, then every [`CoreEvent`] published on the bus.

use crate::dashboard::state::DashboardState;
use crate::events::CoreEvent;
use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

fn to_sse(event: &CoreEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize SSE event {}: {}", event.name(), e);
            None
        }
    }
}

/// Events describing the current state, sent when a client connects
async fn initial_events(state: &DashboardState) -> Vec<CoreEvent> {
    let mut events = vec![CoreEvent::Session(state.core.snapshot())];
    if let Some(session) = state.core.current_session().await {
        events.push(CoreEvent::Trading(session.control.view()));
    }
    events.extend(state.core.notices().active().into_iter().map(CoreEvent::Notice));
    events
}

/// Create an SSE stream for a client connection
pub fn create_sse_stream(
    state: Arc<DashboardState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before the snapshot so nothing published in between is lost
    let mut rx = state.subscribe();

    let stream = stream! {
        for event in initial_events(&state).await {
            if let Some(sse) = to_sse(&event) {
                yield Ok(sse);
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(sse) = to_sse(&event) {
                        debug!("SSE sending event: {}", event.name());
                        yield Ok(sse);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("SSE client lagged by {} messages", n);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE broadcast channel closed");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Periodically re-read the server risk status so the displayed state
/// converges when another client toggles trading.
pub async fn status_refresher(state: Arc<DashboardState>) {
    if state.status_refresh.is_zero() {
        debug!("Status refresher disabled");
        return;
    }

    let mut interval = tokio::time::interval(state.status_refresh);
    // First tick fires immediately; the session already read the status
    interval.tick().await;

    loop {
        interval.tick().await;

        let Some(session) = state.core.current_session().await else {
            continue;
        };
        match session.control.refresh().await {
            Ok(view) => debug!("[POLL] {} is {}", view.user_id, view.state),
            Err(e) => warn!("[POLL] Status refresh for {} failed: {}", session.user_id, e),
        }
    }
}
