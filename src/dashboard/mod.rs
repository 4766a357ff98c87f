//! Web Dashboard Module
//!
//! JSON and SSE shell over the session core, built with Axum.
//!
//! # Features
//!
//! - **Session**: identity snapshot, re-resolution and logout
//! - **Routing**: `/api/route?path=` projects a path onto the route table
//! - **Trading control**: pause, resume, toggle and emergency stop
//! - **Read models**: watchlist, AI briefing, trading DNA, order history
//! - **Real-time updates**: Server-Sent Events for session, trading and notice changes
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_console::dashboard::{DashboardConfig, DashboardServer, DashboardState};
//!
//! let state = DashboardState::new(core, Duration::from_secs(30));
//! DashboardServer::new(state, DashboardConfig::from_env()).run().await?;
//! ```

pub mod handlers;
pub mod server;
pub mod sse;
pub mod state;

pub use server::{DashboardConfig, DashboardServer};
pub use state::DashboardState;
