//! Trading Console
//!
//! Session and risk-control core for the trading dashboard: authentication
//! gating, feature flags, a de-duplicating query cache, optimistic pause/resume
//! control, and a JSON/SSE shell that exposes all of it over HTTP.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod control;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod flags;
pub mod notify;
pub mod read_models;
pub mod risk;
pub mod routes;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;
