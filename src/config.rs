//! Process configuration, read from the environment once at startup.

use crate::flags::FeatureFlags;
use std::time::Duration;

/// Default backend base URL
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default request timeout for backend calls
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 15;

/// Default interval between background risk-status refreshes
pub const DEFAULT_STATUS_REFRESH_SECS: u64 = 30;

/// Backend API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the dashboard backend, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Bearer token forwarded on every request (optional)
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            auth_token: None,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("API_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
            ),
            auth_token: std::env::var("API_AUTH_TOKEN").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub dashboard: crate::dashboard::DashboardConfig,
    /// Background status refresh period (0 disables the poller)
    pub status_refresh: Duration,
    pub flags: FeatureFlags,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            dashboard: crate::dashboard::DashboardConfig::default(),
            status_refresh: Duration::from_secs(DEFAULT_STATUS_REFRESH_SECS),
            flags: FeatureFlags::default(),
        }
    }
}

impl AppConfig {
    /// Create config from environment variables. Feature flags are resolved here
    /// and never again for the lifetime of the process.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            dashboard: crate::dashboard::DashboardConfig::from_env(),
            status_refresh: Duration::from_secs(
                std::env::var("STATUS_REFRESH_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_STATUS_REFRESH_SECS),
            ),
            flags: FeatureFlags::from_env(),
        }
    }
}
