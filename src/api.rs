//! REST transport for the dashboard backend.
//!
//! The core talks to the backend through the [`DashboardApi`] trait so that the
//! state machines can be exercised against in-memory fakes. [`HttpApi`] is the
//! production implementation on top of `reqwest`.

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{
    Briefing, DnaProfile, Order, RiskStatus, RiskStatusResponse, User, WatchlistItem,
};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub type ApiResult<T> = Result<T, ApiError>;

/// Backend operations the session core depends on
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Resolve the current identity. `None` when the caller is not signed in.
    async fn current_user(&self) -> ApiResult<Option<User>>;

    /// Risk status for a user. A missing status is reported as the default.
    async fn risk_status(&self, user_id: &str) -> ApiResult<RiskStatus>;

    async fn pause_trading(&self, user_id: &str) -> ApiResult<()>;

    async fn resume_trading(&self, user_id: &str) -> ApiResult<()>;

    async fn watchlist(&self, user_id: &str) -> ApiResult<Vec<WatchlistItem>>;

    /// `symbol` is expected to be normalized already
    async fn add_to_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()>;

    async fn remove_from_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()>;

    /// Latest briefing, `None` when none has been generated
    async fn briefing(&self, user_id: &str) -> ApiResult<Option<Briefing>>;

    async fn generate_briefing(&self, user_id: &str) -> ApiResult<()>;

    async fn dna_profile(&self, user_id: &str) -> ApiResult<Option<DnaProfile>>;

    async fn orders(&self, user_id: &str) -> ApiResult<Vec<Order>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchlistRequest<'a> {
    user_id: &'a str,
    symbol: &'a str,
}

/// `reqwest`-backed implementation of [`DashboardApi`]
pub struct HttpApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpApi {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("trading-console/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Endpoint URL from path segments. Each segment is percent-encoded, so
    /// ids and symbols can never alter the path or query string.
    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> ApiResult<reqwest::RequestBuilder> {
        let url = self.url(segments)?;
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        Ok(match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Send and decode a JSON body; any non-2xx status becomes [`ApiError::Status`]
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Like [`send_json`](Self::send_json) but 404 maps to `None`
    async fn send_optional<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> ApiResult<Option<T>> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await?;
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Ok(serde_json::from_slice::<Option<T>>(&body)?)
    }

    /// Send a command; the response body is ignored
    async fn send_command(&self, builder: reqwest::RequestBuilder) -> ApiResult<()> {
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

async fn status_error(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!("Backend returned {}: {}", status, body);
    ApiError::Status { status, body }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn current_user(&self) -> ApiResult<Option<User>> {
        let response = self
            .request(reqwest::Method::GET, &["api", "auth", "user"])?
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice::<Option<User>>(&body)?)
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn risk_status(&self, user_id: &str) -> ApiResult<RiskStatus> {
        let response: Option<RiskStatusResponse> = self
            .send_optional(self.request(
                reqwest::Method::GET,
                &["api", "risk", "status", user_id],
            )?)
            .await?;

        Ok(match response {
            Some(r) => RiskStatus::from_response(user_id, r),
            None => RiskStatus::default_for(user_id),
        })
    }

    async fn pause_trading(&self, user_id: &str) -> ApiResult<()> {
        self.send_command(
            self.request(reqwest::Method::POST, &["api", "risk", "pause"])?
                .json(&UserRequest { user_id }),
        )
        .await
    }

    async fn resume_trading(&self, user_id: &str) -> ApiResult<()> {
        self.send_command(
            self.request(reqwest::Method::POST, &["api", "risk", "resume"])?
                .json(&UserRequest { user_id }),
        )
        .await
    }

    async fn watchlist(&self, user_id: &str) -> ApiResult<Vec<WatchlistItem>> {
        self.send_json(
            self.request(reqwest::Method::GET, &["api", "watchlist"])?
                .query(&[("userId", user_id)]),
        )
        .await
    }

    async fn add_to_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()> {
        self.send_command(
            self.request(reqwest::Method::POST, &["api", "watchlist"])?
                .json(&WatchlistRequest { user_id, symbol }),
        )
        .await
    }

    async fn remove_from_watchlist(&self, user_id: &str, symbol: &str) -> ApiResult<()> {
        self.send_command(
            self.request(reqwest::Method::DELETE, &["api", "watchlist", symbol])?
                .query(&[("userId", user_id)]),
        )
        .await
    }

    async fn briefing(&self, user_id: &str) -> ApiResult<Option<Briefing>> {
        self.send_optional(self.request(
            reqwest::Method::GET,
            &["api", "ai", "briefing", user_id],
        )?)
        .await
    }

    async fn generate_briefing(&self, user_id: &str) -> ApiResult<()> {
        self.send_command(
            self.request(reqwest::Method::POST, &["api", "ai", "briefing"])?
                .json(&UserRequest { user_id }),
        )
        .await
    }

    async fn dna_profile(&self, user_id: &str) -> ApiResult<Option<DnaProfile>> {
        self.send_optional(self.request(
            reqwest::Method::GET,
            &["api", "users", user_id, "dna"],
        )?)
        .await
    }

    async fn orders(&self, user_id: &str) -> ApiResult<Vec<Order>> {
        self.send_json(self.request(reqwest::Method::GET, &["api", "orders", user_id])?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let api = HttpApi::new(ApiConfig {
            base_url: "http://localhost:9000".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            api.url(&["api", "risk", "pause"]).unwrap().as_str(),
            "http://localhost:9000/api/risk/pause"
        );
        assert_eq!(api.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_path_segments_are_escaped() {
        let api = HttpApi::new(ApiConfig {
            base_url: "http://localhost:9000/backend".to_string(),
            ..Default::default()
        })
        .unwrap();

        let url = api.url(&["api", "watchlist", "BRK/B"]).unwrap();
        assert_eq!(url.path(), "/backend/api/watchlist/BRK%2FB");

        let url = api.url(&["api", "risk", "status", "u1?x=1#frag"]).unwrap();
        assert_eq!(url.path(), "/backend/api/risk/status/u1%3Fx=1%23frag");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_invalid_base_url_is_transport_error() {
        let api = HttpApi::new(ApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            api.url(&["api"]),
            Err(ApiError::Transport(_))
        ));
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let body = serde_json::to_string(&WatchlistRequest {
            user_id: "u1",
            symbol: "AAPL",
        })
        .unwrap();
        assert_eq!(body, r#"{"userId":"u1","symbol":"AAPL"}"#);
    }
}
