//! Wire and read-model types shared across the core.
//!
//! Backend payloads are camelCase JSON. Decoding is lenient: unknown fields are
//! ignored and optional fields fall back to defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side risk classification. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Badge text shown next to the trading control
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low Risk",
            RiskLevel::Medium => "Medium Risk",
            RiskLevel::High => "High Risk",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Risk level is display-only, so an unrecognized value must not fail the
/// whole status read. Unknown or non-string values read as absent.
fn lenient_risk_level<'de, D>(deserializer: D) -> Result<Option<RiskLevel>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => match s.parse() {
            Ok(level) => Some(level),
            Err(e) => {
                tracing::debug!("Ignoring {}", e);
                None
            }
        },
        _ => None,
    })
}

/// `GET /api/risk/status/:userId` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatusResponse {
    #[serde(default)]
    pub trading_paused: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_risk_level")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Last server-confirmed risk status for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    pub user_id: String,
    pub trading_paused: bool,
    pub risk_level: RiskLevel,
    pub status_message: String,
    pub status: String,
}

impl RiskStatus {
    /// Value used when the server has no status configured for the user (404)
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            trading_paused: false,
            risk_level: RiskLevel::Low,
            status_message: String::new(),
            status: "active".to_string(),
        }
    }

    pub fn from_response(user_id: &str, response: RiskStatusResponse) -> Self {
        let status = response.status.unwrap_or_else(|| {
            if response.trading_paused {
                "paused".to_string()
            } else {
                "active".to_string()
            }
        });

        Self {
            user_id: user_id.to_string(),
            trading_paused: response.trading_paused,
            risk_level: response.risk_level.unwrap_or_default(),
            status_message: response.status_message.unwrap_or_default(),
            status,
        }
    }
}

/// Resolved identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

/// AI briefing. The text content is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Briefing {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Trading DNA profile. The traits payload is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnaProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub traits: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Normalize a ticker before it is submitted to the backend
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
