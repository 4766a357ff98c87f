//! Feature flag registry.
//!
//! Capabilities are resolved exactly once, at process start, from
//! `FEATURE_<NAME>` environment variables. The resulting [`FeatureFlags`] is
//! immutable and is handed to every component that needs a capability check;
//! nothing inside the core reads the environment on its own.
//!
//! Parsing rules:
//! - `"true"` (any ASCII case) or `"1"` enables the flag
//! - `"false"` (any ASCII case) or `"0"` disables it
//! - anything else, including unset, falls back to the flag's default

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Prefix of the environment variable backing each flag
pub const FLAG_ENV_PREFIX: &str = "FEATURE_";

/// Named boolean capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureFlag {
    PersonalAgent,
    RiskEnforcement,
    GlobalEnsemble,
    InsightLoop,
    DnaStorage,
    AiBriefing,
    AiInsights,
    AiChat,
    LiveExchangeTrading,
    AiAuditLogging,
}

impl FeatureFlag {
    /// Every flag, in declaration order
    pub const ALL: [FeatureFlag; 10] = [
        FeatureFlag::PersonalAgent,
        FeatureFlag::RiskEnforcement,
        FeatureFlag::GlobalEnsemble,
        FeatureFlag::InsightLoop,
        FeatureFlag::DnaStorage,
        FeatureFlag::AiBriefing,
        FeatureFlag::AiInsights,
        FeatureFlag::AiChat,
        FeatureFlag::LiveExchangeTrading,
        FeatureFlag::AiAuditLogging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlag::PersonalAgent => "PERSONAL_AGENT",
            FeatureFlag::RiskEnforcement => "RISK_ENFORCEMENT",
            FeatureFlag::GlobalEnsemble => "GLOBAL_ENSEMBLE",
            FeatureFlag::InsightLoop => "INSIGHT_LOOP",
            FeatureFlag::DnaStorage => "DNA_STORAGE",
            FeatureFlag::AiBriefing => "AI_BRIEFING",
            FeatureFlag::AiInsights => "AI_INSIGHTS",
            FeatureFlag::AiChat => "AI_CHAT",
            FeatureFlag::LiveExchangeTrading => "LIVE_EXCHANGE_TRADING",
            FeatureFlag::AiAuditLogging => "AI_AUDIT_LOGGING",
        }
    }

    /// Value used when no override is configured.
    ///
    /// Safety flags and shipped features default on; opt-in capabilities
    /// (collective intelligence, real-money exchange routing) default off.
    pub fn default_enabled(&self) -> bool {
        !matches!(
            self,
            FeatureFlag::GlobalEnsemble | FeatureFlag::LiveExchangeTrading
        )
    }

    /// Name of the environment variable overriding this flag
    pub fn env_var(&self) -> String {
        format!("{}{}", FLAG_ENV_PREFIX, self.as_str())
    }
}

impl std::fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeatureFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let wanted = wanted
            .strip_prefix(FLAG_ENV_PREFIX)
            .unwrap_or(wanted);
        FeatureFlag::ALL
            .iter()
            .copied()
            .find(|flag| flag.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown feature flag: {}", s)))
    }
}

/// Parse an override value. `None` means "use the default".
pub fn parse_override(raw: &str) -> Option<bool> {
    let value = raw.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// One row of the diagnostics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagState {
    pub name: FeatureFlag,
    pub enabled: bool,
    /// Whether the value came from an override rather than the default
    pub overridden: bool,
}

/// Immutable, resolved-once flag table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags {
    states: Vec<FlagState>,
}

impl FeatureFlags {
    /// Resolve every flag through `lookup`, which maps an environment variable
    /// name to its raw value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let states = FeatureFlag::ALL
            .iter()
            .map(|&flag| {
                let parsed = lookup(&flag.env_var()).as_deref().and_then(parse_override);
                FlagState {
                    name: flag,
                    enabled: parsed.unwrap_or_else(|| flag.default_enabled()),
                    overridden: parsed.is_some(),
                }
            })
            .collect();

        Self { states }
    }

    /// Resolve from the process environment. Call once at startup.
    pub fn from_env() -> Self {
        let flags = Self::from_lookup(|name| std::env::var(name).ok());
        for state in flags.states.iter().filter(|s| s.overridden) {
            tracing::info!("[FLAGS] {} overridden to {}", state.name, state.enabled);
        }
        flags
    }

    /// Resolve from an explicit map of environment-style overrides
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        Self::from_lookup(|name| overrides.get(name).cloned())
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.states
            .iter()
            .find(|s| s.name == flag)
            .map(|s| s.enabled)
            .unwrap_or_else(|| flag.default_enabled())
    }

    /// Guard to call before performing a gated action
    pub fn require_enabled(&self, flag: FeatureFlag) -> CoreResult<()> {
        if self.is_enabled(flag) {
            Ok(())
        } else {
            tracing::warn!("Rejected use of disabled feature {}", flag);
            Err(CoreError::FeatureDisabled { flag })
        }
    }

    /// Full snapshot in declaration order
    pub fn list_all(&self) -> Vec<FlagState> {
        self.states.clone()
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
