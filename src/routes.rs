//! Route tables selected by the authentication state.
//!
//! Resolution is a pure projection of `(auth state, path)`; it has no side
//! effects and never starts authentication.

use crate::auth::AuthState;
use crate::flags::{FeatureFlag, FeatureFlags};
use serde::Serialize;

/// Home route of the authenticated app
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Route {
    Landing,
    Login,
    Register,
    Dashboard,
    OrderHistory,
    Watchlist,
    Insights,
    Briefing,
    TradingDna,
    PersonalAgent,
    RiskControls,
    GlobalEnsemble,
    Settings,
    NotFound,
}

/// Outcome of resolving a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RouteResolution {
    Render { route: Route },
    Redirect { to: String },
}

impl RouteResolution {
    pub fn route(&self) -> Option<Route> {
        match self {
            RouteResolution::Render { route } => Some(*route),
            RouteResolution::Redirect { .. } => None,
        }
    }
}

const PUBLIC_ROUTES: &[(&str, Route)] = &[
    ("/", Route::Landing),
    ("/login", Route::Login),
    ("/register", Route::Register),
];

/// Authenticated routes and the capability each one needs, if any
const APP_ROUTES: &[(&str, Route, Option<FeatureFlag>)] = &[
    ("/", Route::Dashboard, None),
    ("/orders", Route::OrderHistory, None),
    ("/watchlist", Route::Watchlist, None),
    ("/insights", Route::Insights, Some(FeatureFlag::AiInsights)),
    ("/briefing", Route::Briefing, Some(FeatureFlag::AiBriefing)),
    ("/dna", Route::TradingDna, Some(FeatureFlag::DnaStorage)),
    ("/agent", Route::PersonalAgent, Some(FeatureFlag::PersonalAgent)),
    ("/risk", Route::RiskControls, None),
    ("/ensemble", Route::GlobalEnsemble, Some(FeatureFlag::GlobalEnsemble)),
    ("/settings", Route::Settings, None),
];

/// Route tables, fixed at startup from the resolved feature flags
#[derive(Debug, Clone)]
pub struct RouteTable {
    app: Vec<(&'static str, Route)>,
}

impl RouteTable {
    pub fn new(flags: &FeatureFlags) -> Self {
        let app = APP_ROUTES
            .iter()
            .filter(|(_, _, flag)| flag.map_or(true, |f| flags.is_enabled(f)))
            .map(|(path, route, _)| (*path, *route))
            .collect();
        Self { app }
    }

    /// Paths reachable in the given state
    pub fn reachable(&self, state: &AuthState) -> Vec<&'static str> {
        if state.is_authenticated() {
            self.app.iter().map(|(p, _)| *p).collect()
        } else {
            PUBLIC_ROUTES.iter().map(|(p, _)| *p).collect()
        }
    }

    pub fn resolve(&self, state: &AuthState, path: &str) -> RouteResolution {
        let path = normalize_path(path);

        if !state.is_authenticated() {
            // Anything outside the public set silently lands on the landing view
            let route = PUBLIC_ROUTES
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, r)| *r)
                .unwrap_or(Route::Landing);
            return RouteResolution::Render { route };
        }

        if path == "/register" {
            return RouteResolution::Redirect {
                to: HOME_PATH.to_string(),
            };
        }

        let route = self
            .app
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, r)| *r)
            .unwrap_or(Route::NotFound);
        RouteResolution::Render { route }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(&FeatureFlags::default())
    }
}

/// Drop query string, fragment and trailing slashes
fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::User;
    use std::collections::HashMap;

    fn authenticated() -> AuthState {
        AuthState::Authenticated {
            user: User {
                id: "u1".to_string(),
                email: None,
                first_name: None,
                last_name: None,
            },
        }
    }

    fn render(route: Route) -> RouteResolution {
        RouteResolution::Render { route }
    }

    #[test]
    fn test_unauthenticated_orders_lands_on_landing() {
        let table = RouteTable::default();
        let resolved = table.resolve(&AuthState::Unauthenticated, "/orders");
        assert_eq!(resolved, render(Route::Landing));
        assert_ne!(resolved.route(), Some(Route::OrderHistory));
    }

    #[test]
    fn test_loading_exposes_only_public_routes() {
        let table = RouteTable::default();
        assert_eq!(table.resolve(&AuthState::Loading, "/login"), render(Route::Login));
        assert_eq!(table.resolve(&AuthState::Loading, "/register"), render(Route::Register));
        assert_eq!(table.resolve(&AuthState::Loading, "/settings"), render(Route::Landing));
        assert_eq!(
            table.reachable(&AuthState::Loading),
            vec!["/", "/login", "/register"]
        );
    }

    #[test]
    fn test_authenticated_register_redirects_home() {
        let table = RouteTable::default();
        assert_eq!(
            table.resolve(&authenticated(), "/register"),
            RouteResolution::Redirect {
                to: "/".to_string()
            }
        );
        // The redirect target is never itself a redirect
        assert_eq!(table.resolve(&authenticated(), "/"), render(Route::Dashboard));
    }

    #[test]
    fn test_authenticated_routes() {
        let table = RouteTable::default();
        let state = authenticated();
        assert_eq!(table.resolve(&state, "/orders"), render(Route::OrderHistory));
        assert_eq!(table.resolve(&state, "/orders/"), render(Route::OrderHistory));
        assert_eq!(table.resolve(&state, "/watchlist?tab=2"), render(Route::Watchlist));
        assert_eq!(table.resolve(&state, "/login"), render(Route::NotFound));
        assert_eq!(table.resolve(&state, "/nope"), render(Route::NotFound));
    }

    #[test]
    fn test_gated_routes_follow_flags() {
        let table = RouteTable::default();
        assert_eq!(table.resolve(&authenticated(), "/ensemble"), render(Route::NotFound));

        let mut overrides = HashMap::new();
        overrides.insert("FEATURE_GLOBAL_ENSEMBLE".to_string(), "1".to_string());
        let table = RouteTable::new(&FeatureFlags::from_overrides(&overrides));
        assert_eq!(
            table.resolve(&authenticated(), "/ensemble"),
            render(Route::GlobalEnsemble)
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("//"), "/");
        assert_eq!(normalize_path("/orders#top"), "/orders");
    }
}
