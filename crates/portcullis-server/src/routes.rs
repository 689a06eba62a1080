//! Route id resolution.
//!
//! Proxying is not done here, but every rate limit decision needs a route id.
//! The first configured route with a pattern matching the normalized request
//! path wins; otherwise the default route id is used.

use serde::{Deserialize, Serialize};

use crate::paths::{PatternSet, normalize_path};
use crate::rate_limit::config::{LimitDefaults, RateLimiterConfig};

/// A `[[rate_limiter.routes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    /// Path globs that select this route.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Downstream address, reported by the admin surface only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_duration_minutes: Option<u64>,
}

impl RouteConfig {
    /// Limits set on this route, filled from `defaults`.
    pub fn limits(&self, defaults: &LimitDefaults) -> RateLimiterConfig {
        RateLimiterConfig {
            route_id: self.id.clone(),
            ban_threshold: self.ban_threshold.unwrap_or(defaults.ban_threshold),
            window_seconds: self.window_seconds.unwrap_or(defaults.window_seconds),
            ban_duration_minutes: self
                .ban_duration_minutes
                .unwrap_or(defaults.ban_duration_minutes),
        }
    }
}

/// Ordered route table.
pub struct RouteTable {
    routes: Vec<(RouteConfig, PatternSet)>,
    default_route_id: String,
}

impl RouteTable {
    pub fn new(routes: &[RouteConfig], default_route_id: impl Into<String>) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|r| (r.clone(), PatternSet::compile(&r.patterns)))
                .collect(),
            default_route_id: default_route_id.into(),
        }
    }

    /// Route id for a request path.
    pub fn resolve(&self, path: &str) -> &str {
        let normalized = normalize_path(path);
        self.routes
            .iter()
            .find(|(_, patterns)| patterns.matches(normalized))
            .map(|(route, _)| route.id.as_str())
            .unwrap_or(self.default_route_id.as_str())
    }

    pub fn default_route_id(&self) -> &str {
        &self.default_route_id
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteConfig> {
        self.routes.iter().map(|(route, _)| route)
    }
}
