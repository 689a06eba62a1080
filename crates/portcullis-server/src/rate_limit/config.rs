//! Rate limiter settings and the per-route limit table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::paths::{PatternDiff, RefreshOutcome};
use crate::routes::RouteConfig;

pub const DEFAULT_BAN_THRESHOLD: u32 = 50;
pub const DEFAULT_WINDOW_SECONDS: u64 = 1;
pub const DEFAULT_BAN_DURATION_MINUTES: u64 = 15;
/// Longest accepted counting window: one day.
pub const MAX_WINDOW_SECONDS: u64 = 24 * 60 * 60;
/// Longest accepted ban: thirty days.
pub const MAX_BAN_DURATION_MINUTES: u64 = 30 * 24 * 60;

/// Whether a ban covers every route or only the route that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanScope {
    #[default]
    Global,
    Route,
}

/// Limits used when neither an override nor a route entry sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitDefaults {
    pub ban_threshold: u32,
    pub window_seconds: u64,
    pub ban_duration_minutes: u64,
}

impl Default for LimitDefaults {
    fn default() -> Self {
        Self {
            ban_threshold: DEFAULT_BAN_THRESHOLD,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            ban_duration_minutes: DEFAULT_BAN_DURATION_MINUTES,
        }
    }
}

/// Effective limits for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfig {
    pub route_id: String,
    pub ban_threshold: u32,
    pub window_seconds: u64,
    pub ban_duration_minutes: u64,
}

impl RateLimiterConfig {
    pub fn with_defaults(route_id: impl Into<String>, defaults: &LimitDefaults) -> Self {
        Self {
            route_id: route_id.into(),
            ban_threshold: defaults.ban_threshold,
            window_seconds: defaults.window_seconds,
            ban_duration_minutes: defaults.ban_duration_minutes,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_minutes.saturating_mul(60))
    }

    /// Why these limits cannot be enforced, if they cannot.
    fn unusable_reason(&self) -> Option<&'static str> {
        if self.route_id.trim().is_empty() {
            return Some("empty route id");
        }
        if self.ban_threshold == 0 {
            return Some("ban threshold must be > 0");
        }
        if !(1..=MAX_WINDOW_SECONDS).contains(&self.window_seconds) {
            return Some("window out of range");
        }
        if !(1..=MAX_BAN_DURATION_MINUTES).contains(&self.ban_duration_minutes) {
            return Some("ban duration out of range");
        }
        None
    }

}

/// One entry of the externally published rate limiter document.
///
/// Missing fields take the global defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOverride {
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_duration_minutes: Option<u64>,
}

impl RateLimitOverride {
    pub fn resolve(&self, defaults: &LimitDefaults) -> RateLimiterConfig {
        RateLimiterConfig {
            route_id: self.route_id.trim().to_string(),
            ban_threshold: self.ban_threshold.unwrap_or(defaults.ban_threshold),
            window_seconds: self.window_seconds.unwrap_or(defaults.window_seconds),
            ban_duration_minutes: self
                .ban_duration_minutes
                .unwrap_or(defaults.ban_duration_minutes),
        }
    }
}

/// How client keys are derived from a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientKeySettings {
    /// Header carrying the original client address when behind a proxy.
    pub forwarded_header: String,
    /// Honor `forwarded_header` at all.
    pub trust_forwarded_header: bool,
    /// CIDR ranges of proxies allowed to set `forwarded_header`. Empty means any peer.
    pub trusted_proxies: Vec<String>,
}

impl Default for ClientKeySettings {
    fn default() -> Self {
        Self {
            forwarded_header: "X-Forwarded-For".to_string(),
            trust_forwarded_header: true,
            trusted_proxies: Vec::new(),
        }
    }
}

/// The `[rate_limiter]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    pub enabled: bool,
    pub defaults: LimitDefaults,
    pub ban_scope: BanScope,
    /// Route ids (globs) exempt from rate limiting until the first refresh.
    pub excluded_apis: Vec<String>,
    /// Route id for requests matching no configured route.
    pub default_route_id: String,
    pub routes: Vec<RouteConfig>,
    pub client_key: ClientKeySettings,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            defaults: LimitDefaults::default(),
            ban_scope: BanScope::default(),
            excluded_apis: Vec::new(),
            default_route_id: "default".to_string(),
            routes: Vec::new(),
            client_key: ClientKeySettings::default(),
        }
    }
}

impl RateLimiterSettings {
    pub fn validate(&self) -> Result<(), String> {
        let d = &self.defaults;
        if let Some(reason) = RateLimiterConfig::with_defaults("defaults", d).unusable_reason() {
            return Err(format!(
                "rate_limiter.defaults: {reason} (window_seconds 1..={MAX_WINDOW_SECONDS}, \
                 ban_duration_minutes 1..={MAX_BAN_DURATION_MINUTES})"
            ));
        }
        if self.default_route_id.trim().is_empty() {
            return Err("rate_limiter.default_route_id must not be empty".into());
        }
        for route in &self.routes {
            if route.id.trim().is_empty() {
                return Err("rate_limiter.routes[].id must not be empty".into());
            }
            if let Some(reason) = route.limits(d).unusable_reason() {
                return Err(format!("rate_limiter.routes[{}]: {reason}", route.id));
            }
        }
        for proxy in &self.client_key.trusted_proxies {
            proxy
                .parse::<ipnetwork::IpNetwork>()
                .map_err(|e| format!("rate_limiter.client_key.trusted_proxies: '{proxy}': {e}"))?;
        }
        Ok(())
    }
}

/// Lookup table of effective limits.
///
/// Precedence: published override → static route entry → global default.
/// Overrides are replaced wholesale and read through an `ArcSwap`, so
/// lookups never wait on a refresh.
pub struct RateLimitConfigTable {
    defaults: LimitDefaults,
    static_routes: HashMap<String, RateLimiterConfig>,
    overrides: ArcSwap<HashMap<String, RateLimiterConfig>>,
}

impl RateLimitConfigTable {
    pub fn new(defaults: LimitDefaults, routes: &[RouteConfig]) -> Self {
        let static_routes = routes
            .iter()
            .map(|r| (r.id.clone(), r.limits(&defaults)))
            .collect();
        Self {
            defaults,
            static_routes,
            overrides: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &LimitDefaults {
        &self.defaults
    }

    /// Effective limits for `route_id`.
    pub fn effective(&self, route_id: &str) -> RateLimiterConfig {
        if let Some(config) = self.overrides.load().get(route_id) {
            return config.clone();
        }
        if let Some(config) = self.static_routes.get(route_id) {
            return config.clone();
        }
        RateLimiterConfig::with_defaults(route_id, &self.defaults)
    }

    /// Current override snapshot.
    pub fn overrides(&self) -> Arc<HashMap<String, RateLimiterConfig>> {
        self.overrides.load_full()
    }

    /// Static per-route limits from the configuration file.
    pub fn static_routes(&self) -> impl Iterator<Item = &RateLimiterConfig> {
        self.static_routes.values()
    }

    /// Replaces the override table with `entries`.
    ///
    /// Entries with an empty route id, a zero limit or a window or ban
    /// duration past its cap are dropped. Nothing is swapped when no usable
    /// entry remains or the table would not change. The diff lists the route
    /// ids that were added or changed and those that were removed.
    pub fn replace_overrides(&self, entries: &[RateLimitOverride]) -> RefreshOutcome {
        let next: HashMap<String, RateLimiterConfig> = entries
            .iter()
            .map(|e| e.resolve(&self.defaults))
            .filter(|c| match c.unusable_reason() {
                None => true,
                Some(reason) => {
                    tracing::warn!(
                        route_id = %c.route_id,
                        window_seconds = c.window_seconds,
                        ban_duration_minutes = c.ban_duration_minutes,
                        reason,
                        "ignoring unusable rate limit entry"
                    );
                    false
                }
            })
            .map(|c| (c.route_id.clone(), c))
            .collect();

        if next.is_empty() {
            return RefreshOutcome::retained("no usable rate limit entries");
        }
        let current = self.overrides.load_full();
        if *current == next {
            tracing::debug!("rate limit overrides unchanged");
            return RefreshOutcome::Unchanged;
        }

        let mut diff = PatternDiff {
            added: next
                .iter()
                .filter(|(id, config)| current.get(*id) != Some(*config))
                .map(|(id, _)| id.clone())
                .collect(),
            removed: current
                .keys()
                .filter(|id| !next.contains_key(*id))
                .cloned()
                .collect(),
        };
        diff.added.sort();
        diff.removed.sort();

        for config in next.values() {
            tracing::info!(
                route_id = %config.route_id,
                ban_threshold = config.ban_threshold,
                window_seconds = config.window_seconds,
                ban_duration_minutes = config.ban_duration_minutes,
                "rate limit override applied"
            );
        }
        self.overrides.store(Arc::new(next));
        RefreshOutcome::Applied(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(route: &str, threshold: Option<u32>) -> RateLimitOverride {
        RateLimitOverride {
            route_id: route.to_string(),
            ban_threshold: threshold,
            window_seconds: None,
            ban_duration_minutes: None,
        }
    }

    fn route(id: &str, threshold: u32) -> RouteConfig {
        RouteConfig {
            id: id.to_string(),
            patterns: vec![format!("{id}/**")],
            uri: None,
            ban_threshold: Some(threshold),
            window_seconds: None,
            ban_duration_minutes: None,
        }
    }

    #[test]
    fn test_precedence() {
        let table = RateLimitConfigTable::new(LimitDefaults::default(), &[route("orders", 10)]);

        assert_eq!(table.effective("other").ban_threshold, DEFAULT_BAN_THRESHOLD);
        assert_eq!(table.effective("orders").ban_threshold, 10);

        assert!(table.replace_overrides(&[entry("orders", Some(3))]).is_applied());
        let config = table.effective("orders");
        assert_eq!(config.ban_threshold, 3);
        assert_eq!(config.window_seconds, DEFAULT_WINDOW_SECONDS);
        assert_eq!(config.ban_duration(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_identical_overrides_do_not_swap() {
        let table = RateLimitConfigTable::new(LimitDefaults::default(), &[]);
        assert!(table.replace_overrides(&[entry("r1", Some(3))]).is_applied());
        let before = table.overrides();

        assert_eq!(
            table.replace_overrides(&[entry("r1", Some(3))]),
            RefreshOutcome::Unchanged
        );
        assert!(Arc::ptr_eq(&before, &table.overrides()));
    }

    #[test]
    fn test_empty_or_unusable_keeps_table() {
        let table = RateLimitConfigTable::new(LimitDefaults::default(), &[]);
        assert!(table.replace_overrides(&[entry("r1", Some(3))]).is_applied());

        assert!(!table.replace_overrides(&[]).is_in_force());
        assert!(
            !table
                .replace_overrides(&[entry("r2", Some(0)), entry(" ", None)])
                .is_in_force()
        );
        assert_eq!(table.effective("r1").ban_threshold, 3);
    }

    #[test]
    fn test_out_of_range_durations_dropped() {
        let table = RateLimitConfigTable::new(LimitDefaults::default(), &[]);
        let huge_window = RateLimitOverride {
            window_seconds: Some(u64::MAX),
            ..entry("r1", Some(3))
        };
        let huge_ban = RateLimitOverride {
            ban_duration_minutes: Some(MAX_BAN_DURATION_MINUTES + 1),
            ..entry("r2", Some(3))
        };
        let at_caps = RateLimitOverride {
            window_seconds: Some(MAX_WINDOW_SECONDS),
            ban_duration_minutes: Some(MAX_BAN_DURATION_MINUTES),
            ..entry("r3", Some(3))
        };

        let outcome = table.replace_overrides(&[huge_window, huge_ban, at_caps]);
        assert_eq!(
            outcome,
            RefreshOutcome::Applied(PatternDiff {
                added: vec!["r3".to_string()],
                removed: Vec::new(),
            })
        );
        assert_eq!(table.effective("r1").window_seconds, DEFAULT_WINDOW_SECONDS);
        assert_eq!(
            table.effective("r2").ban_duration_minutes,
            DEFAULT_BAN_DURATION_MINUTES
        );
    }

    #[test]
    fn test_diff_reports_changed_and_removed_routes() {
        let table = RateLimitConfigTable::new(LimitDefaults::default(), &[]);
        table.replace_overrides(&[entry("r1", Some(3)), entry("r2", Some(4))]);

        let outcome = table.replace_overrides(&[entry("r1", Some(5))]);
        assert_eq!(
            outcome,
            RefreshOutcome::Applied(PatternDiff {
                added: vec!["r1".to_string()],
                removed: vec!["r2".to_string()],
            })
        );
    }

    #[test]
    fn test_override_document_shape() {
        let doc = r#"[{"routeId":"r1","banThreshold":3,"windowSeconds":60},{"routeId":"r2"}]"#;
        let entries: Vec<RateLimitOverride> = serde_json::from_str(doc).unwrap();
        let defaults = LimitDefaults::default();
        assert_eq!(entries[0].resolve(&defaults).window_seconds, 60);
        assert_eq!(entries[1].resolve(&defaults).ban_threshold, DEFAULT_BAN_THRESHOLD);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = RateLimiterSettings::default();
        assert!(settings.validate().is_ok());

        settings.client_key.trusted_proxies = vec!["10.0.0.0/8".into()];
        assert!(settings.validate().is_ok());

        settings.client_key.trusted_proxies = vec!["not-a-cidr".into()];
        assert!(settings.validate().is_err());

        let settings = RateLimiterSettings {
            defaults: LimitDefaults {
                window_seconds: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RateLimiterSettings {
            defaults: LimitDefaults {
                ban_duration_minutes: MAX_BAN_DURATION_MINUTES + 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
