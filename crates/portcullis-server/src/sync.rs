//! Pulls externally published configuration out of the shared store.
//!
//! Three JSON documents are consulted:
//!
//! | key                                  | shape                                   |
//! |--------------------------------------|-----------------------------------------|
//! | `config:rate-limiter`                | `[{"routeId", "banThreshold"?, ...}]`   |
//! | `config:rate-limiter-excluded-apis`  | `["pattern", ...]`                      |
//! | `config:public-request-patterns`     | `["pattern", ...]`                      |
//!
//! A missing or broken document never crashes the gateway and never clears a
//! table: the values in force stay in force and a warning is logged.

use std::sync::Arc;
use std::time::Duration;

use portcullis_store::{DynStore, KeyNamespace};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::error::AdmissionError;
use crate::paths::{PatternRegistry, RefreshOutcome};
use crate::public_paths::PublicPathRegistry;
use crate::rate_limit::{RateLimitConfigTable, RateLimitOverride};

pub struct ConfigSync {
    store: DynStore,
    keys: KeyNamespace,
    rate_limits: Arc<RateLimitConfigTable>,
    excluded: Arc<PatternRegistry>,
    public_paths: Arc<PublicPathRegistry>,
}

impl ConfigSync {
    pub fn new(
        store: DynStore,
        keys: KeyNamespace,
        rate_limits: Arc<RateLimitConfigTable>,
        excluded: Arc<PatternRegistry>,
        public_paths: Arc<PublicPathRegistry>,
    ) -> Self {
        Self {
            store,
            keys,
            rate_limits,
            excluded,
            public_paths,
        }
    }

    /// Reads and decodes a JSON document. `Ok(None)` when the key is absent.
    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AdmissionError> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|e| AdmissionError::config_unavailable(format!("{key}: {e}")))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AdmissionError::config_unavailable(format!("{key}: malformed document: {e}")))
    }

    /// Applies the published per-route limits.
    ///
    /// `Unchanged` means the published document is valid and already in force.
    pub async fn refresh_rate_limit_config(&self) -> RefreshOutcome {
        let key = self.keys.rate_limit_config();
        match self.fetch::<Vec<RateLimitOverride>>(&key).await {
            Ok(Some(entries)) if !entries.is_empty() => {
                let outcome = self.rate_limits.replace_overrides(&entries);
                match &outcome {
                    RefreshOutcome::Applied(diff) => tracing::info!(
                        routes = entries.len(),
                        changed = ?diff.added,
                        removed = ?diff.removed,
                        "rate limit configuration refreshed"
                    ),
                    RefreshOutcome::Retained { reason } => tracing::warn!(
                        key = %key,
                        reason = %reason,
                        "published rate limit configuration rejected, keeping current limits"
                    ),
                    RefreshOutcome::Unchanged => {}
                }
                outcome
            }
            Ok(_) => {
                tracing::warn!(key = %key, "no rate limit configuration published, keeping current limits");
                RefreshOutcome::retained("document not found or empty")
            }
            Err(e) => {
                tracing::warn!(error = %e, "rate limit configuration refresh failed, keeping current limits");
                RefreshOutcome::retained(e.to_string())
            }
        }
    }

    /// Applies the published list of rate-limit-exempt routes.
    pub async fn refresh_excluded_apis(&self) -> RefreshOutcome {
        let key = self.keys.excluded_apis();
        self.refresh_patterns(&key, "excluded APIs", |patterns| {
            self.excluded.replace_all(patterns)
        })
        .await
    }

    /// Applies the published list of public request patterns.
    pub async fn refresh_public_paths(&self) -> RefreshOutcome {
        let key = self.keys.public_request_patterns();
        self.refresh_patterns(&key, "public paths", |patterns| {
            self.public_paths.replace_all(patterns)
        })
        .await
    }

    async fn refresh_patterns(
        &self,
        key: &str,
        what: &'static str,
        apply: impl FnOnce(Vec<String>) -> RefreshOutcome,
    ) -> RefreshOutcome {
        match self.fetch::<Vec<String>>(key).await {
            Ok(Some(patterns)) => apply(patterns),
            Ok(None) => {
                tracing::warn!(key = %key, "no {what} published, keeping current list");
                RefreshOutcome::retained("document not found")
            }
            Err(e) => {
                tracing::warn!(error = %e, "{what} refresh failed, keeping current list");
                RefreshOutcome::retained(e.to_string())
            }
        }
    }

    /// Startup refresh of every document.
    pub async fn initialize(&self) {
        self.refresh_excluded_apis().await;

        if !self.refresh_rate_limit_config().await.is_in_force() {
            let defaults = self.rate_limits.defaults();
            tracing::info!(
                ban_threshold = defaults.ban_threshold,
                window_seconds = defaults.window_seconds,
                ban_duration_minutes = defaults.ban_duration_minutes,
                "using static rate limit defaults"
            );
            for config in self.rate_limits.static_routes() {
                tracing::info!(
                    route_id = %config.route_id,
                    ban_threshold = config.ban_threshold,
                    window_seconds = config.window_seconds,
                    ban_duration_minutes = config.ban_duration_minutes,
                    "using static route limits"
                );
            }
        }

        self.refresh_public_paths().await;
    }

    /// Refreshes every document on a fixed interval until the task is aborted.
    pub fn start_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tracing::info!(interval_secs = interval.as_secs(), "starting periodic configuration sync");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; startup already refreshed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.refresh_excluded_apis().await;
                self.refresh_rate_limit_config().await;
                self.refresh_public_paths().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use portcullis_store::{MemoryStore, SharedStateStore};

    use super::*;
    use crate::rate_limit::{BanScope, LimitDefaults, RateLimiterEngine};

    const DOC_TTL: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: MemoryStore,
        keys: KeyNamespace,
        sync: ConfigSync,
        rate_limits: Arc<RateLimitConfigTable>,
        excluded: Arc<PatternRegistry>,
        public_paths: Arc<PublicPathRegistry>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let keys = KeyNamespace::default();
        let rate_limits = Arc::new(RateLimitConfigTable::new(LimitDefaults::default(), &[]));
        let excluded = Arc::new(PatternRegistry::new("excluded_apis", ["internal"]));
        let public_paths = Arc::new(PublicPathRegistry::new(["healthz"]));
        let sync = ConfigSync::new(
            Arc::new(store.clone()),
            keys.clone(),
            rate_limits.clone(),
            excluded.clone(),
            public_paths.clone(),
        );
        Fixture {
            store,
            keys,
            sync,
            rate_limits,
            excluded,
            public_paths,
        }
    }

    #[tokio::test]
    async fn test_rate_limit_refresh() {
        let f = fixture();
        assert!(
            !f.sync.refresh_rate_limit_config().await.is_in_force(),
            "nothing published yet"
        );

        f.store
            .set_ex(
                &f.keys.rate_limit_config(),
                r#"[{"routeId":"r1","banThreshold":3,"windowSeconds":60,"banDurationMinutes":5}]"#,
                DOC_TTL,
            )
            .await
            .unwrap();
        assert!(f.sync.refresh_rate_limit_config().await.is_applied());
        assert_eq!(f.rate_limits.effective("r1").ban_threshold, 3);

        // Same document again: still in force, no churn.
        let before = f.rate_limits.overrides();
        let outcome = f.sync.refresh_rate_limit_config().await;
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert!(outcome.is_in_force());
        assert!(Arc::ptr_eq(&before, &f.rate_limits.overrides()));
    }

    #[tokio::test]
    async fn test_malformed_document_keeps_values() {
        let f = fixture();
        f.store
            .set_ex(&f.keys.rate_limit_config(), r#"[{"routeId":"r1","banThreshold":3}]"#, DOC_TTL)
            .await
            .unwrap();
        assert!(f.sync.refresh_rate_limit_config().await.is_applied());

        f.store
            .set_ex(&f.keys.rate_limit_config(), "{broken", DOC_TTL)
            .await
            .unwrap();
        assert!(!f.sync.refresh_rate_limit_config().await.is_in_force());
        assert_eq!(f.rate_limits.effective("r1").ban_threshold, 3);

        f.store
            .set_ex(&f.keys.public_request_patterns(), "42", DOC_TTL)
            .await
            .unwrap();
        let outcome = f.sync.refresh_public_paths().await;
        assert!(matches!(outcome, RefreshOutcome::Retained { .. }));
        assert!(f.public_paths.is_public("healthz"));
    }

    #[tokio::test]
    async fn test_oversized_durations_are_rejected() {
        let f = fixture();
        f.store
            .set_ex(
                &f.keys.rate_limit_config(),
                r#"[{"routeId":"r1","windowSeconds":18446744073709551615},
                    {"routeId":"r2","banDurationMinutes":18446744073709551615}]"#,
                DOC_TTL,
            )
            .await
            .unwrap();

        let outcome = f.sync.refresh_rate_limit_config().await;
        assert!(matches!(outcome, RefreshOutcome::Retained { .. }));
        assert!(f.rate_limits.overrides().is_empty());
        assert_eq!(
            f.rate_limits.effective("r1").window_seconds,
            crate::rate_limit::config::DEFAULT_WINDOW_SECONDS
        );

        // The engine keeps counting with the defaults instead of panicking.
        let engine = Arc::new(RateLimiterEngine::new(
            Arc::new(f.store.clone()),
            f.keys.clone(),
            f.rate_limits.clone(),
            f.excluded.clone(),
            BanScope::Global,
        ));
        let decision = tokio::spawn(async move { engine.is_allowed("r1", "ip:1.2.3.4").await })
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_pattern_refresh_idempotent() {
        let f = fixture();
        f.store
            .set_ex(&f.keys.excluded_apis(), r#"["internal","reports-*"]"#, DOC_TTL)
            .await
            .unwrap();

        assert!(f.sync.refresh_excluded_apis().await.is_applied());
        assert!(f.excluded.matches("reports-daily"));
        assert_eq!(f.sync.refresh_excluded_apis().await, RefreshOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_empty_public_list_retained() {
        let f = fixture();
        f.store
            .set_ex(&f.keys.public_request_patterns(), "[]", DOC_TTL)
            .await
            .unwrap();
        let outcome = f.sync.refresh_public_paths().await;
        assert!(matches!(outcome, RefreshOutcome::Retained { .. }));
        assert_eq!(f.public_paths.patterns(), vec!["healthz"]);
    }

    #[tokio::test]
    async fn test_initialize_applies_everything() {
        let f = fixture();
        f.store
            .set_ex(&f.keys.public_request_patterns(), r#"["healthz","docs/**"]"#, DOC_TTL)
            .await
            .unwrap();
        f.store
            .set_ex(&f.keys.rate_limit_config(), r#"[{"routeId":"r9","banThreshold":9}]"#, DOC_TTL)
            .await
            .unwrap();

        f.sync.initialize().await;
        assert!(f.public_paths.is_public("/docs/index.html"));
        assert_eq!(f.rate_limits.effective("r9").ban_threshold, 9);
        assert!(f.excluded.matches("internal"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_picks_up_changes() {
        let f = fixture();
        let sync = Arc::new(f.sync);
        let handle = sync.clone().start_periodic(Duration::from_secs(30));

        f.store
            .set_ex(&f.keys.public_request_patterns(), r#"["status"]"#, DOC_TTL)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(f.public_paths.is_public("status"));
        handle.abort();
    }
}
