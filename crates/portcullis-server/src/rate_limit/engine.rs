//! Fixed-window counter with ban escalation.
//!
//! State lives entirely in the shared store so every gateway instance sees
//! the same counters and bans:
//!
//! - window counter `rate:<route>:<client>`, expiry set by the first hit
//! - ban flag `ban:<client>` (or `ban:<route>:<client>`), present while banned
//!
//! Any store failure fails open.

use std::sync::Arc;

use portcullis_store::{DynStore, KeyNamespace, StoreError};
use serde::Serialize;

use super::config::{BanScope, RateLimitConfigTable};
use crate::paths::PatternRegistry;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The route is exempt from rate limiting.
    Excluded,
    /// The request was counted and stayed within the threshold.
    Counted { count: i64, threshold: u32 },
    /// A ban was already active; nothing was counted.
    Banned,
    /// This request crossed the threshold and installed a ban.
    NowBanned { count: i64, threshold: u32 },
    /// The store failed; the request is let through.
    FailOpen,
}

/// Result of [`RateLimiterEngine::is_allowed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub outcome: DecisionOutcome,
}

impl RateLimitDecision {
    fn allow(outcome: DecisionOutcome) -> Self {
        Self {
            allowed: true,
            outcome,
        }
    }

    fn deny(outcome: DecisionOutcome) -> Self {
        Self {
            allowed: false,
            outcome,
        }
    }

    /// Fail-open decision used when no verdict could be reached.
    pub fn fail_open() -> Self {
        Self::allow(DecisionOutcome::FailOpen)
    }
}

pub struct RateLimiterEngine {
    store: DynStore,
    keys: KeyNamespace,
    configs: Arc<RateLimitConfigTable>,
    excluded: Arc<PatternRegistry>,
    ban_scope: BanScope,
}

impl RateLimiterEngine {
    pub fn new(
        store: DynStore,
        keys: KeyNamespace,
        configs: Arc<RateLimitConfigTable>,
        excluded: Arc<PatternRegistry>,
        ban_scope: BanScope,
    ) -> Self {
        Self {
            store,
            keys,
            configs,
            excluded,
            ban_scope,
        }
    }

    pub fn configs(&self) -> &Arc<RateLimitConfigTable> {
        &self.configs
    }

    pub fn excluded(&self) -> &Arc<PatternRegistry> {
        &self.excluded
    }

    fn ban_key(&self, route_id: &str, client_key: &str) -> String {
        match self.ban_scope {
            BanScope::Global => self.keys.ban(client_key),
            BanScope::Route => self.keys.route_ban(route_id, client_key),
        }
    }

    /// Decides whether `client_key` may call `route_id` now.
    pub async fn is_allowed(&self, route_id: &str, client_key: &str) -> RateLimitDecision {
        if self.excluded.matches(route_id) {
            tracing::trace!(route_id, "route excluded from rate limiting");
            return RateLimitDecision::allow(DecisionOutcome::Excluded);
        }

        match self.check(route_id, client_key).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(
                    route_id,
                    client_key,
                    error = %e,
                    "rate limiter store error, allowing request"
                );
                RateLimitDecision::fail_open()
            }
        }
    }

    async fn check(&self, route_id: &str, client_key: &str) -> Result<RateLimitDecision, StoreError> {
        let config = self.configs.effective(route_id);
        let ban_key = self.ban_key(route_id, client_key);

        if self.store.exists(&ban_key).await? {
            tracing::debug!(route_id, client_key, "request from banned client");
            return Ok(RateLimitDecision::deny(DecisionOutcome::Banned));
        }

        let counter_key = self.keys.rate_counter(route_id, client_key);
        let count = self
            .store
            .incr_with_expiry(&counter_key, config.window())
            .await?;

        if count > i64::from(config.ban_threshold) {
            self.store.set_ex(&ban_key, "1", config.ban_duration()).await?;
            tracing::info!(
                route_id,
                client_key,
                count,
                threshold = config.ban_threshold,
                ban_minutes = config.ban_duration_minutes,
                "client banned"
            );
            return Ok(RateLimitDecision::deny(DecisionOutcome::NowBanned {
                count,
                threshold: config.ban_threshold,
            }));
        }

        Ok(RateLimitDecision::allow(DecisionOutcome::Counted {
            count,
            threshold: config.ban_threshold,
        }))
    }
}
