//! Per-route rate limiting with ban escalation.

pub mod config;
pub mod engine;
pub mod key_resolver;

pub use config::{
    BanScope, ClientKeySettings, LimitDefaults, RateLimitConfigTable, RateLimitOverride,
    RateLimiterConfig, RateLimiterSettings,
};
pub use engine::{DecisionOutcome, RateLimitDecision, RateLimiterEngine};
pub use key_resolver::{ANONYMOUS_KEY, ClientKeyResolver};
