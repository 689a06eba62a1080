//! Admission layer for an API gateway.
//!
//! Every request passes, in order, through:
//!
//! 1. the authentication gate: public paths pass, everything else needs a
//!    bearer credential that resolves to an identity (cached in the shared store)
//! 2. the rate limiter: per route and per client fixed-window counting with
//!    time-boxed bans, failing open when the shared store is unavailable
//! 3. identity forwarding: the identity travels downstream as `X-User-*` headers
//!
//! Public paths, per-route limits and the rate-limit exemption list are
//! published externally into the shared store and pulled in by [`ConfigSync`].

pub mod admin;
pub mod config;
pub mod error;
pub mod handlers;
pub mod i18n;
pub mod middleware;
pub mod observability;
pub mod paths;
pub mod public_paths;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod sync;

pub use config::{AppConfig, LogFormat, LoggingConfig, SecurityConfig, ServerConfig, SyncConfig};
pub use error::{AdmissionError, ErrorEnvelope, SuccessEnvelope};
pub use i18n::Locale;
pub use observability::init_tracing;
pub use public_paths::PublicPathRegistry;
pub use rate_limit::{ClientKeyResolver, RateLimitDecision, RateLimiterEngine};
pub use routes::{RouteConfig, RouteTable};
pub use server::{AppState, PortcullisServer, ServerBuilder, build_app};
pub use sync::ConfigSync;
