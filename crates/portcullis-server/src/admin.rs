//! Administrative endpoints under `/api/v1/gateway/securities`.
//!
//! Every route requires the configured admin authority on the caller's
//! identity. Refreshes pull the latest published documents from the shared
//! store; reads return what is currently in force.

use axum::{
    Extension, Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use portcullis_auth::Identity;
use serde::Serialize;

use crate::error::{AdmissionError, SuccessEnvelope};
use crate::i18n::Locale;
use crate::middleware::request_locale;
use crate::paths::RefreshOutcome;
use crate::rate_limit::RateLimiterConfig;
use crate::server::AppState;

/// Mount point of the admin router.
pub const ADMIN_BASE_PATH: &str = "/api/v1/gateway/securities";

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/rate-limiter/refresh", post(refresh_rate_limiter))
        .route(
            "/rate-limiter/excluded",
            get(excluded_apis).post(refresh_excluded_apis),
        )
        .route(
            "/public-request-patterns",
            get(public_patterns).post(refresh_public_patterns),
        )
        .route("/routes", get(routes))
        .route("/auth-cache/stats", get(auth_cache_stats))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Rejects callers without the admin authority.
async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let locale = request_locale(&req, state.default_locale);
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.has_authority(&state.admin_authority) => next.run(req).await,
        Some(identity) => {
            tracing::info!(
                subject = %identity.subject,
                path = %req.uri().path(),
                "Admin request without required authority"
            );
            AdmissionError::forbidden(state.admin_authority.to_string())
                .into_localized_response(locale)
        }
        None => AdmissionError::AuthenticationRequired.into_localized_response(locale),
    }
}

#[derive(Debug, Serialize)]
struct RateLimiterRefresh {
    /// The published document is the one in force.
    applied: bool,
    refresh: RefreshOutcome,
    routes: Vec<RateLimiterConfig>,
}

async fn refresh_rate_limiter(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    let refresh = state.sync.refresh_rate_limit_config().await;
    let mut routes: Vec<_> = state.engine.configs().overrides().values().cloned().collect();
    routes.sort_by(|a, b| a.route_id.cmp(&b.route_id));
    SuccessEnvelope::ok(
        locale,
        RateLimiterRefresh {
            applied: refresh.is_in_force(),
            refresh,
            routes,
        },
    )
}

#[derive(Debug, Serialize)]
struct PatternRefresh {
    refresh: RefreshOutcome,
    patterns: Vec<String>,
}

async fn excluded_apis(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    SuccessEnvelope::ok(locale, state.engine.excluded().patterns())
}

async fn refresh_excluded_apis(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    let refresh = state.sync.refresh_excluded_apis().await;
    let patterns = state.engine.excluded().patterns();
    SuccessEnvelope::ok(locale, PatternRefresh { refresh, patterns })
}

async fn public_patterns(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    SuccessEnvelope::ok(locale, state.public_paths.patterns())
}

async fn refresh_public_patterns(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    let refresh = state.sync.refresh_public_paths().await;
    let patterns = state.public_paths.patterns();
    SuccessEnvelope::ok(locale, PatternRefresh { refresh, patterns })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteView {
    id: String,
    patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    excluded: bool,
    limits: RateLimiterConfig,
}

async fn routes(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    let configs = state.engine.configs();
    let excluded = state.engine.excluded();
    let mut views: Vec<RouteView> = state
        .routes
        .routes()
        .map(|route| RouteView {
            id: route.id.clone(),
            patterns: route.patterns.clone(),
            uri: route.uri.clone(),
            excluded: excluded.matches(&route.id),
            limits: configs.effective(&route.id),
        })
        .collect();

    let default_id = state.routes.default_route_id();
    views.push(RouteView {
        id: default_id.to_string(),
        patterns: Vec::new(),
        uri: None,
        excluded: excluded.matches(default_id),
        limits: configs.effective(default_id),
    });
    SuccessEnvelope::ok(locale, views)
}

async fn auth_cache_stats(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> impl IntoResponse {
    SuccessEnvelope::ok(locale, state.auth_cache.stats())
}
