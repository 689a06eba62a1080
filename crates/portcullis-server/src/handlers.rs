use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Serialize;

use crate::error::{AdmissionError, ErrorEnvelope};
use crate::i18n::{self, Locale};
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<&'a str>,
}

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            store: None,
        }),
    )
}

/// Ready when the shared store answers a ping.
pub async fn readyz(
    State(state): State<AppState>,
    Extension(locale): Extension<Locale>,
) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                store: Some(state.store.backend()),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, backend = state.store.backend(), "Readiness check failed");
            AdmissionError::store_unavailable(e.to_string()).into_localized_response(locale)
        }
    }
}

/// Answers requests no upstream is available for.
pub async fn service_unavailable(Extension(locale): Extension<Locale>) -> Response {
    let status = StatusCode::SERVICE_UNAVAILABLE;
    let message = locale.message(i18n::SERVICE_UNAVAILABLE);
    (status, Json(ErrorEnvelope::new(status, message))).into_response()
}

/// Downstream used by the binary: the fallback endpoint plus a 503 for
/// everything else.
pub fn fallback_router() -> Router {
    Router::new()
        .route("/fallback/services/unavailable", any(service_unavailable))
        .fallback(service_unavailable)
}
