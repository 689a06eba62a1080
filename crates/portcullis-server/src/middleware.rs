use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use portcullis_auth::Identity;
use uuid::Uuid;

use crate::error::AdmissionError;
use crate::i18n::Locale;
use crate::rate_limit::{DecisionOutcome, RateLimitDecision};
use crate::server::AppState;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_NAME_HEADER: HeaderName = HeaderName::from_static("x-user-name");
pub const USER_PERMISSIONS_HEADER: HeaderName = HeaderName::from_static("x-user-permissions");

// =============================================================================
// Request ID
// =============================================================================

pub async fn request_id(mut req: Request, next: Next) -> Response {
    // Preserve an incoming request id; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(REQUEST_ID_HEADER, req_id_value);
    res
}

// =============================================================================
// Authentication Gate
// =============================================================================

/// Admits public paths as-is and everything else only with a credential that
/// resolves to an [`Identity`], which is then stored in request extensions.
///
/// Clients only ever see a generic 401; the reason is logged at debug level.
pub async fn authentication_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if state.public_paths.is_public(req.uri().path()) {
        return next.run(req).await;
    }

    let locale = request_locale(&req, state.default_locale);
    let Some(credential) = bearer_token(req.headers()).map(str::to_owned) else {
        tracing::debug!(path = %req.uri().path(), "No bearer credential");
        return AdmissionError::AuthenticationRequired.into_localized_response(locale);
    };

    match state.auth_cache.resolve(&credential).await {
        Ok(identity) => {
            tracing::debug!(
                subject = %identity.subject,
                username = %identity.username,
                "Credential accepted"
            );
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(
                path = %req.uri().path(),
                reason = e.reason(),
                error = %e,
                "Credential rejected"
            );
            AdmissionError::credential_invalid(e.to_string()).into_localized_response(locale)
        }
    }
}

/// Extracts the credential of an `Authorization: Bearer <token>` header.
/// Blank tokens count as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Counts the request against its route and client key, rejecting with 429
/// once the client is over the threshold or banned.
///
/// The decision runs in its own task: if the client goes away mid-decision the
/// store operations still complete and the counters stay accurate.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.rate_limit_enabled {
        return next.run(req).await;
    }

    let route_id = state.routes.resolve(req.uri().path()).to_string();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_key =
        state
            .resolver
            .resolve(req.headers(), peer, req.extensions().get::<Identity>());

    let engine = state.engine.clone();
    let (task_route, task_key) = (route_id.clone(), client_key.clone());
    let decision = match tokio::spawn(async move { engine.is_allowed(&task_route, &task_key).await })
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(error = %e, route_id = %route_id, "Rate limit decision task failed, allowing request");
            RateLimitDecision::fail_open()
        }
    };

    if decision.allowed {
        return next.run(req).await;
    }

    let locale = request_locale(&req, state.default_locale);
    let error = match decision.outcome {
        DecisionOutcome::Banned => AdmissionError::ClientBanned,
        _ => AdmissionError::RateLimited,
    };
    tracing::debug!(
        route_id = %route_id,
        client_key = %client_key,
        outcome = ?decision.outcome,
        "Request rejected by rate limiter"
    );
    error.into_localized_response(locale)
}

// =============================================================================
// Identity Forwarding
// =============================================================================

/// Passes the authenticated identity downstream as `X-User-*` headers.
///
/// Client-supplied copies of these headers are always removed, so downstream
/// services can trust whatever they receive.
pub async fn forward_identity(mut req: Request, next: Next) -> Response {
    let identity = req.extensions().get::<Identity>().cloned();
    let headers = req.headers_mut();
    headers.remove(&USER_ID_HEADER);
    headers.remove(&USER_NAME_HEADER);
    headers.remove(&USER_PERMISSIONS_HEADER);

    if let Some(identity) = identity {
        for (name, value) in identity_headers(&identity) {
            headers.insert(name, value);
        }
    }
    next.run(req).await
}

fn identity_headers(identity: &Identity) -> Vec<(HeaderName, HeaderValue)> {
    let mut out = Vec::with_capacity(3);
    if let Ok(value) = HeaderValue::from_str(&identity.principal_id()) {
        out.push((USER_ID_HEADER, value));
    }
    match HeaderValue::from_bytes(identity.username.as_bytes()) {
        Ok(value) => out.push((USER_NAME_HEADER, value)),
        Err(_) => tracing::debug!(subject = %identity.subject, "Username not representable as a header"),
    }
    if let Ok(json) = serde_json::to_string(&identity.authorities)
        && let Ok(value) = HeaderValue::from_bytes(json.as_bytes())
    {
        out.push((USER_PERMISSIONS_HEADER, value));
    }
    out
}

/// Locale negotiated by the locale middleware, else `default`.
pub fn request_locale(req: &Request, default: Locale) -> Locale {
    req.extensions().get::<Locale>().copied().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer    "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_identity_headers() {
        let identity = Identity::new("alice", i64::MAX)
            .with_user_id(42)
            .with_username("Nguyễn Văn A")
            .with_authorities(["ROLE_USER", "orders:read"]);

        let headers = identity_headers(&identity);
        let get = |name: &HeaderName| {
            headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_bytes().to_vec())
        };
        assert_eq!(get(&USER_ID_HEADER).unwrap(), b"42");
        assert_eq!(
            String::from_utf8(get(&USER_NAME_HEADER).unwrap()).unwrap(),
            "Nguyễn Văn A"
        );
        assert_eq!(
            get(&USER_PERMISSIONS_HEADER).unwrap(),
            br#"["ROLE_USER","orders:read"]"#
        );
    }
}
