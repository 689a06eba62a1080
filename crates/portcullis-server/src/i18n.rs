//! Localized client-facing messages.
//!
//! Rejections carry a short message in the caller's language, negotiated from
//! `Accept-Language` against the supported locales.

use std::fmt;
use std::str::FromStr;

use axum::{
    extract::Request,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

pub const UNAUTHORIZED: &str = "exception.unauthorized";
pub const CREDENTIAL_INVALID: &str = "exception.credentialInvalid";
pub const TOO_MANY_REQUESTS: &str = "exception.tooManyRequests";
pub const FORBIDDEN: &str = "exception.forbidden";
pub const SERVICE_UNAVAILABLE: &str = "exception.serviceUnavailable";
pub const OK: &str = "success.ok";

/// Supported locales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Vi => "vi",
        }
    }

    /// Message text for `key`. Unknown keys are returned unchanged.
    pub fn message(self, key: &str) -> &str {
        let text = match (self, key) {
            (Self::En, UNAUTHORIZED) => "Authentication token required",
            (Self::En, CREDENTIAL_INVALID) => "Invalid or expired token",
            (Self::En, TOO_MANY_REQUESTS) => "Too many requests, please try again later",
            (Self::En, FORBIDDEN) => "You do not have permission to access this resource",
            (Self::En, SERVICE_UNAVAILABLE) => "Service is temporarily unavailable",
            (Self::En, OK) => "Success",
            (Self::Vi, UNAUTHORIZED) => "Yêu cầu mã xác thực",
            (Self::Vi, CREDENTIAL_INVALID) => "Mã xác thực không hợp lệ hoặc đã hết hạn",
            (Self::Vi, TOO_MANY_REQUESTS) => "Quá nhiều yêu cầu, vui lòng thử lại sau",
            (Self::Vi, FORBIDDEN) => "Bạn không có quyền truy cập tài nguyên này",
            (Self::Vi, SERVICE_UNAVAILABLE) => "Dịch vụ tạm thời không khả dụng",
            (Self::Vi, OK) => "Thành công",
            _ => return key,
        };
        text
    }

    /// Picks the best supported locale from an `Accept-Language` header,
    /// honoring q-values. Falls back to `default`.
    pub fn negotiate(headers: &HeaderMap, default: Locale) -> Locale {
        let Some(value) = headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
        else {
            return default;
        };

        let mut best: Option<(Locale, f32)> = None;
        for part in value.split(',') {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next().unwrap_or_default().trim();
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            let primary = tag.split('-').next().unwrap_or_default();
            if let Ok(locale) = primary.parse::<Locale>()
                && quality > 0.0
                && best.is_none_or(|(_, q)| quality > q)
            {
                best = Some((locale, quality));
            }
        }
        best.map(|(locale, _)| locale).unwrap_or(default)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "vi" => Ok(Self::Vi),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

/// The `[i18n]` configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct I18nConfig {
    pub default_locale: Locale,
}

/// Negotiates the request locale and stores it in request extensions.
pub async fn locale_middleware(
    axum::extract::State(default): axum::extract::State<Locale>,
    mut request: Request,
    next: Next,
) -> Response {
    let locale = Locale::negotiate(request.headers(), default);
    request.extensions_mut().insert(locale);
    next.run(request).await
}
