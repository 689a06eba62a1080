//! Admission errors and the response envelope.
//!
//! Every rejection uses the same JSON shape so a client cannot tell which
//! check failed beyond the status code:
//!
//! ```json
//! { "code": 429, "success": false, "message": "Too many requests, please try again later" }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::i18n::{self, Locale};

/// Errors raised while admitting a request.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// No bearer credential on a protected path.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The credential did not validate. The detail is for logs only.
    #[error("Credential invalid: {detail}")]
    CredentialInvalid { detail: String },

    /// The window threshold was exceeded by this request.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// A ban is active for the client.
    #[error("Client banned")]
    ClientBanned,

    /// The caller lacks the authority an endpoint requires.
    #[error("Missing authority: {authority}")]
    Forbidden { authority: String },

    /// External configuration could not be read. Recovered locally.
    #[error("Configuration unavailable: {reason}")]
    ConfigUnavailable { reason: String },

    /// The shared store could not be reached.
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },
}

impl AdmissionError {
    #[must_use]
    pub fn credential_invalid(detail: impl Into<String>) -> Self {
        Self::CredentialInvalid {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn forbidden(authority: impl Into<String>) -> Self {
        Self::Forbidden {
            authority: authority.into(),
        }
    }

    #[must_use]
    pub fn config_unavailable(reason: impl Into<String>) -> Self {
        Self::ConfigUnavailable {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired | Self::CredentialInvalid { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Self::RateLimited | Self::ClientBanned => StatusCode::TOO_MANY_REQUESTS,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::ConfigUnavailable { .. } | Self::StoreUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Message key of the client-facing text.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => i18n::UNAUTHORIZED,
            Self::CredentialInvalid { .. } => i18n::CREDENTIAL_INVALID,
            Self::RateLimited | Self::ClientBanned => i18n::TOO_MANY_REQUESTS,
            Self::Forbidden { .. } => i18n::FORBIDDEN,
            Self::ConfigUnavailable { .. } | Self::StoreUnavailable { .. } => {
                i18n::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Builds the response in `locale`. Internal detail never reaches the body.
    pub fn into_localized_response(self, locale: Locale) -> Response {
        let status = self.status();
        let message = locale.message(self.message_key()).to_string();
        (status, Json(ErrorEnvelope::new(status, message))).into_response()
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        self.into_localized_response(Locale::default())
    }
}

/// Rejection body.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub success: bool,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            success: false,
            message: message.into(),
        }
    }
}

/// Success body used by the administrative endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope<T: Serialize> {
    pub code: u16,
    pub success: bool,
    pub message: String,
    pub result: T,
}

impl<T: Serialize> SuccessEnvelope<T> {
    pub fn ok(locale: Locale, result: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            success: true,
            message: locale.message(i18n::OK).to_string(),
            result,
        }
    }
}

impl<T: Serialize> IntoResponse for SuccessEnvelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
