//! Authentication error types.
//!
//! Detail carried by these errors is meant for server-side logs. The HTTP
//! layer collapses every credential error into one generic client message.

/// Errors that can occur while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The credential is malformed or its claims are unacceptable.
    #[error("Invalid credential: {message}")]
    InvalidCredential {
        /// Description of why the credential is invalid.
        message: String,
    },

    /// The credential's expiry has passed.
    #[error("Credential expired")]
    ExpiredCredential,

    /// The credential's signature does not verify against the configured secret.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Authentication is misconfigured (missing secret, bad key length).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Unexpected internal failure, such as a panicked verification task.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidCredential` error.
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error describes a bad credential rather than a
    /// missing one or a server-side fault.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential { .. } | Self::ExpiredCredential | Self::SignatureInvalid
        )
    }

    /// Short machine-readable reason, used as a structured log field.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "missing",
            Self::InvalidCredential { .. } => "invalid",
            Self::ExpiredCredential => "expired",
            Self::SignatureInvalid => "signature",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::ExpiredCredential,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidKeyFormat => Self::configuration(err.to_string()),
            _ => Self::invalid_credential(err.to_string()),
        }
    }
}

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
