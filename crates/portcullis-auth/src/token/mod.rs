//! Bearer credential validation.

pub mod jwt;

use async_trait::async_trait;

use crate::error::AuthResult;
use crate::identity::Identity;

pub use jwt::{Authorities, JwtValidator, TokenClaims};

/// Verifies a raw bearer credential and produces the identity it carries.
///
/// Implementations hold no mutable state and may be shared freely.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates `credential`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredential`](crate::AuthError::InvalidCredential) for malformed credentials
    /// - [`AuthError::ExpiredCredential`](crate::AuthError::ExpiredCredential) once `exp` has passed
    /// - [`AuthError::SignatureInvalid`](crate::AuthError::SignatureInvalid) when verification fails
    async fn validate(&self, credential: &str) -> AuthResult<Identity>;
}
