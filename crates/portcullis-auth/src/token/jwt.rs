//! HMAC-signed JWT credentials.
//!
//! Credentials are issued by the identity service with a shared secret. The
//! claims carry the subject, an optional numeric user id, a display name and
//! the granted authorities:
//!
//! ```json
//! {
//!   "sub": "alice",
//!   "userId": 42,
//!   "username": "Alice",
//!   "authorities": "ROLE_USER,orders:read",
//!   "iat": 1700000000,
//!   "exp": 1700003600
//! }
//! ```
//!
//! `authorities` may also be a JSON array of strings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::TokenValidator;
use crate::config::SigningConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::Identity;

/// Authority claim in either of its accepted encodings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authorities {
    /// Comma separated list: `"ROLE_USER,orders:read"`.
    Joined(String),
    /// JSON array: `["ROLE_USER", "orders:read"]`.
    List(Vec<String>),
}

impl Authorities {
    /// Trimmed, non-empty authority names.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::List(list) => list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Claims carried by a gateway credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject.
    pub sub: String,

    /// Numeric user id.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Granted authorities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Authorities>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl TokenClaims {
    /// Builds the claims for `identity`, valid for `lifetime` from now.
    #[must_use]
    pub fn for_identity(identity: &Identity, lifetime: Duration, issuer: Option<String>) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX / 2);
        let authorities = identity.authorities.iter().cloned().collect::<Vec<_>>();
        Self {
            sub: identity.subject.clone(),
            user_id: identity.user_id,
            username: Some(identity.username.clone()),
            authorities: Some(Authorities::Joined(authorities.join(","))),
            iss: issuer,
            iat: now,
            exp: now.saturating_add(lifetime),
        }
    }

    fn into_identity(self, require_authorities: bool) -> AuthResult<Identity> {
        if self.sub.trim().is_empty() {
            return Err(AuthError::invalid_credential("empty subject"));
        }

        let authorities = match &self.authorities {
            Some(claim) => {
                let list = claim.to_vec();
                if list.is_empty() && require_authorities {
                    return Err(AuthError::invalid_credential("authority claim is empty"));
                }
                list
            }
            None => Vec::new(),
        };

        let username = self
            .username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.sub.clone());

        let mut identity = Identity::new(self.sub, self.exp)
            .with_username(username)
            .with_authorities(authorities);
        identity.user_id = self.user_id;
        Ok(identity)
    }
}

/// Signing material and validation rules shared by every clone.
struct JwtKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    require_authorities: bool,
}

/// HMAC JWT validator.
///
/// Cloning is cheap; all clones share the same keys.
#[derive(Clone)]
pub struct JwtValidator {
    keys: Arc<JwtKeys>,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("algorithm", &self.keys.algorithm)
            .field("issuer", &self.keys.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    /// Creates a validator from signing settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the secret is empty.
    pub fn new(config: &SigningConfig) -> AuthResult<Self> {
        if config.secret.trim().is_empty() {
            return Err(AuthError::configuration("signing secret must not be empty"));
        }

        let algorithm = config.algorithm.to_jwt_algorithm();
        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway.as_secs();
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        let secret = config.secret.as_bytes();
        Ok(Self {
            keys: Arc::new(JwtKeys {
                algorithm,
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                validation,
                issuer: config.issuer.clone(),
                require_authorities: config.require_authorities,
            }),
        })
    }

    /// Verifies `token` on the current thread.
    ///
    /// Prefer the [`TokenValidator`] impl on async paths; it moves this work
    /// to the blocking pool.
    pub fn verify(&self, token: &str) -> AuthResult<Identity> {
        let data = decode::<TokenClaims>(token, &self.keys.decoding, &self.keys.validation)?;
        data.claims.into_identity(self.keys.require_authorities)
    }

    /// Issues a credential for `identity`, valid for `lifetime`.
    pub fn encode(&self, identity: &Identity, lifetime: Duration) -> AuthResult<String> {
        let claims = TokenClaims::for_identity(identity, lifetime, self.keys.issuer.clone());
        self.encode_claims(&claims)
    }

    /// Signs arbitrary claims with the configured key.
    pub fn encode_claims(&self, claims: &TokenClaims) -> AuthResult<String> {
        let header = Header::new(self.keys.algorithm);
        encode(&header, claims, &self.keys.encoding)
            .map_err(|e| AuthError::internal(format!("failed to encode token: {e}")))
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, credential: &str) -> AuthResult<Identity> {
        let validator = self.clone();
        let token = credential.to_string();
        tokio::task::spawn_blocking(move || validator.verify(&token))
            .await
            .map_err(|e| AuthError::internal(format!("verification task failed: {e}")))?
    }
}
