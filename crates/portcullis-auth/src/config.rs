//! Authentication configuration.
//!
//! ```toml
//! [auth.signing]
//! algorithm = "HS512"
//! secret = "change-me"
//! leeway = "30s"
//! require_authorities = false
//!
//! [auth.cache]
//! enabled = true
//! ttl = "15m"
//!
//! [auth.device]
//! header = "X-Device-Id"
//! key = "0123456789abcdef0123456789abcdef"
//! ```

use std::fmt;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Top-level authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub signing: SigningConfig,
    pub cache: AuthCacheConfig,
    pub device: DeviceConfig,
}

impl AuthConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signing.validate()?;
        self.cache.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

/// HMAC algorithms accepted for bearer credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HmacAlgorithm {
    HS256,
    HS384,
    #[default]
    HS512,
}

impl HmacAlgorithm {
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }
}

impl fmt::Display for HmacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential signing settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub algorithm: HmacAlgorithm,
    /// Shared HMAC secret.
    pub secret: String,
    /// Clock skew tolerated when checking `exp`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// Expected `iss` claim. Not checked when unset.
    pub issuer: Option<String>,
    /// Reject credentials whose authority claim is present but empty.
    pub require_authorities: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: HmacAlgorithm::default(),
            secret: String::new(),
            leeway: Duration::from_secs(30),
            issuer: None,
            require_authorities: false,
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .field("leeway", &self.leeway)
            .field("issuer", &self.issuer)
            .field("require_authorities", &self.require_authorities)
            .finish()
    }
}

impl SigningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::missing_field("auth.signing.secret"));
        }
        Ok(())
    }
}

/// Authentication cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    pub enabled: bool,
    /// Upper bound on how long a validated identity is reused.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl AuthCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.ttl.is_zero() {
            return Err(ConfigError::invalid_value(
                "auth.cache.ttl",
                "must be greater than 0 when the cache is enabled",
            ));
        }
        Ok(())
    }
}

/// Device identifier settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Request header carrying the encrypted device id.
    pub header: String,
    /// Cipher key; only the first 32 bytes are used. Device ids are ignored when unset.
    pub key: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            header: "X-Device-Id".to_string(),
            key: None,
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("header", &self.header)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header.trim().is_empty() {
            return Err(ConfigError::missing_field("auth.device.header"));
        }
        if let Some(key) = &self.key
            && key.len() < crate::device::KEY_SIZE
        {
            return Err(ConfigError::invalid_value(
                "auth.device.key",
                format!("must be at least {} bytes", crate::device::KEY_SIZE),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field is missing or empty.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Dotted path of the field.
        field: String,
    },

    /// A field has an unacceptable value.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Dotted path of the field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AuthConfig {
        AuthConfig {
            signing: SigningConfig {
                secret: "s3cret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.signing.algorithm, HmacAlgorithm::HS512);
        assert_eq!(config.cache.ttl, Duration::from_secs(900));
        assert_eq!(config.device.header, "X-Device-Id");
        assert!(config.validate().is_err(), "empty secret must be rejected");
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_short_device_key_rejected() {
        let mut config = valid();
        config.device.key = Some("too-short".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.device.key"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid();
        config.device.key = Some("k".repeat(32));
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains(&"k".repeat(32)));
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = serde_json::json!({
            "signing": { "algorithm": "HS256", "secret": "x", "leeway": "5s" },
            "cache": { "ttl": "2m" }
        });
        let config: AuthConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.signing.algorithm, HmacAlgorithm::HS256);
        assert_eq!(config.signing.leeway, Duration::from_secs(5));
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert!(config.cache.enabled);
    }
}
