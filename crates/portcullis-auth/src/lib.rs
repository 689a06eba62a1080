//! Authentication for the Portcullis gateway.
//!
//! This crate turns a bearer credential into an [`Identity`]:
//!
//! - **Token validation**: HMAC-signed JWTs via [`JwtValidator`]
//! - **Identity caching**: cache-aside over the shared store via [`AuthenticationCache`]
//! - **Device ids**: AES-256-GCM verification via [`DeviceIdCipher`]
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use portcullis_auth::{AuthConfig, AuthenticationCache, JwtValidator};
//!
//! let validator = Arc::new(JwtValidator::new(&config.signing)?);
//! let cache = AuthenticationCache::new(store, keys, validator, config.cache.clone());
//! let identity = cache.resolve(bearer).await?;
//! ```

pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod identity;
pub mod token;

pub use cache::{AuthenticationCache, CacheStats, hash_credential};
pub use config::{AuthCacheConfig, AuthConfig, ConfigError, DeviceConfig, HmacAlgorithm, SigningConfig};
pub use device::DeviceIdCipher;
pub use error::{AuthError, AuthResult};
pub use identity::Identity;
pub use token::{Authorities, JwtValidator, TokenClaims, TokenValidator};
