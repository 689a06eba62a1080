//! Key layout inside the shared store.
//!
//! All gateway instances must agree on these names, so they are built in one
//! place. Every key carries the configured prefix.
//!
//! | Purpose                     | Key                                      |
//! |-----------------------------|------------------------------------------|
//! | Cached identity             | `{prefix}auth:{sha256(token)}`           |
//! | Rate counter                | `{prefix}rate:{route}:{client}`          |
//! | Ban flag (global scope)     | `{prefix}ban:{client}`                   |
//! | Ban flag (route scope)      | `{prefix}ban:{route}:{client}`           |
//! | Rate limit overrides        | `{prefix}config:rate-limiter`            |
//! | Excluded route list         | `{prefix}config:rate-limiter-excluded-apis` |
//! | Public request patterns     | `{prefix}config:public-request-patterns` |

/// Default prefix for every key written by the gateway.
pub const DEFAULT_KEY_PREFIX: &str = "portcullis:";

/// Builds store keys under a common prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of a cached identity. `token_digest` is the hex SHA-256 of the credential.
    pub fn auth(&self, token_digest: &str) -> String {
        format!("{}auth:{token_digest}", self.prefix)
    }

    pub fn rate_counter(&self, route_id: &str, client_key: &str) -> String {
        format!("{}rate:{route_id}:{client_key}", self.prefix)
    }

    /// Ban flag shared by every route.
    pub fn ban(&self, client_key: &str) -> String {
        format!("{}ban:{client_key}", self.prefix)
    }

    /// Ban flag limited to one route.
    pub fn route_ban(&self, route_id: &str, client_key: &str) -> String {
        format!("{}ban:{route_id}:{client_key}", self.prefix)
    }

    pub fn rate_limit_config(&self) -> String {
        format!("{}config:rate-limiter", self.prefix)
    }

    pub fn excluded_apis(&self) -> String {
        format!("{}config:rate-limiter-excluded-apis", self.prefix)
    }

    pub fn public_request_patterns(&self) -> String {
        format!("{}config:public-request-patterns", self.prefix)
    }
}
