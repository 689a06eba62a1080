//! The authenticated principal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Principal derived from a validated credential.
///
/// Attached to a single request and dropped with it. The only place an
/// identity outlives a request is the authentication cache, as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Numeric user id, when the issuer provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Token subject.
    pub subject: String,

    /// Display name. Falls back to the subject.
    pub username: String,

    /// Granted authorities, sorted and deduplicated.
    #[serde(default)]
    pub authorities: BTreeSet<String>,

    /// Credential expiry as a Unix timestamp in seconds.
    pub expires_at: i64,
}

impl Identity {
    /// Creates an identity with no authorities.
    #[must_use]
    pub fn new(subject: impl Into<String>, expires_at: i64) -> Self {
        let subject = subject.into();
        Self {
            user_id: None,
            username: subject.clone(),
            subject,
            authorities: BTreeSet::new(),
            expires_at,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    #[must_use]
    pub fn with_authorities<I, S>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorities = authorities.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` if the identity holds `authority`.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// Returns `true` once `expires_at` lies in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.seconds_until_expiry() <= 0
    }

    /// Seconds remaining until expiry; zero or negative when expired.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires_at - OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Identifier forwarded downstream: the user id when present, else the subject.
    #[must_use]
    pub fn principal_id(&self) -> String {
        self.user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.subject.clone())
    }
}
