//! Client key derivation for rate limiting.
//!
//! Precedence, first match wins:
//!
//! 1. verified device id and user id: `device:<id>+user:<id>`
//! 2. device id alone: `device:<id>`, or user id alone: `user:<id>`
//! 3. client address: `ip:<addr>` (trusted forwarded header, else socket peer)
//! 4. User-Agent digest: `ua:<hex>`
//! 5. `anonymous`
//!
//! All unidentifiable traffic shares the `anonymous` bucket, so it is limited
//! collectively rather than not at all.

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, HeaderName, header};
use ipnetwork::IpNetwork;
use portcullis_auth::{DeviceIdCipher, Identity};
use sha2::{Digest, Sha256};

use super::config::ClientKeySettings;

pub const ANONYMOUS_KEY: &str = "anonymous";

/// Hex characters of the User-Agent digest kept in the key.
const UA_DIGEST_LEN: usize = 16;

/// Derives a stable client key from request signals. Never fails.
#[derive(Debug, Clone)]
pub struct ClientKeyResolver {
    device_header: HeaderName,
    cipher: Option<DeviceIdCipher>,
    forwarded_header: HeaderName,
    trust_forwarded_header: bool,
    trusted_proxies: Vec<IpNetwork>,
}

impl ClientKeyResolver {
    /// Builds a resolver. Header names and proxy ranges that do not parse are
    /// reported as errors.
    pub fn new(
        device_header: &str,
        cipher: Option<DeviceIdCipher>,
        settings: &ClientKeySettings,
    ) -> Result<Self, String> {
        let device_header = HeaderName::try_from(device_header)
            .map_err(|e| format!("invalid device header '{device_header}': {e}"))?;
        let forwarded_header = HeaderName::try_from(settings.forwarded_header.as_str())
            .map_err(|e| format!("invalid forwarded header '{}': {e}", settings.forwarded_header))?;
        let trusted_proxies = settings
            .trusted_proxies
            .iter()
            .map(|p| {
                p.parse::<IpNetwork>()
                    .map_err(|e| format!("invalid trusted proxy '{p}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            device_header,
            cipher,
            forwarded_header,
            trust_forwarded_header: settings.trust_forwarded_header,
            trusted_proxies,
        })
    }

    /// Client key for a request.
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        identity: Option<&Identity>,
    ) -> String {
        let device = self.device_id(headers);
        let user = identity.map(Identity::principal_id);

        match (device, user) {
            (Some(device), Some(user)) => return format!("device:{device}+user:{user}"),
            (Some(device), None) => return format!("device:{device}"),
            (None, Some(user)) => return format!("user:{user}"),
            (None, None) => {}
        }

        if let Some(ip) = self.client_ip(headers, peer) {
            return format!("ip:{ip}");
        }

        if let Some(ua) = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            let digest = hex::encode(Sha256::digest(ua.as_bytes()));
            return format!("ua:{}", &digest[..UA_DIGEST_LEN]);
        }

        ANONYMOUS_KEY.to_string()
    }

    /// The decrypted device id, if the header is present and genuine.
    fn device_id(&self, headers: &HeaderMap) -> Option<String> {
        let cipher = self.cipher.as_ref()?;
        let raw = headers.get(&self.device_header)?.to_str().ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        cipher.verify(raw)
    }

    /// Forwarded first hop when trusted, else the socket peer.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        if self.forwarded_is_trusted(peer)
            && let Some(ip) = headers
                .get(&self.forwarded_header)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
        {
            return Some(ip);
        }
        peer.map(|addr| addr.ip())
    }

    fn forwarded_is_trusted(&self, peer: Option<SocketAddr>) -> bool {
        if !self.trust_forwarded_header {
            return false;
        }
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.is_some_and(|addr| self.trusted_proxies.iter().any(|net| net.contains(addr.ip())))
    }
}
