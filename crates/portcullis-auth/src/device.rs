//! Device identifier verification.
//!
//! Mobile clients send their device id encrypted with a key shared with the
//! gateway. An id that fails to decrypt is treated as spoofed and ignored.
//!
//! Token format: `base64(nonce):base64(ciphertext)` with AES-256-GCM.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

use crate::error::{AuthError, AuthResult};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Encrypts and verifies device identifiers.
#[derive(Clone)]
pub struct DeviceIdCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for DeviceIdCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceIdCipher")
    }
}

impl DeviceIdCipher {
    /// Builds a cipher from the first 32 bytes of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when `key` is shorter than 32 bytes.
    pub fn new(key: &str) -> AuthResult<Self> {
        let bytes = key.as_bytes();
        if bytes.len() < KEY_SIZE {
            return Err(AuthError::configuration(format!(
                "device key must be at least {KEY_SIZE} bytes"
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes[..KEY_SIZE])
            .map_err(|e| AuthError::configuration(format!("failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypts a device id into the header format.
    pub fn encrypt(&self, device_id: &str) -> AuthResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, device_id.as_bytes())
            .map_err(|e| AuthError::internal(format!("encryption failed: {e}")))?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Decrypts a header value. Any failure means the id is not genuine.
    pub fn decrypt(&self, token: &str) -> AuthResult<String> {
        let (nonce_b64, ciphertext_b64) = token
            .trim()
            .split_once(':')
            .ok_or_else(|| AuthError::invalid_credential("device id is not in nonce:ciphertext form"))?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| AuthError::invalid_credential(format!("invalid nonce base64: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(AuthError::invalid_credential("invalid nonce size"));
        }
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| AuthError::invalid_credential(format!("invalid ciphertext base64: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| AuthError::invalid_credential("device id failed authentication"))?;

        let device_id = String::from_utf8(plaintext)
            .map_err(|e| AuthError::invalid_credential(format!("device id is not UTF-8: {e}")))?;
        if device_id.trim().is_empty() {
            return Err(AuthError::invalid_credential("device id is empty"));
        }
        Ok(device_id)
    }

    /// Returns the device id when `token` is genuine.
    pub fn verify(&self, token: &str) -> Option<String> {
        match self.decrypt(token) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!(error = %e, "rejected device id");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef-extra-ignored";

    #[test]
    fn test_encrypt_then_verify() {
        let cipher = DeviceIdCipher::new(KEY).unwrap();
        let token = cipher.encrypt("device-123").unwrap();
        assert!(token.contains(':'));
        assert_eq!(cipher.verify(&token).as_deref(), Some("device-123"));
    }

    #[test]
    fn test_only_first_32_bytes_matter() {
        let a = DeviceIdCipher::new(KEY).unwrap();
        let b = DeviceIdCipher::new("0123456789abcdef0123456789abcdef").unwrap();
        let token = a.encrypt("dev").unwrap();
        assert_eq!(b.verify(&token).as_deref(), Some("dev"));
    }

    #[test]
    fn test_spoofed_ids_rejected() {
        let cipher = DeviceIdCipher::new(KEY).unwrap();
        let other = DeviceIdCipher::new("ffffffffffffffffffffffffffffffff").unwrap();

        assert!(cipher.verify("plain-device-id").is_none());
        assert!(cipher.verify("bm9uY2U=:Y2lwaGVy").is_none());
        assert!(cipher.verify(&other.encrypt("dev").unwrap()).is_none());

        let token = cipher.encrypt("dev").unwrap();
        let (nonce, ct) = token.split_once(':').unwrap();
        let mut bytes = BASE64.decode(ct).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{nonce}:{}", BASE64.encode(bytes));
        assert!(cipher.verify(&tampered).is_none());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            DeviceIdCipher::new("short"),
            Err(AuthError::Configuration { .. })
        ));
    }
}
