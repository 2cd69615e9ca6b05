//! AES-256-GCM field encryption for sensitive values stored at rest
//! (currently device push tokens). Payload layout: base64(nonce || ciphertext)
//! with a 96-bit random nonce per encryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::error::{AppError, AppResult};

const NONCE_LEN: usize = 12;

pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key_material: &str) -> Self {
        let key_bytes = derive_key(key_material);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Field encryption failed")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> AppResult<String> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let payload = BASE64
            .decode(encoded)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Malformed encrypted payload")))?;

        if payload.len() <= NONCE_LEN {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Encrypted payload too short"
            )));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Field decryption failed")))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Decrypted payload is not UTF-8")))
    }
}

/// Squash arbitrary key material into exactly 32 bytes: truncate when long,
/// zero-pad when short.
fn derive_key(key_material: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = key_material.as_bytes();
    let len = bytes.len().min(32);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = FieldCipher::new("unit-test-key");
        let encrypted = cipher.encrypt("fcm-device-token-abc123").unwrap();
        assert_ne!(encrypted, "fcm-device-token-abc123");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "fcm-device-token-abc123");
    }

    #[test]
    fn test_nonce_randomization() {
        let cipher = FieldCipher::new("unit-test-key");
        let a = cipher.encrypt("same-plaintext").unwrap();
        let b = cipher.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_string_passes_through() {
        let cipher = FieldCipher::new("unit-test-key");
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_tampered_payload_fails() {
        let cipher = FieldCipher::new("unit-test-key");
        let encrypted = cipher.encrypt("secret").unwrap();
        let mut bytes = BASE64.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = FieldCipher::new("key-one").encrypt("secret").unwrap();
        assert!(FieldCipher::new("key-two").decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_derive_key_bounds() {
        // Short keys are zero-padded, long keys truncated.
        let short = derive_key("abc");
        assert_eq!(&short[..3], b"abc");
        assert!(short[3..].iter().all(|&b| b == 0));

        let long = derive_key(&"x".repeat(64));
        assert_eq!(long, [b'x'; 32]);
    }
}
