//! PHI Encryption Module
//!
//! Reversible protection for text that contains PHI. Uses AES-256-GCM with
//! a fresh random nonce per call; the envelope is
//! `base64(nonce[12] || ciphertext || tag[16])`.
//!
//! This is the round-trippable path. Irreversible masking lives in the PHI
//! detector's redaction step and must never be substituted for this.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// Encryption key size (256 bits)
pub const KEY_SIZE: usize = 32;
/// Nonce size (96 bits for GCM)
pub const NONCE_SIZE: usize = 12;
/// Tag size (128 bits)
pub const TAG_SIZE: usize = 16;
/// PBKDF2-HMAC-SHA256 rounds when the key is derived from a passphrase
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Encryption error types
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Authentication failed")]
    AuthenticationFailed,
}

/// 256-bit PHI key. Debug output never shows key material.
#[derive(Clone, PartialEq, Eq)]
pub struct PhiKey([u8; KEY_SIZE]);

impl PhiKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self, EncryptionError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            EncryptionError::InvalidKey(format!("expected {} bytes, got {}", KEY_SIZE, v.len()))
        })?;
        Ok(Self(key))
    }

    /// Stretch a passphrase with PBKDF2-HMAC-SHA256.
    pub fn derive_from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self, EncryptionError> {
        if passphrase.is_empty() {
            return Err(EncryptionError::InvalidKey("empty passphrase".into()));
        }
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        Ok(Self(key))
    }

    /// Fresh random key from the OS entropy source.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }
}

impl std::fmt::Debug for PhiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PhiKey(***)")
    }
}

/// AES-256-GCM cipher for PHI-bearing text.
pub struct PhiCipher {
    cipher: Aes256Gcm,
}

impl PhiCipher {
    pub fn new(key: &PhiKey) -> Result<Self, EncryptionError> {
        let cipher = Aes256Gcm::new_from_slice(&key.0)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt and return the base64 envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a base64 envelope produced by [`PhiCipher::encrypt`].
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, EncryptionError> {
        let raw = BASE64
            .decode(envelope.trim())
            .map_err(|e| EncryptionError::InvalidEnvelope(e.to_string()))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(EncryptionError::InvalidEnvelope(format!(
                "envelope too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| EncryptionError::AuthenticationFailed)
    }

    /// Convenience wrapper for UTF-8 text.
    pub fn decrypt_text(&self, envelope: &str) -> Result<String, EncryptionError> {
        let bytes = self.decrypt(envelope)?;
        String::from_utf8(bytes).map_err(|e| EncryptionError::InvalidEnvelope(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_key() -> PhiKey {
        let mut key = [0u8; KEY_SIZE];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        PhiKey::from_bytes(key)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = PhiCipher::new(&create_test_key()).unwrap();
        let envelope = cipher.encrypt(b"Patient MRN: 12345678").unwrap();

        assert!(!envelope.contains("12345678"));
        assert_eq!(cipher.decrypt_text(&envelope).unwrap(), "Patient MRN: 12345678");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let cipher = PhiCipher::new(&create_test_key()).unwrap();
        let a = cipher.encrypt(b"same text").unwrap();
        let b = cipher.encrypt(b"same text").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_envelope_rejected() {
        let cipher = PhiCipher::new(&create_test_key()).unwrap();
        let envelope = cipher.encrypt(b"SSN 123-45-6789").unwrap();
        let mut raw = BASE64.decode(&envelope).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;

        let result = cipher.decrypt(&BASE64.encode(raw));
        assert!(matches!(result, Err(EncryptionError::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher = PhiCipher::new(&create_test_key()).unwrap();
        let other = PhiCipher::new(&PhiKey::generate()).unwrap();
        let envelope = cipher.encrypt(b"DOB 01/02/1940").unwrap();
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn test_short_envelope_rejected() {
        let cipher = PhiCipher::new(&create_test_key()).unwrap();
        let result = cipher.decrypt(&BASE64.encode([0u8; 8]));
        assert!(matches!(result, Err(EncryptionError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_hex_key_parsing() {
        let hex_key = "00".repeat(KEY_SIZE);
        assert!(PhiKey::from_hex(&hex_key).is_ok());
        assert!(PhiKey::from_hex("abcd").is_err());
        assert!(PhiKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_passphrase_derivation_is_deterministic() {
        let a = PhiKey::derive_from_passphrase("correct horse", b"salt").unwrap();
        let b = PhiKey::derive_from_passphrase("correct horse", b"salt").unwrap();
        let c = PhiKey::derive_from_passphrase("battery staple", b"salt").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(PhiKey::derive_from_passphrase("", b"salt").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = create_test_key();
        assert_eq!(format!("{:?}", key), "PhiKey(***)");
    }
}
