//! # Cryptographic Primitives
//!
//! Symmetric encryption and message authentication used by the rest of the server.
//!
//! ## Algorithms
//!
//! - **Cipher**: AES-256-GCM (Galois/Counter Mode)
//! - **Key size**: 256 bits (32 bytes)
//! - **Nonce size**: 96 bits (12 bytes), freshly drawn for every call
//! - **Authentication**: Built into GCM mode (16-byte tag)
//! - **MAC**: HMAC-SHA-256 with a 512-bit (64 bytes) secret
//!
//! ## Encrypted Data Format
//!
//! ```text
//! [12-byte nonce][variable-length ciphertext][16-byte GCM tag]
//! ```
//!
//! Unlike on-disk blobs, sealed values travel inside text (substitution tokens,
//! client secrets), so there is no magic header: the base64 wrapper around them
//! is what identifies them.
//!
//! ## Unit Tests
//!
//! ```bash
//! cargo test crypto::
//! ```

use crate::error::{ConfigServerError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub const KEY_SIZE: usize = 32; // 256 bits
pub const NONCE_SIZE: usize = 12; // 96 bits for GCM
pub const TAG_SIZE: usize = 16;
pub const HMAC_SECRET_SIZE: usize = 64; // 512 bits

type HmacSha256 = Hmac<Sha256>;

/// AES-256 key used for substitution tokens and client secrets.
#[derive(Clone)]
pub struct CryptoKey {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

impl CryptoKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a key from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(ConfigServerError::InvalidKeyFormat(format!(
                "AES key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Encrypt data, returning `nonce || ciphertext || tag`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ConfigServerError::Crypto(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ConfigServerError::Crypto(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data produced by [`CryptoKey::encrypt`]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ConfigServerError::Crypto("Malformed cipher text".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ConfigServerError::Crypto(e.to_string()))?;

        let (nonce_bytes, encrypted_data) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, encrypted_data)
            .map_err(|e| ConfigServerError::Crypto(e.to_string()))
    }
}

/// HMAC-SHA-256 secret used to sign JSON web tokens.
#[derive(Clone)]
pub struct HmacSecret {
    secret: [u8; HMAC_SECRET_SIZE],
}

impl std::fmt::Debug for HmacSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacSecret([REDACTED])")
    }
}

impl HmacSecret {
    pub fn generate() -> Self {
        let mut secret = [0u8; HMAC_SECRET_SIZE];
        OsRng.fill_bytes(&mut secret);
        Self { secret }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HMAC_SECRET_SIZE {
            return Err(ConfigServerError::InvalidKeyFormat(format!(
                "HMAC secret must be {HMAC_SECRET_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut secret = [0u8; HMAC_SECRET_SIZE];
        secret.copy_from_slice(bytes);
        Ok(Self { secret })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        <HmacSha256 as Mac>::new_from_slice(&self.secret).expect("HMAC accepts any key length")
    }

    /// Compute the HMAC-SHA-256 digest of `data`
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Check `signature` against `data` in constant time
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(data);
        mac.verify_slice(signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB_PASSWORD: &[u8] = b"p4ssw0rd-for-payments-db";

    #[test]
    fn test_sealed_layout() {
        let key = CryptoKey::generate();
        let sealed = key.encrypt(DB_PASSWORD).unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + DB_PASSWORD.len() + TAG_SIZE);
        assert!(!sealed
            .windows(DB_PASSWORD.len())
            .any(|window| window == DB_PASSWORD));
        assert_eq!(key.decrypt(&sealed).unwrap(), DB_PASSWORD);
    }

    #[test]
    fn test_empty_value_is_only_nonce_and_tag() {
        let key = CryptoKey::generate();
        let sealed = key.encrypt(b"").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(key.decrypt(&sealed).unwrap(), b"");
    }

    #[test]
    fn test_multiline_yaml_value() {
        let key = CryptoKey::generate();
        let value = "-----BEGIN CERTIFICATE-----\nMIIB…\n-----END CERTIFICATE-----\nowner: équipe-paiements\n";

        let opened = key.decrypt(&key.encrypt(value.as_bytes()).unwrap()).unwrap();
        assert_eq!(String::from_utf8(opened).unwrap(), value);
    }

    #[test]
    fn test_each_seal_draws_a_fresh_nonce() {
        let key = CryptoKey::generate();
        let nonces: std::collections::HashSet<Vec<u8>> = (0..16)
            .map(|_| key.encrypt(DB_PASSWORD).unwrap()[..NONCE_SIZE].to_vec())
            .collect();

        assert_eq!(nonces.len(), 16);
    }

    #[test]
    fn test_value_sealed_by_another_server_is_rejected() {
        let sealed = CryptoKey::generate().encrypt(DB_PASSWORD).unwrap();
        assert!(CryptoKey::generate().decrypt(&sealed).is_err());
    }

    #[test]
    fn test_tampering_is_detected() {
        let key = CryptoKey::generate();
        let sealed = key.encrypt(DB_PASSWORD).unwrap();

        for index in [0, NONCE_SIZE, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert!(key.decrypt(&tampered).is_err(), "byte {index} not authenticated");
        }
    }

    #[test]
    fn test_short_input_is_rejected() {
        let key = CryptoKey::generate();

        assert!(key.decrypt(&[]).is_err());
        assert!(key.decrypt(&[0u8; NONCE_SIZE]).is_err());
        assert!(key.decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert!(CryptoKey::from_bytes(&[7u8; 16]).is_err());
        assert!(CryptoKey::from_bytes(&[7u8; 64]).is_err());
        assert!(CryptoKey::from_bytes(&[7u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_reloaded_key_opens_earlier_values() {
        let original = CryptoKey::generate();
        let sealed = original.encrypt(DB_PASSWORD).unwrap();

        let reloaded = CryptoKey::from_bytes(original.as_bytes()).unwrap();
        assert_eq!(reloaded.decrypt(&sealed).unwrap(), DB_PASSWORD);
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let secret = HmacSecret::generate();
        let signature = secret.sign(b"header.payload");

        assert_eq!(signature.len(), 32);
        assert!(secret.verify(b"header.payload", &signature));
        assert!(!secret.verify(b"header.payloaD", &signature));
    }

    #[test]
    fn test_hmac_wrong_secret_fails() {
        let secret1 = HmacSecret::generate();
        let secret2 = HmacSecret::generate();

        let signature = secret1.sign(b"data");
        assert!(!secret2.verify(b"data", &signature));
    }

    #[test]
    fn test_hmac_secret_from_invalid_length() {
        assert!(HmacSecret::from_bytes(&[1u8; 32]).is_err());
        assert!(HmacSecret::from_bytes(&[1u8; HMAC_SECRET_SIZE]).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = CryptoKey::from_bytes(&[0xAB; KEY_SIZE]).unwrap();
        assert_eq!(format!("{key:?}"), "CryptoKey([REDACTED])");
    }
}
