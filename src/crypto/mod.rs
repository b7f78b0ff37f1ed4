//! Cryptographic utilities for the PII map
//!
//! Provides AES-256-GCM sealing, the process-lifetime key provider, and the
//! codec that turns a plaintext PII map into its storable encrypted form.

mod codec;
mod keys;

pub use codec::{decrypt_pii_map, encrypt_pii_map, EncryptedPiiMap, ALGORITHM};
pub use keys::{EncryptionKey, InMemoryKeyProvider, KeyProvider};

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// Encrypt data using AES-256-GCM with a fresh random nonce.
///
/// Returns the nonce and the ciphertext (tag appended) separately.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt data sealed by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

/// Generate a random encryption key
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
