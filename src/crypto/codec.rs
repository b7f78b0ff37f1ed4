//! Encrypted PII map codec
//!
//! The plaintext [`PiiMap`] only exists transiently; at rest it is always an
//! [`EncryptedPiiMap`] carrying the algorithm id, nonce and ciphertext.

use super::{open, seal, EncryptionKey};
use crate::error::{Error, Result};
use crate::privacy::PiiMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Algorithm identifier stored alongside every encrypted map
pub const ALGORITHM: &str = "AES-256-GCM";

/// Opaque, storable form of a PII map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPiiMap {
    /// Cipher used to seal the map
    pub algorithm: String,
    /// Base64 nonce
    pub nonce: String,
    /// Base64 ciphertext including the authentication tag
    pub ciphertext: String,
}

/// Serialize and seal a PII map under `key`.
pub fn encrypt_pii_map(map: &PiiMap, key: &EncryptionKey) -> Result<EncryptedPiiMap> {
    let plaintext = serde_json::to_vec(map)?;
    let (nonce, ciphertext) = seal(key.as_bytes(), &plaintext)?;

    Ok(EncryptedPiiMap {
        algorithm: ALGORITHM.to_string(),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Open an encrypted PII map with `key`.
///
/// Fails on a wrong or rotated key, an unknown algorithm, or any corruption
/// of the payload. No partial map is ever returned.
pub fn decrypt_pii_map(encrypted: &EncryptedPiiMap, key: &EncryptionKey) -> Result<PiiMap> {
    if encrypted.algorithm != ALGORITHM {
        return Err(Error::Crypto(format!(
            "Unsupported algorithm: {}",
            encrypted.algorithm
        )));
    }

    let nonce = STANDARD
        .decode(&encrypted.nonce)
        .map_err(|e| Error::Crypto(format!("Invalid nonce encoding: {}", e)))?;
    let ciphertext = STANDARD
        .decode(&encrypted.ciphertext)
        .map_err(|e| Error::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;

    let plaintext = open(key.as_bytes(), &nonce, &ciphertext)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Crypto(format!("Decrypted map is malformed: {}", e)))
}
