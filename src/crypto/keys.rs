//! Key management for the encrypted PII map
//!
//! Keys live only in process memory. Nothing is persisted, so a restart (or an
//! explicit rotation) makes every earlier session permanently unreadable.

use super::{generate_key, KEY_SIZE};
use async_trait::async_trait;
use tokio::sync::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric AES-256 key.
///
/// Zeroized on drop to prevent key material from lingering in memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self(generate_key())
    }

    /// Wrap existing key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Issues the symmetric key used to seal PII maps.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Return the current key, creating one on first call.
    ///
    /// The key is stable across calls until the provider rotates it.
    async fn get_key(&self) -> EncryptionKey;
}

/// Key provider holding a single key for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryKeyProvider {
    key: RwLock<Option<EncryptionKey>>,
}

impl InMemoryKeyProvider {
    /// Create a provider with no key issued yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current key. The next `get_key()` issues a fresh one.
    pub async fn rotate(&self) {
        if self.key.write().await.take().is_some() {
            tracing::info!("Encryption key rotated; existing sessions are no longer readable");
        }
    }

    /// Whether a key has been issued
    pub async fn has_key(&self) -> bool {
        self.key.read().await.is_some()
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_key(&self) -> EncryptionKey {
        if let Some(key) = self.key.read().await.as_ref() {
            return key.clone();
        }

        let mut slot = self.key.write().await;
        // Another caller may have issued the key between the two locks
        slot.get_or_insert_with(EncryptionKey::generate).clone()
    }
}
