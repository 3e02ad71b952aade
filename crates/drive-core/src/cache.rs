//! Side-cache of decrypted values
//!
//! Entries are keyed by `(entity id, slot)` and remember a fingerprint of
//! the ciphertext they were derived from, so a changed ciphertext is a miss
//! without explicit invalidation. Values are wiped when evicted.

use crate::verification::{Verified, VerificationStatus};
use dashmap::DashMap;
use drive_crypto::ContentHash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Kind of value cached for an entity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSlot {
    /// Node passphrase
    Passphrase,
    /// Share passphrase
    SharePassphrase,
    /// Node name
    Name,
    /// Folder name-hash key
    HashKey,
    /// File content session key
    ContentKey,
}

/// Hook receiving every freshly decrypted value
pub trait CachePersistence: Send + Sync {
    /// Store a decrypted value for `entity`
    fn persist_decrypted(&self, entity: &str, slot: CacheSlot, value: &[u8]);
}

struct CacheEntry {
    fingerprint: ContentHash,
    value: Zeroizing<Vec<u8>>,
    status: VerificationStatus,
}

/// Cache of decrypted values with caller-controlled invalidation
#[derive(Default)]
pub struct DecryptedCache {
    entries: DashMap<(String, CacheSlot), CacheEntry>,
    persistence: RwLock<Option<Arc<dyn CachePersistence>>>,
}

impl DecryptedCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the persistence hook
    pub fn set_persistence(&self, hook: Arc<dyn CachePersistence>) {
        *self.persistence.write() = Some(hook);
    }

    /// Cached value for `entity`, if it was derived from `ciphertext`
    pub fn get(
        &self,
        entity: &str,
        slot: CacheSlot,
        ciphertext: &[u8],
    ) -> Option<Verified<Zeroizing<Vec<u8>>>> {
        let entry = self.entries.get(&(entity.to_string(), slot))?;
        if entry.fingerprint != ContentHash::of(ciphertext) {
            return None;
        }
        Some(Verified::new(entry.value.clone(), entry.status.clone()))
    }

    /// Cache a value derived from `ciphertext` and hand it to the hook
    pub fn insert(
        &self,
        entity: &str,
        slot: CacheSlot,
        ciphertext: &[u8],
        value: &[u8],
        status: VerificationStatus,
    ) {
        self.entries.insert(
            (entity.to_string(), slot),
            CacheEntry {
                fingerprint: ContentHash::of(ciphertext),
                value: Zeroizing::new(value.to_vec()),
                status,
            },
        );
        if let Some(hook) = self.persistence.read().as_ref() {
            hook.persist_decrypted(entity, slot, value);
        }
    }

    /// Drop every slot cached for `entity`
    pub fn invalidate(&self, entity: &str) {
        self.entries.retain(|(id, _), _| id != entity);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
