//! Hashing utilities
//!
//! - SHA-256 content hashes of ciphertext blocks (tamper check and upload id)
//! - HMAC-SHA256 keyed name hashes for collision checks
//! - BLAKE3 key derivation for session-key wrapping
//! - Random tokens used as passphrases and hash keys

use crate::{CryptoError, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a SHA-256 digest in bytes
pub const HASH_BYTE_SIZE: usize = 32;

/// Type alias for hash output bytes
pub type HashOutput = [u8; HASH_BYTE_SIZE];

/// SHA-256 digest of stored bytes, base64 encoded on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(HashOutput);

impl ContentHash {
    /// Hash a buffer
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from raw digest bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_BYTE_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "hash must be {} bytes, got {}",
                HASH_BYTE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; HASH_BYTE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Decode the base64 wire form
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &HashOutput {
        &self.0
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_base64())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Incremental SHA-256 hasher for data that arrives in chunks
#[derive(Default, Clone)]
pub struct IncrementalHasher {
    inner: Sha256,
    len: u64,
}

impl IncrementalHasher {
    /// Create a new hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing was hashed yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish and return the digest
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }
}

/// Keyed, deterministic hash of a name: HMAC-SHA256, lowercase hex
pub fn name_hash(hash_key: &[u8], name: &str) -> Result<String> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(hash_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(name.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Derive a 32-byte key from input keying material under a fixed context
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, material)
}

/// Fill a buffer of `len` random bytes from the OS generator
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut OsRng, &mut out);
    out
}

/// Random token: `len` random bytes, base64 encoded
pub fn random_token(len: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(random_bytes(len))
}

/// Constant-time equality for digests and tags
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
