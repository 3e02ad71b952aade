//! Symmetric authenticated encryption (AES-256-GCM, ChaCha20-Poly1305)
//!
//! Used for session-key wrapping, private-key locking and the chunks of
//! data packets. Every call takes the nonce and associated data explicitly.

use crate::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead as AeadTrait, Payload},
    Aes256Gcm, KeyInit,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Supported AEAD ciphers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AeadCipher {
    /// AES-256-GCM
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadCipher {
    /// Identifier stored in packet headers
    pub fn id(&self) -> u8 {
        match self {
            Self::Aes256Gcm => 1,
            Self::ChaCha20Poly1305 => 2,
        }
    }

    /// Parse a packet header identifier
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Self::Aes256Gcm),
            2 => Ok(Self::ChaCha20Poly1305),
            other => Err(CryptoError::InvalidPacket(format!(
                "unknown cipher id {}",
                other
            ))),
        }
    }

    /// Get the algorithm identifier string
    pub fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }
}

/// Generate a random nonce
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut OsRng, &mut nonce);
    nonce
}

/// AEAD encryption/decryption with a fixed key
pub struct Aead {
    cipher: AeadCipher,
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Aead {
    /// Create a new AEAD instance with the given key and cipher
    pub fn new(key: &[u8; KEY_SIZE], cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: Zeroizing::new(*key),
        }
    }

    /// Create with the default cipher (AES-256-GCM)
    pub fn new_default(key: &[u8; KEY_SIZE]) -> Self {
        Self::new(key, AeadCipher::default())
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: plaintext, aad };
        let sealed = match self.cipher {
            AeadCipher::Aes256Gcm => Aes256Gcm::new_from_slice(&self.key[..])
                .map_err(|e| CryptoError::Encryption(e.to_string()))?
                .encrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            AeadCipher::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.key[..])
                .map_err(|e| CryptoError::Encryption(e.to_string()))?
                .encrypt(chacha20poly1305::Nonce::from_slice(nonce), payload),
        };
        sealed.map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt and authenticate `ciphertext` against `aad`
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "ciphertext shorter than tag: {} bytes",
                ciphertext.len()
            )));
        }
        let payload = Payload { msg: ciphertext, aad };
        let opened = match self.cipher {
            AeadCipher::Aes256Gcm => Aes256Gcm::new_from_slice(&self.key[..])
                .map_err(|e| CryptoError::Decryption(e.to_string()))?
                .decrypt(aes_gcm::Nonce::from_slice(nonce), payload),
            AeadCipher::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.key[..])
                .map_err(|e| CryptoError::Decryption(e.to_string()))?
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), payload),
        };
        opened.map_err(|_| CryptoError::Decryption("authentication tag mismatch".into()))
    }
}
