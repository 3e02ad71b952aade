//! # Drive Crypto
//!
//! Cryptographic engine for end-to-end encrypted drive storage.
//!
//! This crate provides:
//! - **Locked private keys**: X25519 + Ed25519 key pairs sealed under a passphrase
//! - **Messages**: key packets wrapping a session key, followed by one chunked
//!   AEAD data packet, optionally carrying an attached signature
//! - **Detached signatures**: Ed25519 over a SHA-256 digest, verifiable in a
//!   single streaming pass
//! - **Armor**: `-----BEGIN PGP ...-----` envelopes for every artifact
//! - **Streaming**: bounded-memory decryption with cooperative cancellation
//!
//! Everything above the primitives is exposed through the [`CryptoEngine`]
//! trait, implemented by [`NativeEngine`].
//!
//! ## Security Model
//!
//! - Private keys are only unlocked inside a [`KeyRing`] scoped to one call
//! - Session keys and passphrases are zeroized on drop
//! - Every data chunk is authenticated; truncation and reordering are detected
//!
//! ## Example
//!
//! ```rust,ignore
//! use drive_crypto::{CryptoEngine, KeyPack, NativeEngine};
//!
//! let engine = NativeEngine::new();
//! let key = KeyPack::new(engine.generate_key("passphrase")?, "passphrase");
//! let recipient = engine.public_key(&key.armored_key)?;
//!
//! let armored = engine.encrypt(b"Hello, World!", &recipient, Some(&key))?;
//! let decrypted = engine.decrypt(&armored, &[key], &[recipient])?;
//! assert!(decrypted.signature.is_verified());
//! ```

pub mod armor;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod packet;
pub mod signature;
pub mod streaming;
pub mod symmetric;

pub use armor::{armor, dearmor, ArmorKind};
pub use engine::{CryptoEngine, Decrypted, DetachedCheck, EngineConfig, NativeEngine, SignatureStatus};
pub use error::{CryptoError, Result};
pub use hashing::{name_hash, ContentHash, IncrementalHasher};
pub use keys::{KeyId, KeyPack, KeyRing, PrivateKey, PublicKey, SessionKey};
pub use packet::SplitMessage;
pub use signature::DetachedSignature;
pub use streaming::{decrypt_stream, StreamOutcome};
pub use symmetric::{Aead, AeadCipher};

/// Default cleartext chunk size for data packets (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
