//! Key material for the drive hierarchy
//!
//! - `SessionKey`: random symmetric key protecting one data packet family
//!   (a revision's blocks, a name, a passphrase)
//! - `PublicKey` / `PrivateKey`: X25519 encryption half plus Ed25519 signing half
//! - Locked private keys: the private halves sealed under a passphrase, armored
//!   together with the public halves so the public key can be read without it
//! - `KeyPack` / `KeyRing`: an armored key with its passphrase, and the scoped
//!   set of unlocked keys built from several packs

use crate::{
    armor::{armor, dearmor, ArmorKind},
    hashing::constant_time_eq,
    symmetric::{random_nonce, Aead, KEY_SIZE, NONCE_SIZE},
    CryptoError, Result,
};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of a key identifier in bytes
pub const KEY_ID_SIZE: usize = 8;

/// Size of serialized public key material (encryption + verifying halves)
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Size of an Ed25519 signature
pub const SIGNATURE_SIZE: usize = 64;

const LOCKED_KEY_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
const LOCK_INFO: &[u8] = b"drive-crypto private key lock v1";
const KEY_ID_CONTEXT: &str = "drive-crypto 2024-06 key id";

/// A symmetric session key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_SIZE],
}

impl SessionKey {
    /// Generate a new random session key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a session key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "session key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.key, &other.key)
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Short identifier of a key pair, carried in key packets and signatures
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; KEY_ID_SIZE]);

impl KeyId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_ID_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "key id must be {} bytes, got {}",
                KEY_ID_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; KEY_ID_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the id bytes
    pub fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

/// Public half of a key pair
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    encryption: [u8; 32],
    verifying: [u8; 32],
}

impl PublicKey {
    /// Create from the 64-byte serialized form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        let mut encryption = [0u8; 32];
        let mut verifying = [0u8; 32];
        encryption.copy_from_slice(&bytes[..32]);
        verifying.copy_from_slice(&bytes[32..]);
        VerifyingKey::from_bytes(&verifying)
            .map_err(|e| CryptoError::InvalidKey(format!("verifying key: {}", e)))?;
        Ok(Self {
            encryption,
            verifying,
        })
    }

    /// Serialize as encryption half followed by verifying half
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out[..32].copy_from_slice(&self.encryption);
        out[32..].copy_from_slice(&self.verifying);
        out
    }

    /// Identifier derived from the public material
    pub fn key_id(&self) -> KeyId {
        let digest = blake3::derive_key(KEY_ID_CONTEXT, &self.to_bytes());
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&digest[..KEY_ID_SIZE]);
        KeyId(id)
    }

    /// X25519 public key used to wrap session keys
    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.encryption
    }

    /// Verify an Ed25519 signature made by the matching private key
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.verifying)
            .map_err(|e| CryptoError::InvalidKey(format!("verifying key: {}", e)))?;
        key.verify_strict(message, &Signature::from_bytes(signature))
            .map_err(|_| {
                CryptoError::SignatureVerification(format!("bad signature from {}", self.key_id()))
            })
    }

    /// Armor the public key
    pub fn to_armored(&self) -> String {
        armor(ArmorKind::PublicKey, &self.to_bytes())
    }

    /// Parse an armored public key, or read the public half of an armored
    /// private key
    pub fn from_armored(text: &str) -> Result<Self> {
        match crate::armor::dearmor_any(text)? {
            (ArmorKind::PublicKey, bytes) => Self::from_bytes(&bytes),
            (ArmorKind::PrivateKey, bytes) => LockedKey::parse(&bytes).map(|locked| locked.public),
            (kind, _) => Err(CryptoError::InvalidKey(format!(
                "expected a key, found {}",
                kind.label()
            ))),
        }
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

/// Unlocked private key; wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    encryption: [u8; 32],
    signing: [u8; 32],
}

impl PrivateKey {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut encryption = [0u8; 32];
        let mut signing = [0u8; 32];
        rand::RngCore::fill_bytes(&mut OsRng, &mut encryption);
        rand::RngCore::fill_bytes(&mut OsRng, &mut signing);
        Self {
            encryption,
            signing,
        }
    }

    /// Derive the public half
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.encryption);
        let signing = SigningKey::from_bytes(&self.signing);
        PublicKey {
            encryption: *X25519Public::from(&secret).as_bytes(),
            verifying: signing.verifying_key().to_bytes(),
        }
    }

    /// Identifier of the public half
    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    /// X25519 agreement with an ephemeral public key
    pub(crate) fn agree(&self, their_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let secret = StaticSecret::from(self.encryption);
        let shared = secret.diffie_hellman(&X25519Public::from(*their_public));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey("non-contributory key agreement".into()));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }

    /// Ed25519 signature over `message`
    pub(crate) fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        SigningKey::from_bytes(&self.signing).sign(message).to_bytes()
    }

    /// Seal the private halves under `passphrase` and armor the result
    pub fn lock(&self, passphrase: &str) -> Result<String> {
        let public = self.public_key();
        let mut salt = [0u8; SALT_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut salt);
        let nonce = random_nonce();

        let lock_key = derive_lock_key(passphrase, &salt)?;
        let mut secret = Zeroizing::new([0u8; 64]);
        secret[..32].copy_from_slice(&self.encryption);
        secret[32..].copy_from_slice(&self.signing);

        let aad = locked_key_aad(&public);
        let sealed = Aead::new_default(&lock_key).seal(&nonce, &secret[..], &aad)?;

        let mut out = Vec::with_capacity(1 + PUBLIC_KEY_SIZE + SALT_SIZE + NONCE_SIZE + sealed.len());
        out.push(LOCKED_KEY_VERSION);
        out.extend_from_slice(&public.to_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(armor(ArmorKind::PrivateKey, &out))
    }

    /// Unlock an armored private key with its passphrase
    pub fn unlock(armored: &str, passphrase: &str) -> Result<Self> {
        let bytes = dearmor(ArmorKind::PrivateKey, armored)?;
        let locked = LockedKey::parse(&bytes)?;
        let lock_key = derive_lock_key(passphrase, &locked.salt)?;
        let secret = Zeroizing::new(
            Aead::new_default(&lock_key)
                .open(&locked.nonce, locked.sealed, &locked_key_aad(&locked.public))
                .map_err(|_| CryptoError::WrongPassphrase(locked.public.key_id().to_string()))?,
        );
        if secret.len() != 64 {
            return Err(CryptoError::InvalidKey("sealed key has wrong length".into()));
        }
        let mut key = Self {
            encryption: [0u8; 32],
            signing: [0u8; 32],
        };
        key.encryption.copy_from_slice(&secret[..32]);
        key.signing.copy_from_slice(&secret[32..]);
        if key.public_key() != locked.public {
            return Err(CryptoError::InvalidKey(
                "private material does not match public key".into(),
            ));
        }
        Ok(key)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.key_id())
    }
}

struct LockedKey<'a> {
    public: PublicKey,
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    sealed: &'a [u8],
}

impl<'a> LockedKey<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = 1 + PUBLIC_KEY_SIZE + SALT_SIZE + NONCE_SIZE;
        if bytes.len() <= header {
            return Err(CryptoError::InvalidKey("locked key is truncated".into()));
        }
        if bytes[0] != LOCKED_KEY_VERSION {
            return Err(CryptoError::InvalidKey(format!(
                "unsupported locked key version {}",
                bytes[0]
            )));
        }
        let public = PublicKey::from_bytes(&bytes[1..1 + PUBLIC_KEY_SIZE])?;
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[1 + PUBLIC_KEY_SIZE..1 + PUBLIC_KEY_SIZE + SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[header - NONCE_SIZE..header]);
        Ok(Self {
            public,
            salt,
            nonce,
            sealed: &bytes[header..],
        })
    }
}

fn derive_lock_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(LOCK_INFO, &mut okm)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(okm)
}

fn locked_key_aad(public: &PublicKey) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + PUBLIC_KEY_SIZE);
    aad.push(LOCKED_KEY_VERSION);
    aad.extend_from_slice(&public.to_bytes());
    aad
}

/// An armored locked private key together with the passphrase that unlocks it
#[derive(Clone)]
pub struct KeyPack {
    /// Armored, passphrase-locked private key
    pub armored_key: String,
    /// Passphrase for `armored_key`
    pub passphrase: Zeroizing<String>,
}

impl KeyPack {
    /// Bundle a key with its passphrase
    pub fn new(armored_key: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            armored_key: armored_key.into(),
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    /// Generate a fresh key pair locked under `passphrase`
    pub fn generate(passphrase: impl Into<String>) -> Result<Self> {
        let passphrase = passphrase.into();
        let armored_key = PrivateKey::generate().lock(&passphrase)?;
        Ok(Self::new(armored_key, passphrase))
    }

    /// Unlock the private key
    pub fn unlock(&self) -> Result<PrivateKey> {
        PrivateKey::unlock(&self.armored_key, &self.passphrase)
    }

    /// Read the public half without unlocking
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_armored(&self.armored_key)
    }
}

impl fmt::Debug for KeyPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .public_key()
            .map(|k| k.key_id().to_string())
            .unwrap_or_else(|_| "invalid".into());
        write!(f, "KeyPack({}, passphrase: [REDACTED])", id)
    }
}

/// Unlocked keys for the duration of one operation.
///
/// Keys wipe themselves when the ring goes out of scope.
pub struct KeyRing {
    keys: Vec<PrivateKey>,
}

impl KeyRing {
    /// Unlock every pack that opens; fails only when none does
    pub fn unlock(packs: &[KeyPack]) -> Result<Self> {
        let mut keys = Vec::with_capacity(packs.len());
        let mut last_error = None;
        for pack in packs {
            match pack.unlock() {
                Ok(key) => keys.push(key),
                Err(e) => last_error = Some(e),
            }
        }
        if keys.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| CryptoError::NoMatchingKey("empty key ring".into())));
        }
        Ok(Self { keys })
    }

    /// Find the key with the given id
    pub fn find(&self, id: &KeyId) -> Option<&PrivateKey> {
        self.keys.iter().find(|k| &k.key_id() == id)
    }

    /// First key of the ring, used for signing
    pub fn primary(&self) -> &PrivateKey {
        // non-empty by construction
        &self.keys[0]
    }

    /// Number of unlocked keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a constructed ring
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Parse armored public keys; any malformed key is an error
pub fn parse_public_keys(armored: &[String]) -> Result<Vec<PublicKey>> {
    armored.iter().map(|k| PublicKey::from_armored(k)).collect()
}
