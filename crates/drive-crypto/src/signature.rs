//! Detached signatures
//!
//! A signature covers the SHA-256 digest of the signed bytes, prefixed by a
//! fixed domain string. Hashing first keeps verification of streamed data
//! bounded in memory.

use crate::{
    armor::{armor, dearmor, ArmorKind},
    hashing::{ContentHash, IncrementalHasher},
    keys::{KeyId, PrivateKey, PublicKey, KEY_ID_SIZE, SIGNATURE_SIZE},
    CryptoError, Result,
};

const SIGNATURE_VERSION: u8 = 1;
const SIGNATURE_DOMAIN: &[u8] = b"drive-crypto detached signature v1";

/// Serialized size of a signature body
pub const SIGNATURE_BODY_SIZE: usize = 1 + KEY_ID_SIZE + SIGNATURE_SIZE;

/// Signature over data supplied out of band
#[derive(Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    signer: KeyId,
    signature: [u8; SIGNATURE_SIZE],
}

impl DetachedSignature {
    /// Sign `data` with `key`
    pub fn sign(key: &PrivateKey, data: &[u8]) -> Self {
        Self::sign_digest(key, &ContentHash::of(data))
    }

    /// Sign a digest produced by [`IncrementalHasher`]
    pub fn sign_digest(key: &PrivateKey, digest: &ContentHash) -> Self {
        Self {
            signer: key.key_id(),
            signature: key.sign(&signed_message(digest)),
        }
    }

    /// Key id of the signer
    pub fn signer(&self) -> KeyId {
        self.signer
    }

    /// Verify over `data`; returns the id of the key that verified
    pub fn verify(&self, data: &[u8], keys: &[PublicKey]) -> Result<KeyId> {
        self.verify_digest(&ContentHash::of(data), keys)
    }

    /// Verify over a precomputed digest
    pub fn verify_digest(&self, digest: &ContentHash, keys: &[PublicKey]) -> Result<KeyId> {
        let key = keys
            .iter()
            .find(|k| k.key_id() == self.signer)
            .ok_or_else(|| {
                CryptoError::SignatureVerification(format!(
                    "no verification key matches signer {}",
                    self.signer
                ))
            })?;
        key.verify(&signed_message(digest), &self.signature)?;
        Ok(self.signer)
    }

    /// Verify data fed through an incremental hasher
    pub fn verify_hasher(&self, hasher: IncrementalHasher, keys: &[PublicKey]) -> Result<KeyId> {
        self.verify_digest(&hasher.finalize(), keys)
    }

    /// Serialize the signature body
    pub fn to_bytes(&self) -> [u8; SIGNATURE_BODY_SIZE] {
        let mut out = [0u8; SIGNATURE_BODY_SIZE];
        out[0] = SIGNATURE_VERSION;
        out[1..1 + KEY_ID_SIZE].copy_from_slice(self.signer.as_bytes());
        out[1 + KEY_ID_SIZE..].copy_from_slice(&self.signature);
        out
    }

    /// Parse a signature body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_BODY_SIZE {
            return Err(CryptoError::InvalidPacket(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_BODY_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != SIGNATURE_VERSION {
            return Err(CryptoError::InvalidPacket(format!(
                "unsupported signature version {}",
                bytes[0]
            )));
        }
        let signer = KeyId::from_bytes(&bytes[1..1 + KEY_ID_SIZE])?;
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[1 + KEY_ID_SIZE..]);
        Ok(Self { signer, signature })
    }

    /// Armor as a `PGP SIGNATURE` block
    pub fn to_armored(&self) -> String {
        armor(ArmorKind::Signature, &self.to_bytes())
    }

    /// Parse an armored signature
    pub fn from_armored(text: &str) -> Result<Self> {
        Self::from_bytes(&dearmor(ArmorKind::Signature, text)?)
    }
}

impl std::fmt::Debug for DetachedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DetachedSignature(signer: {})", self.signer)
    }
}

fn signed_message(digest: &ContentHash) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_DOMAIN.len() + 32);
    message.extend_from_slice(SIGNATURE_DOMAIN);
    message.extend_from_slice(digest.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = PrivateKey::generate();
        let sig = DetachedSignature::sign(&key, b"payload");
        assert_eq!(sig.verify(b"payload", &[key.public_key()]).unwrap(), key.key_id());
    }

    #[test]
    fn test_verify_picks_matching_key() {
        let signer = PrivateKey::generate();
        let other = PrivateKey::generate();
        let sig = DetachedSignature::sign(&signer, b"data");
        let keys = [other.public_key(), signer.public_key()];
        assert!(sig.verify(b"data", &keys).is_ok());
        assert!(sig.verify(b"data", &[other.public_key()]).is_err());
        assert!(sig.verify(b"data", &[]).is_err());
    }

    #[test]
    fn test_verify_rejects_modified_data() {
        let key = PrivateKey::generate();
        let sig = DetachedSignature::sign(&key, b"original");
        assert!(matches!(
            sig.verify(b"modified", &[key.public_key()]),
            Err(CryptoError::SignatureVerification(_))
        ));
    }

    #[test]
    fn test_incremental_verification() {
        let key = PrivateKey::generate();
        let data = vec![7u8; 100_000];
        let sig = DetachedSignature::sign(&key, &data);
        let mut hasher = IncrementalHasher::new();
        for chunk in data.chunks(4096) {
            hasher.update(chunk);
        }
        assert!(sig.verify_hasher(hasher, &[key.public_key()]).is_ok());
    }

    #[test]
    fn test_armor_roundtrip() {
        let key = PrivateKey::generate();
        let sig = DetachedSignature::sign(&key, b"x");
        let armored = sig.to_armored();
        assert!(armored.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert_eq!(DetachedSignature::from_armored(&armored).unwrap(), sig);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(DetachedSignature::from_bytes(&[0u8; 10]).is_err());
        let mut bytes = DetachedSignature::sign(&PrivateKey::generate(), b"x").to_bytes();
        bytes[0] = 9;
        assert!(DetachedSignature::from_bytes(&bytes).is_err());
    }
}
