//! The engine boundary
//!
//! [`CryptoEngine`] is everything the drive codecs need from an OpenPGP-style
//! engine: key generation, session-key wrap/unwrap, encrypt/decrypt with
//! optional attached signatures, detached signatures, and message
//! split/join. Keys cross the boundary in armored form; private keys travel
//! as [`KeyPack`]s and are unlocked into a [`KeyRing`] that lives only for the
//! duration of one call.
//!
//! [`NativeEngine`] implements the trait on top of this crate's packet layer.

use crate::{
    armor::{armor, dearmor, ArmorKind},
    keys::{parse_public_keys, KeyId, KeyPack, KeyRing, PrivateKey, PublicKey, SessionKey},
    packet::{open_data_packet, parse_key_packets, seal_data_packet, KeyPacket, SplitMessage},
    signature::DetachedSignature,
    streaming::decrypt_stream,
    symmetric::AeadCipher,
    CryptoError, Result, DEFAULT_CHUNK_SIZE,
};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;

/// Outcome of checking a signature while decrypting
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Signature verified by the key with this id
    Verified(KeyId),
    /// The data carried no signature
    NotSigned,
    /// Signed, but no verification keys were supplied
    NotChecked,
    /// Signature present but invalid, or made by an unknown key
    Failed(String),
}

impl SignatureStatus {
    /// Whether the signature verified
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Cleartext plus the status of its attached signature
#[derive(Debug)]
pub struct Decrypted {
    /// Decrypted bytes
    pub data: Vec<u8>,
    /// Attached signature status
    pub signature: SignatureStatus,
}

/// Detached signature to check against streamed cleartext
#[derive(Clone, Copy, Debug)]
pub struct DetachedCheck<'a> {
    /// Armored detached signature
    pub signature: &'a str,
    /// Armored public keys allowed to have made it
    pub verification_keys: &'a [String],
}

/// OpenPGP-style engine consumed by the drive codecs
pub trait CryptoEngine: Send + Sync {
    /// Generate a key pair and return the private key locked under `passphrase`
    fn generate_key(&self, passphrase: &str) -> Result<String>;

    /// Armored public key of an armored (public or private) key
    fn public_key(&self, armored_key: &str) -> Result<String>;

    /// Fresh random session key
    fn generate_session_key(&self) -> SessionKey;

    /// Wrap a session key for `recipient`, returning one framed key packet
    fn encrypt_session_key(&self, session_key: &SessionKey, recipient: &str) -> Result<Vec<u8>>;

    /// Unwrap the session key from framed key packets with any of `keys`
    fn decrypt_session_key(&self, key_packets: &[u8], keys: &[KeyPack]) -> Result<SessionKey>;

    /// Encrypt to `recipient` under a fresh session key, optionally signing
    fn encrypt(&self, plaintext: &[u8], recipient: &str, signer: Option<&KeyPack>) -> Result<String>;

    /// Encrypt to `recipient` reusing `session_key` for the data packet
    fn encrypt_with_session_key(
        &self,
        plaintext: &[u8],
        session_key: &SessionKey,
        recipient: &str,
        signer: Option<&KeyPack>,
    ) -> Result<String>;

    /// Decrypt an armored message, checking an attached signature against
    /// `verification_keys`
    fn decrypt(&self, armored: &str, keys: &[KeyPack], verification_keys: &[String]) -> Result<Decrypted>;

    /// Encrypt into a bare framed data packet under `session_key`
    fn encrypt_data_packet(
        &self,
        plaintext: &[u8],
        session_key: &SessionKey,
        signer: Option<&KeyPack>,
    ) -> Result<Vec<u8>>;

    /// Decrypt a bare framed data packet held in memory
    fn decrypt_data_packet(
        &self,
        data_packet: &[u8],
        session_key: &SessionKey,
        verification_keys: &[String],
    ) -> Result<Decrypted>;

    /// Decrypt a bare framed data packet from `input` into `output` in bounded
    /// memory, checking `detached` over the streamed cleartext
    fn decrypt_data_packet_stream(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        session_key: &SessionKey,
        detached: Option<DetachedCheck<'_>>,
        cancel: &AtomicBool,
    ) -> Result<SignatureStatus>;

    /// Armored detached signature over `data`
    fn sign_detached(&self, data: &[u8], signer: &KeyPack) -> Result<String>;

    /// Verify an armored detached signature; error when it does not verify
    fn verify_detached(&self, data: &[u8], signature: &str, verification_keys: &[String]) -> Result<()>;

    /// Split an armored message into key packets and data packet
    fn split_message(&self, armored: &str) -> Result<SplitMessage>;

    /// Recompose an armored message
    fn join_message(&self, split: &SplitMessage) -> String;

    /// Number of key packets in an armored message
    fn key_packet_count(&self, armored: &str) -> Result<usize> {
        self.split_message(armored)?.key_packet_count()
    }
}

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cipher for new data packets
    pub cipher: AeadCipher,
    /// Cleartext chunk size for new data packets
    pub chunk_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cipher: AeadCipher::Aes256Gcm,
            chunk_size: DEFAULT_CHUNK_SIZE as u32,
        }
    }
}

impl EngineConfig {
    /// Set the data packet cipher
    pub fn with_cipher(mut self, cipher: AeadCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Set the data packet chunk size
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// [`CryptoEngine`] built on this crate's packet format
#[derive(Clone, Debug, Default)]
pub struct NativeEngine {
    config: EngineConfig,
}

impl NativeEngine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn seal(&self, plaintext: &[u8], session_key: &SessionKey, signer: Option<&KeyPack>) -> Result<Vec<u8>> {
        match signer {
            Some(pack) => {
                let ring = KeyRing::unlock(std::slice::from_ref(pack))?;
                seal_data_packet(
                    session_key,
                    self.config.cipher,
                    self.config.chunk_size,
                    plaintext,
                    Some(ring.primary()),
                )
            }
            None => seal_data_packet(
                session_key,
                self.config.cipher,
                self.config.chunk_size,
                plaintext,
                None,
            ),
        }
    }

    fn message(&self, key_packet: Vec<u8>, data_packet: Vec<u8>) -> String {
        self.join_message(&SplitMessage {
            key_packets: key_packet,
            data_packet,
        })
    }
}

impl CryptoEngine for NativeEngine {
    fn generate_key(&self, passphrase: &str) -> Result<String> {
        PrivateKey::generate().lock(passphrase)
    }

    fn public_key(&self, armored_key: &str) -> Result<String> {
        Ok(PublicKey::from_armored(armored_key)?.to_armored())
    }

    fn generate_session_key(&self) -> SessionKey {
        SessionKey::generate()
    }

    fn encrypt_session_key(&self, session_key: &SessionKey, recipient: &str) -> Result<Vec<u8>> {
        let recipient = PublicKey::from_armored(recipient)?;
        KeyPacket::seal(session_key, &recipient)?.to_frame()
    }

    fn decrypt_session_key(&self, key_packets: &[u8], keys: &[KeyPack]) -> Result<SessionKey> {
        let packets = parse_key_packets(key_packets)?;
        let ring = KeyRing::unlock(keys)?;
        let mut last_error = None;
        for packet in &packets {
            if let Some(key) = ring.find(&packet.recipient()) {
                match packet.open(key) {
                    Ok(session_key) => return Ok(session_key),
                    Err(e) => last_error = Some(e),
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            let recipients: Vec<String> = packets.iter().map(|p| p.recipient().to_string()).collect();
            CryptoError::NoMatchingKey(format!("message is for [{}]", recipients.join(", ")))
        }))
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &str, signer: Option<&KeyPack>) -> Result<String> {
        let session_key = SessionKey::generate();
        self.encrypt_with_session_key(plaintext, &session_key, recipient, signer)
    }

    fn encrypt_with_session_key(
        &self,
        plaintext: &[u8],
        session_key: &SessionKey,
        recipient: &str,
        signer: Option<&KeyPack>,
    ) -> Result<String> {
        let key_packet = self.encrypt_session_key(session_key, recipient)?;
        let data_packet = self.seal(plaintext, session_key, signer)?;
        Ok(self.message(key_packet, data_packet))
    }

    fn decrypt(&self, armored: &str, keys: &[KeyPack], verification_keys: &[String]) -> Result<Decrypted> {
        let split = self.split_message(armored)?;
        let session_key = self.decrypt_session_key(&split.key_packets, keys)?;
        self.decrypt_data_packet(&split.data_packet, &session_key, verification_keys)
    }

    fn encrypt_data_packet(
        &self,
        plaintext: &[u8],
        session_key: &SessionKey,
        signer: Option<&KeyPack>,
    ) -> Result<Vec<u8>> {
        self.seal(plaintext, session_key, signer)
    }

    fn decrypt_data_packet(
        &self,
        data_packet: &[u8],
        session_key: &SessionKey,
        verification_keys: &[String],
    ) -> Result<Decrypted> {
        let opened = open_data_packet(data_packet, session_key)?;
        let signature = match opened.signature {
            None => SignatureStatus::NotSigned,
            Some(_) if verification_keys.is_empty() => SignatureStatus::NotChecked,
            Some(sig) => check(|keys| sig.verify(&opened.literal, keys), verification_keys),
        };
        Ok(Decrypted {
            data: opened.literal,
            signature,
        })
    }

    fn decrypt_data_packet_stream(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        session_key: &SessionKey,
        detached: Option<DetachedCheck<'_>>,
        cancel: &AtomicBool,
    ) -> Result<SignatureStatus> {
        let outcome = decrypt_stream(input, output, session_key, cancel)?;
        let status = match detached {
            Some(check_with) => match DetachedSignature::from_armored(check_with.signature) {
                Ok(sig) => check(
                    |keys| sig.verify_digest(&outcome.digest, keys),
                    check_with.verification_keys,
                ),
                Err(e) => SignatureStatus::Failed(e.to_string()),
            },
            None if outcome.embedded_signature.is_some() => SignatureStatus::NotChecked,
            None => SignatureStatus::NotSigned,
        };
        Ok(status)
    }

    fn sign_detached(&self, data: &[u8], signer: &KeyPack) -> Result<String> {
        let ring = KeyRing::unlock(std::slice::from_ref(signer))?;
        Ok(DetachedSignature::sign(ring.primary(), data).to_armored())
    }

    fn verify_detached(&self, data: &[u8], signature: &str, verification_keys: &[String]) -> Result<()> {
        let sig = DetachedSignature::from_armored(signature)?;
        let keys = parse_public_keys(verification_keys)?;
        sig.verify(data, &keys).map(|_| ())
    }

    fn split_message(&self, armored: &str) -> Result<SplitMessage> {
        SplitMessage::from_bytes(&dearmor(ArmorKind::Message, armored)?)
    }

    fn join_message(&self, split: &SplitMessage) -> String {
        armor(ArmorKind::Message, &split.to_bytes())
    }
}

fn check<F>(verify: F, verification_keys: &[String]) -> SignatureStatus
where
    F: FnOnce(&[PublicKey]) -> Result<KeyId>,
{
    match parse_public_keys(verification_keys) {
        Ok(keys) => match verify(&keys) {
            Ok(id) => SignatureStatus::Verified(id),
            Err(e) => SignatureStatus::Failed(e.to_string()),
        },
        Err(e) => SignatureStatus::Failed(format!("unusable verification key: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pack(engine: &NativeEngine, passphrase: &str) -> KeyPack {
        KeyPack::new(engine.generate_key(passphrase).unwrap(), passphrase)
    }

    fn public(engine: &NativeEngine, pack: &KeyPack) -> String {
        engine.public_key(&pack.armored_key).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_unsigned() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "pw");
        let armored = engine.encrypt(b"hello", &public(&engine, &recipient), None).unwrap();
        assert!(armored.starts_with("-----BEGIN PGP MESSAGE-----"));

        let out = engine.decrypt(&armored, &[recipient], &[]).unwrap();
        assert_eq!(out.data, b"hello");
        assert_eq!(out.signature, SignatureStatus::NotSigned);
    }

    #[test]
    fn test_encrypt_to_private_key_armor() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "pw");
        let armored = engine.encrypt(b"x", &recipient.armored_key, None).unwrap();
        assert_eq!(engine.decrypt(&armored, &[recipient], &[]).unwrap().data, b"x");
    }

    #[test]
    fn test_signature_statuses() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "a");
        let signer = pack(&engine, "b");
        let stranger = pack(&engine, "c");
        let armored = engine
            .encrypt(b"signed", &public(&engine, &recipient), Some(&signer))
            .unwrap();

        let verified = engine
            .decrypt(&armored, &[recipient.clone()], &[public(&engine, &signer)])
            .unwrap();
        assert!(verified.signature.is_verified());

        let unchecked = engine.decrypt(&armored, &[recipient.clone()], &[]).unwrap();
        assert_eq!(unchecked.signature, SignatureStatus::NotChecked);

        let failed = engine
            .decrypt(&armored, &[recipient], &[public(&engine, &stranger)])
            .unwrap();
        assert!(matches!(failed.signature, SignatureStatus::Failed(_)));
        assert_eq!(failed.data, b"signed");
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "a");
        let other = pack(&engine, "b");
        let armored = engine.encrypt(b"x", &public(&engine, &recipient), None).unwrap();
        assert!(matches!(
            engine.decrypt(&armored, &[other], &[]),
            Err(CryptoError::NoMatchingKey(_))
        ));
    }

    #[test]
    fn test_decrypt_wrong_passphrase_fails() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "a");
        let armored = engine.encrypt(b"x", &public(&engine, &recipient), None).unwrap();
        let wrong = KeyPack::new(recipient.armored_key.clone(), "not-a");
        assert!(matches!(
            engine.decrypt(&armored, &[wrong], &[]),
            Err(CryptoError::WrongPassphrase(_))
        ));
    }

    #[test]
    fn test_session_key_wrap_unwrap() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "pw");
        let sk = engine.generate_session_key();
        let packet = engine.encrypt_session_key(&sk, &public(&engine, &recipient)).unwrap();
        assert_eq!(engine.decrypt_session_key(&packet, &[recipient]).unwrap(), sk);
    }

    #[test]
    fn test_encrypt_with_session_key_shares_data_key() {
        let engine = NativeEngine::new();
        let a = pack(&engine, "a");
        let b = pack(&engine, "b");
        let sk = engine.generate_session_key();
        let to_a = engine
            .encrypt_with_session_key(b"name", &sk, &public(&engine, &a), None)
            .unwrap();
        let to_b = engine
            .encrypt_with_session_key(b"name", &sk, &public(&engine, &b), None)
            .unwrap();
        let split_a = engine.split_message(&to_a).unwrap();
        let split_b = engine.split_message(&to_b).unwrap();
        assert_eq!(engine.decrypt_session_key(&split_a.key_packets, &[a]).unwrap(), sk);
        assert_eq!(engine.decrypt_session_key(&split_b.key_packets, &[b]).unwrap(), sk);
    }

    #[test]
    fn test_detached_sign_verify() {
        let engine = NativeEngine::new();
        let signer = pack(&engine, "pw");
        let sig = engine.sign_detached(b"data", &signer).unwrap();
        let keys = vec![public(&engine, &signer)];
        assert!(engine.verify_detached(b"data", &sig, &keys).is_ok());
        assert!(engine.verify_detached(b"tampered", &sig, &keys).is_err());
    }

    #[test]
    fn test_split_join_and_count() {
        let engine = NativeEngine::new();
        let recipient = pack(&engine, "pw");
        let armored = engine.encrypt(b"x", &public(&engine, &recipient), None).unwrap();
        let split = engine.split_message(&armored).unwrap();
        assert_eq!(engine.join_message(&split), armored);
        assert_eq!(engine.key_packet_count(&armored).unwrap(), 1);
    }

    #[test]
    fn test_stream_with_detached_signature() {
        let engine = NativeEngine::with_config(EngineConfig::default().with_chunk_size(1024));
        let signer = pack(&engine, "pw");
        let sk = engine.generate_session_key();
        let data = vec![42u8; 10_000];
        let packet = engine.encrypt_data_packet(&data, &sk, None).unwrap();
        let sig = engine.sign_detached(&data, &signer).unwrap();
        let keys = vec![public(&engine, &signer)];

        let mut out = Vec::new();
        let status = engine
            .decrypt_data_packet_stream(
                &mut Cursor::new(&packet),
                &mut out,
                &sk,
                Some(DetachedCheck {
                    signature: &sig,
                    verification_keys: &keys,
                }),
                &AtomicBool::new(false),
            )
            .unwrap();
        assert_eq!(out, data);
        assert!(status.is_verified());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"cipher":"chacha20poly1305"}"#).unwrap();
        assert_eq!(config.cipher, AeadCipher::ChaCha20Poly1305);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE as u32);
    }
}
