//! Per-revision content session keys

use crate::{
    cache::CacheSlot,
    model::{NodeId, NodeTree},
    verification::{SignatureFailure, Verified, VerificationStatus},
    DriveCrypto, DriveError, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use drive_crypto::{CryptoError, KeyPack, SessionKey};
use std::slice;
use tracing::{debug, instrument};

/// Content keys generated for a new revision
pub struct ContentKeys {
    pub session_key: SessionKey,
    /// Key packet wrapping `session_key` to the node key
    pub key_packet: Vec<u8>,
    pub key_packet_base64: String,
    /// Detached signature over the session key bytes by the node key
    pub signature: String,
}

impl std::fmt::Debug for ContentKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKeys")
            .field("key_packet_base64", &self.key_packet_base64)
            .finish_non_exhaustive()
    }
}

impl DriveCrypto {
    /// Generate a session key, wrap it to the node key and sign it with the node key
    pub fn generate_content_keys(&self, node: &KeyPack) -> Result<ContentKeys> {
        let session_key = self.engine.generate_session_key();
        let node_key = self.engine.public_key(&node.armored_key)?;
        let key_packet = self.engine.encrypt_session_key(&session_key, &node_key)?;
        let signature = self.engine.sign_detached(session_key.as_bytes(), node)?;
        Ok(ContentKeys {
            key_packet_base64: STANDARD.encode(&key_packet),
            session_key,
            key_packet,
            signature,
        })
    }

    /// Unwrap a file's content session key.
    ///
    /// The signature is checked against the node key plus the file signer's
    /// address keys, first over the session key and then over the key packet
    /// as older clients signed.
    #[instrument(skip_all, fields(file = %file))]
    pub fn decrypt_content_session_key(&self, tree: &NodeTree, file: &NodeId) -> Result<Verified<SessionKey>> {
        let node = tree.node(file)?;
        let (packet_base64, signature) = node.content_key().ok_or_else(|| DriveError::InvalidNode {
            id: file.to_string(),
            reason: "no content key packet".into(),
        })?;

        if let Some(hit) = self.cached_bytes(node.id.as_str(), CacheSlot::ContentKey, packet_base64) {
            let session_key = SessionKey::from_bytes(&hit.value)?;
            return Ok(Verified::new(session_key, hit.status));
        }

        let pack = self.resolve_node_key_pack(tree, file)?;
        let key_packet = decode_key_packet(packet_base64)
            .map_err(|e| DriveError::decryption(format!("content key of file {}", file), e))?;
        let session_key = self
            .engine
            .decrypt_session_key(&key_packet, slice::from_ref(&pack))
            .map_err(|e| DriveError::decryption(format!("content key of file {}", file), e))?;

        let mut keys = vec![self.engine.public_key(&node.node_key)?];
        keys.extend(self.verification_keys(node.signature_email.as_deref())?);

        let status = match signature {
            None => VerificationStatus::Unverified(SignatureFailure::Missing),
            Some(signature) => match self.check_detached(session_key.as_bytes(), Some(signature), &keys) {
                VerificationStatus::Verified => VerificationStatus::Verified,
                failed => {
                    let legacy = self.check_detached(&key_packet, Some(signature), &keys);
                    if legacy.is_verified() {
                        debug!(file = %file, "content key signed over key packet");
                        legacy
                    } else {
                        failed
                    }
                }
            },
        };
        let status = self.report(node.id.as_str(), "content key", status);

        self.remember(
            node.id.as_str(),
            CacheSlot::ContentKey,
            packet_base64,
            session_key.as_bytes(),
            &status,
        );
        Ok(Verified::new(session_key, status))
    }

    /// Unwrap a base64 content key packet with the node key pack
    pub(crate) fn unwrap_content_key(&self, content_key_packet: &str, node: &KeyPack) -> Result<SessionKey> {
        let key_packet = decode_key_packet(content_key_packet)
            .map_err(|e| DriveError::decryption("content key packet", e))?;
        self.engine
            .decrypt_session_key(&key_packet, slice::from_ref(node))
            .map_err(|e| DriveError::decryption("content key packet", e))
    }
}

fn decode_key_packet(base64: &str) -> std::result::Result<Vec<u8>, CryptoError> {
    Ok(STANDARD.decode(base64)?)
}
