//! Content blocks
//!
//! Each block is an independent data packet under the revision's content
//! session key. The detached signature of the cleartext is encrypted to the
//! node key and travels next to the block. The stored SHA-256 of the
//! ciphertext is checked before anything is decrypted.

use crate::{
    cancel::CancellationToken,
    drive::check_content_hash,
    model::{Block, NodeTree, Revision, RevisionId},
    provider::BlockSource,
    verification::{SignatureFailure, Verified, VerificationStatus},
    DriveCrypto, DriveError, Result,
};
use drive_crypto::{
    streaming::hash_reader, ContentHash, CryptoError, DetachedCheck, KeyPack, SessionKey,
};
use std::io::Write;
use std::slice;
use tracing::instrument;

/// An encrypted block ready for upload
#[derive(Clone, Debug)]
pub struct EncryptedBlock {
    pub index: u32,
    pub ciphertext: Vec<u8>,
    /// Base64 SHA-256 of `ciphertext`
    pub sha256: String,
    /// Detached signature of the cleartext, encrypted to the node key
    pub enc_signature: String,
    pub signature_email: String,
}

impl EncryptedBlock {
    /// Block metadata as stored on a revision
    pub fn to_block(&self) -> Block {
        Block {
            index: self.index,
            sha256: self.sha256.clone(),
            enc_signature: Some(self.enc_signature.clone()),
            signature_email: Some(self.signature_email.clone()),
        }
    }
}

impl DriveCrypto {
    /// Encrypt one block under the content session key
    #[instrument(skip_all, fields(index = index, len = cleartext.len()))]
    pub fn encrypt_block(
        &self,
        index: u32,
        cleartext: &[u8],
        content_key_packet: &str,
        node: &KeyPack,
        signer_email: &str,
    ) -> Result<EncryptedBlock> {
        if cleartext.len() > self.config.max_block_size {
            return Err(DriveError::BlockTooLarge {
                index,
                size: cleartext.len(),
                max: self.config.max_block_size,
            });
        }
        let session_key = self.unwrap_content_key(content_key_packet, node)?;
        let signer = self.keys.signing_key(signer_email)?;

        let ciphertext = self.engine.encrypt_data_packet(cleartext, &session_key, None)?;
        let signature = self.engine.sign_detached(cleartext, &signer)?;
        let node_key = self.engine.public_key(&node.armored_key)?;
        let enc_signature = self.engine.encrypt(signature.as_bytes(), &node_key, None)?;

        Ok(EncryptedBlock {
            index,
            sha256: ContentHash::of(&ciphertext).to_base64(),
            ciphertext,
            enc_signature,
            signature_email: signer_email.to_string(),
        })
    }

    /// Decrypt one block held in memory
    #[instrument(skip_all, fields(revision = %revision, index = block.index))]
    pub fn decrypt_block(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
        block: &Block,
        ciphertext: &[u8],
        session_key: &SessionKey,
    ) -> Result<Verified<Vec<u8>>> {
        let rev = tree.revision(revision)?;
        if ciphertext.is_empty() && rev.size == 0 {
            return Ok(Verified::verified(Vec::new()));
        }
        let context = block_context(rev, block);
        check_content_hash(&context, &block.sha256, ciphertext)?;

        let signature = self.block_signature(tree, rev, block)?;
        let decrypted = self
            .engine
            .decrypt_data_packet(ciphertext, session_key, &[])
            .map_err(|e| DriveError::decryption(context.clone(), e))?;

        let status = match signature {
            Some((signature, keys)) => self.check_detached(&decrypted.data, Some(&signature), &keys),
            None => VerificationStatus::Unverified(SignatureFailure::Missing),
        };
        let status = self.report(&context, "block", status);
        Ok(Verified::new(decrypted.data, status))
    }

    /// Decrypt one block from `source` into `output` in bounded memory.
    ///
    /// The ciphertext is read twice: once to check its hash, once to decrypt.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(revision = %revision, index = block.index))]
    pub fn decrypt_block_to(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
        block: &Block,
        source: &dyn BlockSource,
        output: &mut dyn Write,
        session_key: &SessionKey,
        cancel: &CancellationToken,
    ) -> Result<VerificationStatus> {
        let rev = tree.revision(revision)?;
        let reference = block.reference(revision);
        let context = block_context(rev, block);

        let mut reader = source.open_ciphertext(&reference)?;
        let (digest, len) = hash_reader(&mut reader, self.config.stream_chunk_size, cancel.as_flag())
            .map_err(|e| stream_error(&context, e))?;
        drop(reader);
        if len == 0 && rev.size == 0 {
            return Ok(VerificationStatus::Verified);
        }
        let actual = digest.to_base64();
        if actual != block.sha256 {
            return Err(DriveError::TamperedContent {
                context,
                expected: block.sha256.clone(),
                actual,
            });
        }

        let signature = self.block_signature(tree, rev, block)?;
        let check = signature.as_ref().map(|(signature, keys)| DetachedCheck {
            signature,
            verification_keys: keys,
        });
        let mut reader = source.open_ciphertext(&reference)?;
        let status = self
            .engine
            .decrypt_data_packet_stream(&mut reader, output, session_key, check, cancel.as_flag())
            .map_err(|e| stream_error(&context, e))?;

        let status = match signature {
            Some((_, keys)) if keys.is_empty() => {
                VerificationStatus::Unverified(SignatureFailure::NoVerificationKeys)
            }
            Some(_) => status.into(),
            None => VerificationStatus::Unverified(SignatureFailure::Missing),
        };
        Ok(self.report(&context, "block", status))
    }

    /// Decrypted detached signature of a block and the keys to check it with
    fn block_signature(
        &self,
        tree: &NodeTree,
        rev: &Revision,
        block: &Block,
    ) -> Result<Option<(String, Vec<String>)>> {
        let Some(enc_signature) = &block.enc_signature else {
            return Ok(None);
        };
        let node = self.resolve_node_key_pack(tree, &rev.file)?;
        let decrypted = self
            .engine
            .decrypt(enc_signature, slice::from_ref(&node), &[])
            .map_err(|e| DriveError::decryption(format!("signature of {}", block_context(rev, block)), e))?;
        let signature = String::from_utf8(decrypted.data)
            .map_err(|e| DriveError::decryption("block signature", CryptoError::Decryption(e.to_string())))?;

        let signer = block
            .signature_email
            .as_deref()
            .or(rev.signature_address.as_deref());
        let keys = self.verification_keys(signer)?;
        Ok(Some((signature, keys)))
    }
}

fn block_context(rev: &Revision, block: &Block) -> String {
    format!("block {} of revision {}", block.index, rev.id)
}

fn stream_error(context: &str, error: CryptoError) -> DriveError {
    match error {
        CryptoError::Io(e) => DriveError::Io(e),
        other => DriveError::decryption(context, other),
    }
}
