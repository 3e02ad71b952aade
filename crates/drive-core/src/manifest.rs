//! Revision manifest signatures
//!
//! The manifest is the concatenation of the raw SHA-256 digests of every
//! thumbnail ciphertext followed by every block ciphertext, blocks in
//! ascending index order. Reordering, swapping or dropping a block changes
//! the manifest and breaks its signature.

use crate::{
    model::{NodeTree, Revision, RevisionId},
    DriveCrypto, DriveError, Result,
};
use drive_crypto::ContentHash;
use tracing::instrument;

/// Manifest bytes of a stored revision
pub fn manifest_bytes(revision: &Revision) -> Result<Vec<u8>> {
    let thumbnails: Vec<&str> = revision.thumbnails.iter().map(|t| t.sha256.as_str()).collect();
    let blocks: Vec<&str> = revision
        .sorted_blocks()
        .into_iter()
        .map(|b| b.sha256.as_str())
        .collect();
    manifest_payload(&thumbnails, &blocks)
}

/// Manifest bytes from base64 hashes, blocks already in index order
pub fn manifest_payload<T, B>(thumbnail_hashes: &[T], block_hashes: &[B]) -> Result<Vec<u8>>
where
    T: AsRef<str>,
    B: AsRef<str>,
{
    let mut payload = Vec::with_capacity((thumbnail_hashes.len() + block_hashes.len()) * 32);
    for hash in thumbnail_hashes
        .iter()
        .map(AsRef::as_ref)
        .chain(block_hashes.iter().map(AsRef::as_ref))
    {
        payload.extend_from_slice(ContentHash::from_base64(hash)?.as_ref());
    }
    Ok(payload)
}

impl DriveCrypto {
    /// Sign a manifest with the address key of `signer_email`
    pub fn sign_manifest<B, T>(
        &self,
        block_hashes: &[B],
        thumbnail_hashes: &[T],
        signer_email: &str,
    ) -> Result<String>
    where
        B: AsRef<str>,
        T: AsRef<str>,
    {
        let payload = manifest_payload(thumbnail_hashes, block_hashes)?;
        let signer = self.keys.signing_key(signer_email)?;
        Ok(self.engine.sign_detached(&payload, &signer)?)
    }

    /// Check the manifest signature of a revision.
    ///
    /// A revision without one is rejected outright; a signature that does
    /// not verify is logged and reported as unverified.
    #[instrument(skip_all, fields(revision = %revision))]
    pub fn verify_manifest(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
    ) -> Result<crate::VerificationStatus> {
        let rev = tree.revision(revision)?;
        let signature = rev
            .manifest_signature
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DriveError::NoManifestSignature(revision.to_string()))?;

        let payload = manifest_bytes(rev)?;
        let keys = self.revision_signer_keys(tree, rev)?;
        let status = self.check_detached(&payload, Some(signature), &keys);
        Ok(self.report(revision.as_str(), "manifest", status))
    }

    /// Keys of the revision signer, else the file node's own public key
    pub(crate) fn revision_signer_keys(&self, tree: &NodeTree, rev: &Revision) -> Result<Vec<String>> {
        match rev.signature_address.as_deref() {
            Some(email) if !email.is_empty() => self.keys.public_keys(email),
            _ => {
                let node = tree.node(&rev.file)?;
                Ok(vec![self.engine.public_key(&node.node_key)?])
            }
        }
    }
}
