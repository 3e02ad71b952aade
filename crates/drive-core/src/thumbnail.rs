//! Thumbnails, encrypted and signed under the revision's content session key

use crate::{
    drive::check_content_hash,
    model::{NodeTree, RevisionId, Thumbnail, ThumbnailKind},
    verification::Verified,
    DriveCrypto, DriveError, Result,
};
use drive_crypto::{ContentHash, KeyPack, SessionKey};
use tracing::instrument;

/// An encrypted thumbnail ready for upload
#[derive(Clone, Debug)]
pub struct EncryptedThumbnail {
    pub kind: ThumbnailKind,
    pub ciphertext: Vec<u8>,
    pub sha256: String,
}

impl EncryptedThumbnail {
    /// Thumbnail metadata as stored on a revision
    pub fn to_thumbnail(&self) -> Thumbnail {
        Thumbnail {
            kind: self.kind,
            sha256: self.sha256.clone(),
        }
    }
}

impl DriveCrypto {
    #[instrument(skip_all, fields(kind = ?kind, len = image.len()))]
    pub fn encrypt_thumbnail(
        &self,
        kind: ThumbnailKind,
        image: &[u8],
        content_key_packet: &str,
        node: &KeyPack,
        signer_email: &str,
    ) -> Result<EncryptedThumbnail> {
        let session_key = self.unwrap_content_key(content_key_packet, node)?;
        let signer = self.keys.signing_key(signer_email)?;
        let ciphertext = self
            .engine
            .encrypt_data_packet(image, &session_key, Some(&signer))?;

        let max = self.config.thumbnail_max_size;
        if ciphertext.len() > max {
            return Err(DriveError::ThumbnailTooLarge {
                size: ciphertext.len(),
                max,
            });
        }
        Ok(EncryptedThumbnail {
            kind,
            sha256: ContentHash::of(&ciphertext).to_base64(),
            ciphertext,
        })
    }

    /// Decrypt a thumbnail and check it against the revision signer
    #[instrument(skip_all, fields(revision = %revision, kind = ?thumbnail.kind))]
    pub fn decrypt_thumbnail(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
        thumbnail: &Thumbnail,
        ciphertext: &[u8],
        session_key: &SessionKey,
    ) -> Result<Verified<Vec<u8>>> {
        let rev = tree.revision(revision)?;
        let context = format!("{:?} thumbnail of revision {}", thumbnail.kind, revision);
        check_content_hash(&context, &thumbnail.sha256, ciphertext)?;

        let keys = self.revision_signer_keys(tree, rev)?;
        let decrypted = self
            .engine
            .decrypt_data_packet(ciphertext, session_key, &keys)
            .map_err(|e| DriveError::decryption(context.clone(), e))?;
        let status = self.report(&context, "thumbnail", decrypted.signature.into());
        Ok(Verified::new(decrypted.data, status))
    }
}
