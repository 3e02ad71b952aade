//! Extended attributes of a revision
//!
//! A JSON document with PascalCase keys, encrypted to the file node key and
//! signed by the uploader's address key. Every section is optional and
//! unknown keys are ignored.

use crate::{
    model::{NodeTree, RevisionId},
    verification::Verified,
    DriveCrypto, DriveError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::slice;
use tracing::instrument;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<CommonAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<Camera>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(rename = "iOS.photos", default, skip_serializing_if = "Option::is_none")]
    pub ios_photos: Option<IosPhotos>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Cleartext size of each block, in index order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_sizes: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digests: Option<Digests>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    /// Hex SHA-1 of the cleartext
    #[serde(rename = "SHA1", default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Camera {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_coordinates: Option<SubjectCoordinates>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectCoordinates {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Media {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IosPhotos {
    #[serde(rename = "ICloudID", default, skip_serializing_if = "Option::is_none")]
    pub icloud_id: Option<String>,
    #[serde(rename = "ModificationTime", default, skip_serializing_if = "Option::is_none")]
    pub modification_time: Option<DateTime<Utc>>,
}

impl ExtendedAttributes {
    /// Common attributes for a file of `size` bytes split into `block_size` blocks
    pub fn for_upload(modification_time: DateTime<Utc>, size: u64, block_size: u64) -> Self {
        let block_sizes = if block_size == 0 || size == 0 {
            Vec::new()
        } else {
            let full = size / block_size;
            let mut sizes = vec![block_size; full as usize];
            if size % block_size != 0 {
                sizes.push(size % block_size);
            }
            sizes
        };
        Self {
            common: Some(CommonAttributes {
                modification_time: Some(modification_time),
                size: Some(size),
                block_sizes: Some(block_sizes),
                digests: None,
            }),
            ..Self::default()
        }
    }

    /// [`for_upload`](Self::for_upload) for in-memory content, with its SHA-1 digest
    pub fn for_content(modification_time: DateTime<Utc>, content: &[u8], block_size: u64) -> Self {
        let mut attrs = Self::for_upload(modification_time, content.len() as u64, block_size);
        if let Some(common) = attrs.common.as_mut() {
            common.digests = Some(Digests::of(content));
        }
        attrs
    }
}

impl Digests {
    /// Digests of the whole cleartext
    pub fn of(content: &[u8]) -> Self {
        Self {
            sha1: Some(hex::encode(Sha1::digest(content))),
        }
    }
}

impl DriveCrypto {
    /// Serialize, encrypt to `node_key` and sign with the signer's address key
    pub fn encrypt_extended_attributes(
        &self,
        attrs: &ExtendedAttributes,
        node_key: &str,
        signer_email: &str,
    ) -> Result<String> {
        let json = serde_json::to_vec(attrs)?;
        let signer = self.keys.signing_key(signer_email)?;
        let recipient = self.engine.public_key(node_key)?;
        Ok(self.engine.encrypt(&json, &recipient, Some(&signer))?)
    }

    /// Decrypt the extended attributes of a revision, if it has any
    #[instrument(skip_all, fields(revision = %revision))]
    pub fn decrypt_extended_attributes(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
    ) -> Result<Option<Verified<ExtendedAttributes>>> {
        let rev = tree.revision(revision)?;
        let Some(armored) = rev.extended_attributes.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(None);
        };

        let node = self.resolve_node_key_pack(tree, &rev.file)?;
        let keys = self.revision_signer_keys(tree, rev)?;
        let decrypted = self
            .engine
            .decrypt(armored, slice::from_ref(&node), &keys)
            .map_err(|e| DriveError::decryption(format!("extended attributes of revision {}", revision), e))?;
        let status = self.report(revision.as_str(), "extended attributes", decrypted.signature.into());
        let attrs: ExtendedAttributes = serde_json::from_slice(&decrypted.data)?;
        Ok(Some(Verified::new(attrs, status)))
    }
}
