//! # Drive Core
//!
//! End-to-end encryption codecs for a cloud drive's node tree.
//!
//! This crate provides:
//! - **Key resolution**: walking a node's ancestry down from its share to
//!   unlock its key, with a side-cache of decrypted passphrases
//! - **Passphrases and names**: wrapping, signing and moving node secrets
//! - **Content**: per-revision session keys, blocks, thumbnails, manifests
//!   and extended attributes
//! - **Download**: whole-revision decryption to a file, in memory, streamed
//!   or in parallel
//!
//! Signature problems never fail a decryption. They come back as
//! [`VerificationStatus::Unverified`] inside a [`Verified`] value and are
//! logged. Tampered ciphertext, undecryptable data and a missing manifest
//! signature are errors.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   DriveCrypto (codecs, one per module)  │
//! ├──────────────────┬──────────────────────┤
//! │ NodeTree arena   │  DecryptedCache      │
//! ├──────────────────┴──────────────────────┤
//! │ KeyMaterialProvider  │  BlockSource     │
//! ├─────────────────────────────────────────┤
//! │       drive-crypto CryptoEngine         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use drive_core::{CancellationToken, DriveCrypto, InMemoryKeyMaterial};
//! use drive_crypto::NativeEngine;
//! use std::sync::Arc;
//!
//! let drive = DriveCrypto::new(Arc::new(NativeEngine::new()), Arc::new(keys));
//! let name = drive.decrypt_name(&tree, &node)?;
//! if !name.is_verified() {
//!     eprintln!("name of {node} is not verified: {:?}", name.status);
//! }
//! drive.decrypt_revision(&tree, &revision, &source, path, &CancellationToken::new())?;
//! ```

pub mod block;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod content_key;
pub mod download;
pub mod drive;
pub mod error;
pub mod manifest;
pub mod model;
pub mod name;
pub mod passphrase;
pub mod provider;
pub mod reencrypt;
pub mod resolver;
pub mod thumbnail;
pub mod verification;
pub mod xattr;

#[cfg(test)]
pub(crate) mod testing;

pub use block::EncryptedBlock;
pub use cache::{CachePersistence, CacheSlot, DecryptedCache};
pub use cancel::CancellationToken;
pub use config::{CodecConfig, DecryptMode};
pub use content_key::ContentKeys;
pub use download::{BlockOutcome, DecryptedRevision};
pub use drive::DriveCrypto;
pub use error::{DriveError, Result};
pub use manifest::{manifest_bytes, manifest_payload};
pub use model::{
    Block, BlockRef, Node, NodeId, NodeKind, NodeTree, Revision, RevisionId, Share, ShareId,
    ShareKind, Thumbnail, ThumbnailKind,
};
pub use name::{placeholder_name, MovedNode, RenamedNode};
pub use passphrase::NodeKeys;
pub use provider::{
    BlockSource, DirectoryBlockSource, InMemoryBlockSource, InMemoryKeyMaterial,
    KeyMaterialProvider,
};
pub use thumbnail::EncryptedThumbnail;
pub use verification::{SignatureFailure, Verified, VerificationStatus};
pub use xattr::ExtendedAttributes;
