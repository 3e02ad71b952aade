//! Drive entities and the arena that holds them
//!
//! Entities are plain data owned by the caller. The codecs only read their
//! key and ciphertext fields; decrypted values never live on the entities.

use crate::{DriveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw id
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw id
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

entity_id!(
    /// Share identifier
    ShareId
);
entity_id!(
    /// Node identifier
    NodeId
);
entity_id!(
    /// Revision identifier
    RevisionId
);

/// Kind of share
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareKind {
    /// The user's main volume share
    #[default]
    Main,
    /// A share of a subtree with other users
    Standard,
    /// A device backup share
    Device,
    /// The photos share
    Photos,
}

/// A tree root wrapper granting access to a subtree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Share {
    pub id: ShareId,
    /// Email of the creator, whose address keys wrap the passphrase
    pub creator: String,
    /// Armored locked share key
    pub key: String,
    /// Armored message holding the share passphrase
    pub passphrase: String,
    /// Armored detached signature over the passphrase
    pub passphrase_signature: Option<String>,
    /// Root node of the share
    pub root_node: Option<NodeId>,
    #[serde(default)]
    pub kind: ShareKind,
    /// Migrated collaborative share whose passphrase is also wrapped to the root node key
    #[serde(default)]
    pub is_collaborative: bool,
}

/// Folder or file specific fields
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Folder {
        /// Armored message holding the folder's name-hash key, signed by the folder key
        node_hash_key: Option<String>,
    },
    File {
        /// Base64 key packet wrapping the content session key to the node key
        content_key_packet: Option<String>,
        /// Armored detached signature over the content session key
        content_key_packet_signature: Option<String>,
        active_revision: Option<RevisionId>,
    },
}

/// A file or folder
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub share_id: ShareId,
    /// Parent node; `None` for a share root
    pub parent: Option<NodeId>,
    /// Armored locked node key
    pub node_key: String,
    /// Armored message holding the node passphrase, wrapped to the parent key
    pub node_passphrase: String,
    pub node_passphrase_signature: Option<String>,
    /// Armored signed name, encrypted to the parent key
    pub name: String,
    pub name_signature_email: Option<String>,
    /// Author of the node's other metadata
    pub signature_email: Option<String>,
    /// Keyed hash of the cleartext name under the parent's hash key
    pub node_hash: Option<String>,
    pub kind: NodeKind,
}

impl Node {
    /// Whether the node has no parent link
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the node is a folder
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    /// The folder's encrypted hash key
    pub fn node_hash_key(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Folder { node_hash_key } => node_hash_key.as_deref(),
            NodeKind::File { .. } => None,
        }
    }

    /// The file's base64 content key packet and its signature
    pub fn content_key(&self) -> Option<(&str, Option<&str>)> {
        match &self.kind {
            NodeKind::File {
                content_key_packet: Some(packet),
                content_key_packet_signature,
                ..
            } => Some((packet.as_str(), content_key_packet_signature.as_deref())),
            _ => None,
        }
    }

    /// Email whose keys signed the name
    pub fn name_signer(&self) -> Option<&str> {
        self.name_signature_email
            .as_deref()
            .or(self.signature_email.as_deref())
    }
}

/// Content block of a revision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position of the block; only the ordering matters
    pub index: u32,
    /// Base64 SHA-256 of the block ciphertext
    pub sha256: String,
    /// Armored message holding the detached signature of the cleartext, encrypted to the node key
    pub enc_signature: Option<String>,
    pub signature_email: Option<String>,
}

impl Block {
    /// Reference used to fetch the ciphertext
    pub fn reference(&self, revision: &RevisionId) -> BlockRef {
        BlockRef {
            revision: revision.clone(),
            index: self.index,
            sha256: self.sha256.clone(),
        }
    }
}

/// Address of a block's ciphertext
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub revision: RevisionId,
    pub index: u32,
    pub sha256: String,
}

/// Thumbnail variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ThumbnailKind {
    /// Small preview
    Default,
    /// Larger photo preview
    Photo,
}

impl From<u8> for ThumbnailKind {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::Default,
            _ => Self::Photo,
        }
    }
}

impl From<ThumbnailKind> for u8 {
    fn from(kind: ThumbnailKind) -> Self {
        match kind {
            ThumbnailKind::Default => 1,
            ThumbnailKind::Photo => 2,
        }
    }
}

/// Thumbnail of a revision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub kind: ThumbnailKind,
    /// Base64 SHA-256 of the thumbnail ciphertext
    pub sha256: String,
}

/// Immutable version of a file's content
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub file: NodeId,
    /// Declared cleartext size
    pub size: u64,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    /// Armored detached signature over the manifest
    pub manifest_signature: Option<String>,
    /// Armored message holding the JSON extended attributes
    pub extended_attributes: Option<String>,
    /// Email of the revision's content author
    pub signature_address: Option<String>,
}

impl Revision {
    /// Blocks in ascending index order
    pub fn sorted_blocks(&self) -> Vec<&Block> {
        let mut blocks: Vec<&Block> = self.blocks.iter().collect();
        blocks.sort_by_key(|b| b.index);
        blocks
    }
}

/// Arena of shares, nodes and revisions indexed by id
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeTree {
    shares: HashMap<ShareId, Share>,
    nodes: HashMap<NodeId, Node>,
    revisions: HashMap<RevisionId, Revision>,
}

impl NodeTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a share
    pub fn insert_share(&mut self, share: Share) -> Option<Share> {
        self.shares.insert(share.id.clone(), share)
    }

    /// Insert or replace a node
    pub fn insert_node(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Insert or replace a revision
    pub fn insert_revision(&mut self, revision: Revision) -> Option<Revision> {
        self.revisions.insert(revision.id.clone(), revision)
    }

    /// Look up a share
    pub fn share(&self, id: &ShareId) -> Result<&Share> {
        self.shares
            .get(id)
            .ok_or_else(|| DriveError::ShareNotFound(id.to_string()))
    }

    /// Look up a node
    pub fn node(&self, id: &NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| DriveError::NodeNotFound(id.to_string()))
    }

    /// Mutable access to a node, for applying rename/move results
    pub fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| DriveError::NodeNotFound(id.to_string()))
    }

    /// Look up a revision
    pub fn revision(&self, id: &RevisionId) -> Result<&Revision> {
        self.revisions
            .get(id)
            .ok_or_else(|| DriveError::RevisionNotFound(id.to_string()))
    }

    /// Share owning a node
    pub fn owning_share(&self, node: &Node) -> Result<&Share> {
        self.share(&node.share_id)
    }

    /// Direct children of a node
    pub fn children<'a>(&'a self, parent: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .values()
            .filter(move |n| n.parent.as_ref() == Some(parent))
    }

    /// The node followed by its ancestors, nearest first.
    ///
    /// The last element is the topmost node reachable through parent links.
    pub fn ancestry(&self, id: &NodeId, max_depth: usize) -> Result<Vec<&Node>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.node(id)?;
        loop {
            if !seen.insert(&current.id) {
                return Err(DriveError::AncestryCycle {
                    node: id.to_string(),
                    repeated: current.id.to_string(),
                });
            }
            chain.push(current);
            let Some(parent) = &current.parent else {
                return Ok(chain);
            };
            if chain.len() > max_depth {
                return Err(DriveError::AncestryTooDeep {
                    node: id.to_string(),
                    max_depth,
                });
            }
            current = self.node(parent)?;
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
