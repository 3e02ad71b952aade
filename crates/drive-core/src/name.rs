//! Node names and name hashes

use crate::{
    cache::CacheSlot,
    model::{NodeId, NodeTree},
    verification::Verified,
    DriveCrypto, DriveError, Result,
};
use drive_crypto::{hashing::random_token, name_hash, CryptoError, KeyPack};
use rand::Rng;
use std::slice;
use tracing::instrument;

/// Random bytes in a folder hash key, before base64
const HASH_KEY_BYTES: usize = 32;

const PLACEHOLDER_GLYPH: char = '\u{2612}';

/// Result of renaming a node in place
#[derive(Clone, Debug)]
pub struct RenamedNode {
    /// New armored name, same session key as before
    pub name: String,
    /// Hash of the new name under the parent's hash key; `None` for roots
    pub node_hash: Option<String>,
    /// Hash the node carried before the rename
    pub original_hash: Option<String>,
    pub name_signature_email: String,
}

/// Result of moving a node under a new parent
#[derive(Clone, Debug)]
pub struct MovedNode {
    pub new_parent: NodeId,
    /// Passphrase re-wrapped to the new parent key
    pub node_passphrase: String,
    /// Unchanged passphrase signature
    pub node_passphrase_signature: Option<String>,
    /// Name encrypted to the new parent key and signed again
    pub name: String,
    pub node_hash: String,
    pub original_hash: Option<String>,
    pub name_signature_email: String,
}

/// Stand-in for a name that cannot be decrypted: 8 to 15 ballot-box glyphs
/// with random interior spaces.
///
/// Substituting it is up to the caller; the codecs always surface the error.
pub fn placeholder_name() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(8..=15);
    (0..len)
        .map(|i| {
            if i > 0 && i + 1 < len && rng.gen_bool(0.2) {
                ' '
            } else {
                PLACEHOLDER_GLYPH
            }
        })
        .collect()
}

impl DriveCrypto {
    /// Encrypt a name to `parent_key`, signed by `signer_email`'s address key
    pub fn encrypt_name(&self, name: &str, parent_key: &str, signer_email: &str) -> Result<String> {
        let signer = self.keys.signing_key(signer_email)?;
        Ok(self.engine.encrypt(name.as_bytes(), parent_key, Some(&signer))?)
    }

    /// Decrypt a node's name and verify it against its signer
    #[instrument(skip_all, fields(node = %node))]
    pub fn decrypt_name(&self, tree: &NodeTree, node: &NodeId) -> Result<Verified<String>> {
        let current = tree.node(node)?;
        if let Some(hit) = self.cached_string(current.id.as_str(), CacheSlot::Name, &current.name) {
            return Ok(hit);
        }

        let parent = self.resolve_parent_key_pack(tree, node)?;
        let signer = match current.name_signer() {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => tree.owning_share(current)?.creator.clone(),
        };
        let keys = self.verification_keys(Some(&signer))?;

        let context = || format!("name of node {}", current.id);
        let decrypted = self
            .engine
            .decrypt(&current.name, slice::from_ref(&parent), &keys)
            .map_err(|e| DriveError::decryption(context(), e))?;
        let name = String::from_utf8(decrypted.data).map_err(|e| {
            DriveError::decryption(context(), CryptoError::Decryption(e.to_string()))
        })?;
        let status = self.report(current.id.as_str(), "name", decrypted.signature.into());

        self.remember(current.id.as_str(), CacheSlot::Name, &current.name, name.as_bytes(), &status);
        Ok(Verified::new(name, status))
    }

    /// Keyed hash of `name` under `parent_folder`'s hash key, lowercase hex
    #[instrument(skip_all, fields(folder = %parent_folder))]
    pub fn hash_name(&self, tree: &NodeTree, name: &str, parent_folder: &NodeId) -> Result<String> {
        let hash_key = self.decrypt_node_hash_key(tree, parent_folder)?;
        Ok(name_hash(hash_key.value.as_bytes(), name)?)
    }

    /// Random hash key for a new folder, encrypted to and signed by the folder key
    pub fn generate_node_hash_key(&self, folder: &KeyPack) -> Result<String> {
        let hash_key = zeroize::Zeroizing::new(random_token(HASH_KEY_BYTES));
        let folder_key = self.engine.public_key(&folder.armored_key)?;
        Ok(self
            .engine
            .encrypt(hash_key.as_bytes(), &folder_key, Some(folder))?)
    }

    /// Decrypt a folder's hash key; verified against the folder key and the
    /// folder signer's address keys
    #[instrument(skip_all, fields(folder = %folder))]
    pub fn decrypt_node_hash_key(&self, tree: &NodeTree, folder: &NodeId) -> Result<Verified<String>> {
        let node = tree.node(folder)?;
        let armored = node.node_hash_key().ok_or_else(|| DriveError::InvalidNode {
            id: folder.to_string(),
            reason: "no node hash key".into(),
        })?;
        if let Some(hit) = self.cached_string(node.id.as_str(), CacheSlot::HashKey, armored) {
            return Ok(hit);
        }

        let pack = self.resolve_node_key_pack(tree, folder)?;
        let mut keys = vec![self.engine.public_key(&node.node_key)?];
        keys.extend(self.verification_keys(node.signature_email.as_deref())?);

        let context = || format!("hash key of folder {}", node.id);
        let decrypted = self
            .engine
            .decrypt(armored, slice::from_ref(&pack), &keys)
            .map_err(|e| DriveError::decryption(context(), e))?;
        let hash_key = String::from_utf8(decrypted.data).map_err(|e| {
            DriveError::decryption(context(), CryptoError::Decryption(e.to_string()))
        })?;
        let status = self.report(node.id.as_str(), "node hash key", decrypted.signature.into());

        self.remember(node.id.as_str(), CacheSlot::HashKey, armored, hash_key.as_bytes(), &status);
        Ok(Verified::new(hash_key, status))
    }

    /// Encrypt `new_name` to `new_parent_key` reusing the session key of
    /// `old_name`
    pub fn rename_with_session_key(
        &self,
        old_name: &str,
        old_parent: &KeyPack,
        new_name: &str,
        new_parent_key: &str,
        signer_email: &str,
    ) -> Result<String> {
        let split = self
            .engine
            .split_message(old_name)
            .map_err(|e| DriveError::decryption("name", e))?;
        let session_key = self
            .engine
            .decrypt_session_key(&split.key_packets, slice::from_ref(old_parent))
            .map_err(|e| DriveError::decryption("name", e))?;
        let signer = self.keys.signing_key(signer_email)?;
        Ok(self.engine.encrypt_with_session_key(
            new_name.as_bytes(),
            &session_key,
            new_parent_key,
            Some(&signer),
        )?)
    }

    /// Re-wrap a name's key packet to `new_parent_key`; text and signature untouched
    pub fn reencrypt_name_key_packet(
        &self,
        old_name: &str,
        old_parent: &KeyPack,
        new_parent_key: &str,
    ) -> Result<String> {
        self.reencrypt_key_packet(old_name, old_parent, new_parent_key)
    }

    /// Rename a node under its current parent
    #[instrument(skip_all, fields(node = %node))]
    pub fn rename_node(
        &self,
        tree: &NodeTree,
        node: &NodeId,
        new_name: &str,
        signer_email: &str,
    ) -> Result<RenamedNode> {
        let current = tree.node(node)?;
        let parent = self.resolve_parent_key_pack(tree, node)?;
        let name = self.rename_with_session_key(
            &current.name,
            &parent,
            new_name,
            &parent.armored_key,
            signer_email,
        )?;
        let node_hash = match &current.parent {
            Some(parent) => Some(self.hash_name(tree, new_name, parent)?),
            None => None,
        };
        Ok(RenamedNode {
            name,
            node_hash,
            original_hash: current.node_hash.clone(),
            name_signature_email: signer_email.to_string(),
        })
    }

    /// Move a node under `new_parent`, keeping its name
    #[instrument(skip_all, fields(node = %node, new_parent = %new_parent))]
    pub fn move_node(
        &self,
        tree: &NodeTree,
        node: &NodeId,
        new_parent: &NodeId,
        signer_email: &str,
    ) -> Result<MovedNode> {
        let current = tree.node(node)?;
        let target = tree.node(new_parent)?;
        if !target.is_folder() {
            return Err(DriveError::InvalidNode {
                id: new_parent.to_string(),
                reason: "move target is not a folder".into(),
            });
        }
        let target_ancestry = tree.ancestry(new_parent, self.config.max_tree_depth)?;
        if target_ancestry.iter().any(|n| &n.id == node) {
            return Err(DriveError::InvalidNode {
                id: node.to_string(),
                reason: "cannot move a node into its own subtree".into(),
            });
        }

        let old_parent = self.resolve_parent_key_pack(tree, node)?;
        let name = self.decrypt_name(tree, node)?;
        let node_passphrase =
            self.reencrypt_key_packet(&current.node_passphrase, &old_parent, &target.node_key)?;
        let encrypted_name = self.rename_with_session_key(
            &current.name,
            &old_parent,
            &name.value,
            &target.node_key,
            signer_email,
        )?;
        let node_hash = self.hash_name(tree, &name.value, new_parent)?;

        Ok(MovedNode {
            new_parent: new_parent.clone(),
            node_passphrase,
            node_passphrase_signature: current.node_passphrase_signature.clone(),
            name: encrypted_name,
            node_hash,
            original_hash: current.node_hash.clone(),
            name_signature_email: signer_email.to_string(),
        })
    }
}
