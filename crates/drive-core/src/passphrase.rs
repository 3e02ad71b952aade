//! Node and share passphrases

use crate::{
    cache::CacheSlot,
    model::{Node, NodeId, NodeTree, Share, ShareId},
    verification::Verified,
    DriveCrypto, DriveError, Result,
};
use drive_crypto::{hashing::random_token, CryptoError, KeyPack};
use std::slice;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Random bytes in a generated passphrase, before base64
const PASSPHRASE_BYTES: usize = 32;

/// Freshly generated node or share key material
pub struct NodeKeys {
    /// Armored key locked under `passphrase`
    pub node_key: String,
    /// `passphrase` encrypted to the parent key
    pub node_passphrase: String,
    /// Detached signature over `passphrase` by the signer's address key
    pub node_passphrase_signature: String,
    /// Cleartext passphrase
    pub passphrase: Zeroizing<String>,
    /// Address that signed the passphrase
    pub signature_email: String,
}

impl NodeKeys {
    /// The new key together with its passphrase
    pub fn key_pack(&self) -> KeyPack {
        KeyPack::new(self.node_key.clone(), self.passphrase.as_str())
    }
}

impl std::fmt::Debug for NodeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeys")
            .field("signature_email", &self.signature_email)
            .field("passphrase", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl DriveCrypto {
    /// Decrypt a node's passphrase with its parent key pack
    #[instrument(skip_all, fields(node = %node))]
    pub fn decrypt_node_passphrase(&self, tree: &NodeTree, node: &NodeId) -> Result<Verified<String>> {
        let current = tree.node(node)?;
        if let Some(hit) =
            self.cached_string(current.id.as_str(), CacheSlot::Passphrase, &current.node_passphrase)
        {
            return Ok(hit);
        }
        let parent = self.resolve_parent_key_pack(tree, node)?;
        self.unwrap_node_passphrase(tree, current, &parent)
    }

    /// Decrypt and verify `node`'s passphrase with an already resolved parent pack
    pub(crate) fn unwrap_node_passphrase(
        &self,
        tree: &NodeTree,
        node: &Node,
        parent: &KeyPack,
    ) -> Result<Verified<String>> {
        let context = || format!("passphrase of node {}", node.id);
        let decrypted = self
            .engine
            .decrypt(&node.node_passphrase, slice::from_ref(parent), &[])
            .map_err(|e| DriveError::decryption(context(), e))?;
        let passphrase = utf8(decrypted.data).map_err(|e| DriveError::decryption(context(), e))?;

        let signer = match node.signature_email.as_deref() {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => tree.owning_share(node)?.creator.clone(),
        };
        let keys = self.verification_keys(Some(&signer))?;
        let status = self.check_detached(
            passphrase.as_bytes(),
            node.node_passphrase_signature.as_deref(),
            &keys,
        );
        let status = self.report(node.id.as_str(), "node passphrase", status);

        self.remember(
            node.id.as_str(),
            CacheSlot::Passphrase,
            &node.node_passphrase,
            passphrase.as_bytes(),
            &status,
        );
        Ok(Verified::new(passphrase, status))
    }

    /// Decrypt a share's passphrase.
    ///
    /// A collaborative share whose passphrase carries exactly two key packets
    /// is tried with the root node key first; any failure there falls back to
    /// the creator's address keys.
    #[instrument(skip_all, fields(share = %share))]
    pub fn decrypt_share_passphrase(&self, tree: &NodeTree, share: &ShareId) -> Result<Verified<String>> {
        self.share_passphrase_within(tree, tree.share(share)?, &[])
    }

    /// Share passphrase while the shares in `resolving` are already being
    /// unlocked further up the stack
    pub(crate) fn share_passphrase_within(
        &self,
        tree: &NodeTree,
        share: &Share,
        resolving: &[ShareId],
    ) -> Result<Verified<String>> {
        if let Some(hit) =
            self.cached_string(share.id.as_str(), CacheSlot::SharePassphrase, &share.passphrase)
        {
            return Ok(hit);
        }

        let context = || format!("passphrase of share {}", share.id);
        let key_packets = self
            .engine
            .key_packet_count(&share.passphrase)
            .map_err(|e| DriveError::decryption(context(), e))?;

        let data = if key_packets == 2 && share.is_collaborative {
            match self.share_passphrase_with_node_key(tree, share, resolving) {
                Ok(data) => data,
                Err(e) => {
                    debug!(share = %share.id, error = %e, "node key path failed, using address keys");
                    self.share_passphrase_with_address_keys(share)?
                }
            }
        } else {
            self.share_passphrase_with_address_keys(share)?
        };
        let passphrase = utf8(data).map_err(|e| DriveError::decryption(context(), e))?;

        let keys = self.verification_keys(Some(&share.creator))?;
        let status = self.check_detached(
            passphrase.as_bytes(),
            share.passphrase_signature.as_deref(),
            &keys,
        );
        let status = self.report(share.id.as_str(), "share passphrase", status);

        self.remember(
            share.id.as_str(),
            CacheSlot::SharePassphrase,
            &share.passphrase,
            passphrase.as_bytes(),
            &status,
        );
        Ok(Verified::new(passphrase, status))
    }

    fn share_passphrase_with_node_key(
        &self,
        tree: &NodeTree,
        share: &Share,
        resolving: &[ShareId],
    ) -> Result<Vec<u8>> {
        let root = share
            .root_node
            .as_ref()
            .ok_or_else(|| DriveError::NoParentKeyMaterial(share.id.to_string()))?;
        // The root key must not depend on this share, directly or through
        // another share that is itself being unlocked
        if resolving.contains(&share.id) {
            return Err(DriveError::NoParentKeyMaterial(root.to_string()));
        }
        let ancestry = tree.ancestry(root, self.config.max_tree_depth)?;
        if ancestry.last().map(|top| &top.share_id) == Some(&share.id) {
            return Err(DriveError::NoParentKeyMaterial(root.to_string()));
        }
        let mut resolving = resolving.to_vec();
        resolving.push(share.id.clone());
        let pack = self.node_key_pack_within(tree, root, &resolving)?;
        self.engine
            .decrypt(&share.passphrase, slice::from_ref(&pack), &[])
            .map(|d| d.data)
            .map_err(|e| DriveError::decryption(format!("passphrase of share {}", share.id), e))
    }

    fn share_passphrase_with_address_keys(&self, share: &Share) -> Result<Vec<u8>> {
        let keys = self.keys.address_keys(&share.creator)?;
        self.engine
            .decrypt(&share.passphrase, &keys, &[])
            .map(|d| d.data)
            .map_err(|e| DriveError::decryption(format!("passphrase of share {}", share.id), e))
    }

    /// Generate a key pair whose passphrase is encrypted to `parent_key` and
    /// signed by `signer_email`'s address key
    #[instrument(skip_all, fields(signer = signer_email))]
    pub fn generate_node_keys(&self, parent_key: &str, signer_email: &str) -> Result<NodeKeys> {
        let passphrase = Zeroizing::new(random_token(PASSPHRASE_BYTES));
        let node_key = self.engine.generate_key(&passphrase)?;
        let node_passphrase = self.engine.encrypt(passphrase.as_bytes(), parent_key, None)?;
        let signer = self.keys.signing_key(signer_email)?;
        let node_passphrase_signature = self.engine.sign_detached(passphrase.as_bytes(), &signer)?;
        Ok(NodeKeys {
            node_key,
            node_passphrase,
            node_passphrase_signature,
            passphrase,
            signature_email: signer_email.to_string(),
        })
    }

    /// Generate share keys; the passphrase is encrypted to the signer's own
    /// address key
    pub fn generate_share_keys(&self, signer_email: &str) -> Result<NodeKeys> {
        let signer = self.keys.signing_key(signer_email)?;
        let address_key = self.engine.public_key(&signer.armored_key)?;
        self.generate_node_keys(&address_key, signer_email)
    }

    /// Re-wrap a node's passphrase for `new_parent`; data packet and
    /// signature are unchanged
    #[instrument(skip_all, fields(node = %node, new_parent = %new_parent))]
    pub fn reencrypt_node_passphrase(
        &self,
        tree: &NodeTree,
        node: &NodeId,
        new_parent: &NodeId,
    ) -> Result<String> {
        let current = tree.node(node)?;
        let old_parent = self.resolve_parent_key_pack(tree, node)?;
        let target = tree.node(new_parent)?;
        self.reencrypt_key_packet(&current.node_passphrase, &old_parent, &target.node_key)
    }
}

fn utf8(data: Vec<u8>) -> std::result::Result<String, CryptoError> {
    String::from_utf8(data).map_err(|e| CryptoError::Decryption(format!("cleartext is not UTF-8: {}", e)))
}
