//! Node key resolution
//!
//! A node's passphrase is wrapped to its parent's node key, a share root's to
//! the share key. Resolving a key pack walks the ancestors iteratively, starts
//! from the nearest ancestor whose passphrase is already cached (or from the
//! owning share of the topmost ancestor) and unwraps passphrases downwards.
//!
//! A share passphrase may itself be unlocked through a node key, so the walk
//! carries the shares already being resolved to keep that loop finite.

use crate::{
    cache::CacheSlot,
    model::{Node, NodeId, NodeTree, ShareId},
    DriveCrypto, DriveError, Result,
};
use drive_crypto::KeyPack;
use tracing::{debug, instrument};

impl DriveCrypto {
    /// Key pack that unwraps `node`'s own passphrase: the parent's key, or the
    /// owning share's key for a root
    #[instrument(skip_all, fields(node = %node))]
    pub fn resolve_parent_key_pack(&self, tree: &NodeTree, node: &NodeId) -> Result<KeyPack> {
        let current = tree.node(node)?;
        match &current.parent {
            Some(parent) => self.resolve_node_key_pack(tree, parent),
            None => self.share_key_pack(tree, current, &[]),
        }
    }

    /// The node's own key together with its cleartext passphrase
    #[instrument(skip_all, fields(node = %node))]
    pub fn resolve_node_key_pack(&self, tree: &NodeTree, node: &NodeId) -> Result<KeyPack> {
        self.node_key_pack_within(tree, node, &[])
    }

    /// [`resolve_node_key_pack`](Self::resolve_node_key_pack) while the shares
    /// in `resolving` are already being unlocked further up the stack
    pub(crate) fn node_key_pack_within(
        &self,
        tree: &NodeTree,
        node: &NodeId,
        resolving: &[ShareId],
    ) -> Result<KeyPack> {
        let chain = tree.ancestry(node, self.config.max_tree_depth)?;

        let mut start = chain.len();
        let mut pack = None;
        for (i, ancestor) in chain.iter().enumerate() {
            let cached = self.cached_string(
                ancestor.id.as_str(),
                CacheSlot::Passphrase,
                &ancestor.node_passphrase,
            );
            if let Some(passphrase) = cached {
                pack = Some(KeyPack::new(ancestor.node_key.clone(), passphrase.value));
                start = i;
                break;
            }
        }

        let mut pack = match pack {
            Some(pack) => pack,
            None => {
                let top = chain
                    .last()
                    .ok_or_else(|| DriveError::NoParentKeyMaterial(node.to_string()))?;
                debug!(depth = chain.len(), root = %top.id, "resolving from share key");
                self.share_key_pack(tree, top, resolving)?
            }
        };

        for ancestor in chain[..start].iter().rev() {
            let passphrase = self.unwrap_node_passphrase(tree, ancestor, &pack)?;
            pack = KeyPack::new(ancestor.node_key.clone(), passphrase.value);
        }
        Ok(pack)
    }

    /// Share key and passphrase for a root node
    pub(crate) fn share_key_pack(
        &self,
        tree: &NodeTree,
        root: &Node,
        resolving: &[ShareId],
    ) -> Result<KeyPack> {
        let share = tree
            .owning_share(root)
            .map_err(|_| DriveError::NoParentKeyMaterial(root.id.to_string()))?;
        let passphrase = self.share_passphrase_within(tree, share, resolving)?;
        Ok(KeyPack::new(share.key.clone(), passphrase.value))
    }
}
