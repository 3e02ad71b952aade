//! Shared fixture for the scenario tests, built on the public API only

#![allow(dead_code)]

use chrono::Utc;
use drive_core::{
    CodecConfig, DriveCrypto, ExtendedAttributes, InMemoryBlockSource, InMemoryKeyMaterial,
    KeyMaterialProvider, Node, NodeId, NodeKind, NodeTree, Revision, RevisionId, Share, ShareId, ShareKind,
};
use drive_crypto::{CryptoEngine, KeyPack, NativeEngine};
use std::sync::Arc;

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";

pub struct World {
    pub drive: DriveCrypto,
    pub engine: Arc<NativeEngine>,
    pub keys: Arc<InMemoryKeyMaterial>,
    pub tree: NodeTree,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        let engine = Arc::new(NativeEngine::new());
        let keys = Arc::new(InMemoryKeyMaterial::new());
        let drive = DriveCrypto::with_config(engine.clone(), keys.clone(), config);
        let world = Self {
            drive,
            engine,
            keys,
            tree: NodeTree::new(),
        };
        world.identity(ALICE);
        world.identity(BOB);
        world
    }

    /// Register a fresh address key for `email` and return it
    pub fn identity(&self, email: &str) -> KeyPack {
        let passphrase = format!("{email}-passphrase");
        let pack = KeyPack::new(self.engine.generate_key(&passphrase).unwrap(), passphrase);
        self.keys.add_address_key(email, pack.clone()).unwrap();
        pack
    }

    /// Address key `email` signs with
    pub fn signing_key(&self, email: &str) -> KeyPack {
        self.keys.signing_key(email).unwrap()
    }

    /// Public half of an armored key
    pub fn public(&self, armored: &str) -> String {
        self.engine.public_key(armored).unwrap()
    }

    /// A share created by `creator` with a root folder
    pub fn share(&mut self, id: &str, creator: &str) -> NodeId {
        let keys = self.drive.generate_share_keys(creator).unwrap();
        let root = NodeId::new(format!("{id}-root"));
        self.tree.insert_share(Share {
            id: ShareId::new(id),
            creator: creator.into(),
            key: keys.node_key.clone(),
            passphrase: keys.node_passphrase.clone(),
            passphrase_signature: Some(keys.node_passphrase_signature.clone()),
            root_node: Some(root.clone()),
            kind: ShareKind::Main,
            is_collaborative: false,
        });
        let share_public = self.public(&keys.node_key);
        self.insert_folder(&root, id, None, &share_public, "root", creator);
        root
    }

    /// A folder under `parent`
    pub fn folder(&mut self, id: &str, parent: &NodeId, name: &str) -> NodeId {
        let node_id = NodeId::new(id);
        let share_id = self.tree.node(parent).unwrap().share_id.to_string();
        let parent_key = self.public(&self.tree.node(parent).unwrap().node_key);
        let hash = self.drive.hash_name(&self.tree, name, parent).unwrap();
        self.insert_folder(&node_id, &share_id, Some(parent.clone()), &parent_key, name, ALICE);
        self.tree.node_mut(&node_id).unwrap().node_hash = Some(hash);
        node_id
    }

    fn insert_folder(
        &mut self,
        id: &NodeId,
        share: &str,
        parent: Option<NodeId>,
        parent_key: &str,
        name: &str,
        signer: &str,
    ) {
        let keys = self.drive.generate_node_keys(parent_key, signer).unwrap();
        let hash_key = self.drive.generate_node_hash_key(&keys.key_pack()).unwrap();
        self.tree.insert_node(Node {
            id: id.clone(),
            share_id: ShareId::new(share),
            parent,
            node_key: keys.node_key.clone(),
            node_passphrase: keys.node_passphrase.clone(),
            node_passphrase_signature: Some(keys.node_passphrase_signature.clone()),
            name: self.drive.encrypt_name(name, parent_key, signer).unwrap(),
            name_signature_email: Some(signer.into()),
            signature_email: Some(signer.into()),
            node_hash: None,
            kind: NodeKind::Folder {
                node_hash_key: Some(hash_key),
            },
        });
    }

    /// A file draft under `parent`: node keys, content key and encrypted name
    pub fn file(&mut self, id: &str, parent: &NodeId, name: &str) -> NodeId {
        let node_id = NodeId::new(id);
        let parent_node = self.tree.node(parent).unwrap();
        let share_id = parent_node.share_id.clone();
        let parent_key = self.public(&parent_node.node_key);

        let keys = self.drive.generate_node_keys(&parent_key, ALICE).unwrap();
        let content = self.drive.generate_content_keys(&keys.key_pack()).unwrap();
        let node_hash = self.drive.hash_name(&self.tree, name, parent).unwrap();
        let name = self.drive.encrypt_name(name, &parent_key, ALICE).unwrap();
        self.tree.insert_node(Node {
            id: node_id.clone(),
            share_id,
            parent: Some(parent.clone()),
            node_key: keys.node_key.clone(),
            node_passphrase: keys.node_passphrase.clone(),
            node_passphrase_signature: Some(keys.node_passphrase_signature.clone()),
            name,
            name_signature_email: Some(ALICE.into()),
            signature_email: Some(ALICE.into()),
            node_hash: Some(node_hash),
            kind: NodeKind::File {
                content_key_packet: Some(content.key_packet_base64.clone()),
                content_key_packet_signature: Some(content.signature.clone()),
                active_revision: None,
            },
        });
        node_id
    }

    /// Encrypt `data` as a new revision of `file`
    pub fn upload(&mut self, file: &NodeId, data: &[u8], block_size: usize) -> (RevisionId, InMemoryBlockSource) {
        let node = self.tree.node(file).unwrap().clone();
        let (packet, _) = node.content_key().unwrap();
        let pack = self.drive.resolve_node_key_pack(&self.tree, file).unwrap();
        let revision = RevisionId::new(format!("{file}-rev"));

        let source = InMemoryBlockSource::new();
        let mut blocks = Vec::new();
        for (index, chunk) in data.chunks(block_size).enumerate() {
            let encrypted = self
                .drive
                .encrypt_block(index as u32, chunk, packet, &pack, ALICE)
                .unwrap();
            let block = encrypted.to_block();
            source.insert(&block.reference(&revision), encrypted.ciphertext);
            blocks.push(block);
        }
        let hashes: Vec<String> = blocks.iter().map(|b| b.sha256.clone()).collect();
        let manifest = self.drive.sign_manifest::<_, String>(&hashes, &[], ALICE).unwrap();
        let attrs = ExtendedAttributes::for_content(Utc::now(), data, block_size as u64);
        let attrs = self
            .drive
            .encrypt_extended_attributes(&attrs, &node.node_key, ALICE)
            .unwrap();

        self.tree.insert_revision(Revision {
            id: revision.clone(),
            file: file.clone(),
            size: data.len() as u64,
            blocks,
            thumbnails: Vec::new(),
            manifest_signature: Some(manifest),
            extended_attributes: Some(attrs),
            signature_address: Some(ALICE.into()),
        });
        (revision, source)
    }

    /// Forget every cached decryption
    pub fn forget(&self) {
        self.drive.cache().clear();
    }
}

pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
