//! Test fixtures: two identities, a share with a chain of folders, files and revisions

use crate::{
    model::{Node, NodeId, NodeKind, NodeTree, Revision, RevisionId, Share, ShareId, ShareKind},
    provider::{InMemoryBlockSource, InMemoryKeyMaterial, KeyMaterialProvider},
    xattr::ExtendedAttributes,
    CodecConfig, DriveCrypto,
};
use chrono::Utc;
use drive_crypto::{name_hash, CryptoEngine, KeyPack, NativeEngine, SessionKey};
use std::slice;
use std::sync::{Arc, OnceLock};

pub(crate) const USER: &str = "alice@example.com";
pub(crate) const OTHER: &str = "bob@example.com";
const SHARE: &str = "share";

pub(crate) struct Fixture {
    pub drive: DriveCrypto,
    pub keys: Arc<InMemoryKeyMaterial>,
    pub engine: Arc<NativeEngine>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        let engine = Arc::new(NativeEngine::new());
        let keys = Arc::new(InMemoryKeyMaterial::new());
        for (email, passphrase) in [(USER, "alice-pass"), (OTHER, "bob-pass")] {
            let key = engine.generate_key(passphrase).unwrap();
            keys.add_address_key(email, KeyPack::new(key, passphrase)).unwrap();
        }
        let drive = DriveCrypto::with_config(engine.clone(), keys.clone(), config);
        Self { drive, keys, engine }
    }

    /// Process-wide fixture for property tests
    pub fn shared() -> &'static Fixture {
        static SHARED: OnceLock<Fixture> = OnceLock::new();
        SHARED.get_or_init(Fixture::new)
    }

    pub fn share_id(&self) -> ShareId {
        ShareId::new(SHARE)
    }

    /// A share whose root is `folder-0`, with `depth` folders nested below each other.
    ///
    /// Returns the folder ids from the root down.
    pub fn nested_tree(&self, depth: usize) -> (NodeTree, Vec<NodeId>) {
        let mut tree = NodeTree::new();
        let share_keys = self.drive.generate_share_keys(USER).unwrap();
        let share_id = self.share_id();
        tree.insert_share(Share {
            id: share_id.clone(),
            creator: USER.into(),
            key: share_keys.node_key.clone(),
            passphrase: share_keys.node_passphrase.clone(),
            passphrase_signature: Some(share_keys.node_passphrase_signature.clone()),
            root_node: Some(NodeId::new("folder-0")),
            kind: ShareKind::Main,
            is_collaborative: false,
        });

        let mut ids = Vec::with_capacity(depth);
        let mut parent_pack = share_keys.key_pack();
        let mut parent_hash_key: Option<String> = None;
        for i in 0..depth {
            let id = NodeId::new(format!("folder-{i}"));
            let name = format!("folder-{i}");
            let parent_key = self.engine.public_key(&parent_pack.armored_key).unwrap();
            let keys = self.drive.generate_node_keys(&parent_key, USER).unwrap();
            let pack = keys.key_pack();
            let hash_key = self.drive.generate_node_hash_key(&pack).unwrap();

            tree.insert_node(Node {
                id: id.clone(),
                share_id: share_id.clone(),
                parent: ids.last().cloned(),
                node_key: keys.node_key.clone(),
                node_passphrase: keys.node_passphrase.clone(),
                node_passphrase_signature: Some(keys.node_passphrase_signature.clone()),
                name: self.drive.encrypt_name(&name, &parent_key, USER).unwrap(),
                name_signature_email: Some(USER.into()),
                signature_email: Some(USER.into()),
                node_hash: parent_hash_key
                    .as_ref()
                    .map(|key| name_hash(key.as_bytes(), &name).unwrap()),
                kind: NodeKind::Folder {
                    node_hash_key: Some(hash_key.clone()),
                },
            });

            let clear = self.engine.decrypt(&hash_key, slice::from_ref(&pack), &[]).unwrap();
            parent_hash_key = Some(String::from_utf8(clear.data).unwrap());
            parent_pack = pack;
            ids.push(id);
        }
        self.drive.cache().clear();
        (tree, ids)
    }

    /// Add a file named `name` under `parent`
    pub fn file(&self, tree: &mut NodeTree, id: &str, parent: &NodeId, name: &str) -> NodeId {
        let parent_pack = self.drive.resolve_node_key_pack(tree, parent).unwrap();
        let parent_key = self.engine.public_key(&parent_pack.armored_key).unwrap();
        let keys = self.drive.generate_node_keys(&parent_key, USER).unwrap();
        let content = self.drive.generate_content_keys(&keys.key_pack()).unwrap();
        let share_id = tree.node(parent).unwrap().share_id.clone();

        let node = Node {
            id: NodeId::new(id),
            share_id,
            parent: Some(parent.clone()),
            node_key: keys.node_key.clone(),
            node_passphrase: keys.node_passphrase.clone(),
            node_passphrase_signature: Some(keys.node_passphrase_signature.clone()),
            name: self.drive.encrypt_name(name, &parent_key, USER).unwrap(),
            name_signature_email: Some(USER.into()),
            signature_email: Some(USER.into()),
            node_hash: Some(self.drive.hash_name(tree, name, parent).unwrap()),
            kind: NodeKind::File {
                content_key_packet: Some(content.key_packet_base64.clone()),
                content_key_packet_signature: Some(content.signature.clone()),
                active_revision: None,
            },
        };
        tree.insert_node(node);
        self.drive.cache().clear();
        NodeId::new(id)
    }

    /// Upload `content` as the active revision of `file`, split into `block_size` blocks
    pub fn revision(
        &self,
        tree: &mut NodeTree,
        file: &NodeId,
        content: &[u8],
        block_size: usize,
    ) -> (RevisionId, InMemoryBlockSource) {
        let node = tree.node(file).unwrap().clone();
        let (packet, _) = node.content_key().unwrap();
        let pack = self.drive.resolve_node_key_pack(tree, file).unwrap();
        let revision = RevisionId::new(format!("{}-rev-{:08x}", file, rand::random::<u32>()));

        let source = InMemoryBlockSource::new();
        let mut blocks = Vec::new();
        for (index, chunk) in content.chunks(block_size).enumerate() {
            let encrypted = self
                .drive
                .encrypt_block(index as u32, chunk, packet, &pack, USER)
                .unwrap();
            let block = encrypted.to_block();
            source.insert(&block.reference(&revision), encrypted.ciphertext);
            blocks.push(block);
        }

        let hashes: Vec<&str> = blocks.iter().map(|b| b.sha256.as_str()).collect();
        let manifest = self.drive.sign_manifest::<_, &str>(&hashes, &[], USER).unwrap();
        let attrs = ExtendedAttributes::for_content(Utc::now(), content, block_size as u64);
        let attrs = self
            .drive
            .encrypt_extended_attributes(&attrs, &node.node_key, USER)
            .unwrap();

        tree.insert_revision(Revision {
            id: revision.clone(),
            file: file.clone(),
            size: content.len() as u64,
            blocks,
            thumbnails: Vec::new(),
            manifest_signature: Some(manifest),
            extended_attributes: Some(attrs),
            signature_address: Some(USER.into()),
        });
        if let NodeKind::File { active_revision, .. } = &mut tree.node_mut(file).unwrap().kind {
            *active_revision = Some(revision.clone());
        }
        self.drive.cache().clear();
        (revision, source)
    }

    /// Content session key of `file`, unwrapped without the content key cache
    pub fn content_keys_of(&self, tree: &NodeTree, file: &NodeId) -> SessionKey {
        let (packet, _) = tree.node(file).unwrap().content_key().unwrap();
        let pack = self.drive.resolve_node_key_pack(tree, file).unwrap();
        self.drive.unwrap_content_key(packet, &pack).unwrap()
    }

    /// Detached signature over `data` by the other identity
    pub fn other_signature(&self, data: &[u8]) -> String {
        let signer = self.keys.signing_key(OTHER).unwrap();
        self.engine.sign_detached(data, &signer).unwrap()
    }

    /// Public key nobody in the fixture holds
    pub fn stranger_public(&self) -> String {
        let key = self.engine.generate_key("stranger").unwrap();
        self.engine.public_key(&key).unwrap()
    }

    pub fn keys_for(&self, email: &str) -> Vec<KeyPack> {
        self.keys.address_keys(email).unwrap()
    }

    /// A fresh folder key pack
    pub fn folder_pack(&self) -> KeyPack {
        KeyPack::new(self.engine.generate_key("folder").unwrap(), "folder")
    }
}
