//! Basic usage example for the drive codecs
//!
//! This example demonstrates:
//! - Creating a share with a root folder
//! - Adding a file and uploading an encrypted revision
//! - Reading names back and checking their signatures
//! - Downloading the revision to disk
//!
//! Run with: cargo run --example basic_usage

use drive_core::{
    CancellationToken, DriveCrypto, InMemoryBlockSource, InMemoryKeyMaterial, Node, NodeId,
    NodeKind, NodeTree, Revision, RevisionId, Share, ShareId, ShareKind,
};
use drive_crypto::{CryptoEngine, KeyPack, NativeEngine};
use std::sync::Arc;

const USER: &str = "alice@example.com";
const BLOCK_SIZE: usize = 4 * 1024 * 1024;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Drive E2E - Basic Usage Example\n");

    let engine = Arc::new(NativeEngine::new());
    let keys = Arc::new(InMemoryKeyMaterial::new());
    let address = KeyPack::new(engine.generate_key("correct horse")?, "correct horse");
    keys.add_address_key(USER, address)?;
    let drive = DriveCrypto::new(engine.clone(), keys);

    // ==================== Share and root folder ====================

    println!("Creating share 'main'...");
    let mut tree = NodeTree::new();
    let share_keys = drive.generate_share_keys(USER)?;
    let share_public = engine.public_key(&share_keys.node_key)?;
    let root_keys = drive.generate_node_keys(&share_public, USER)?;
    let root = NodeId::new("root");
    tree.insert_share(Share {
        id: ShareId::new("main"),
        creator: USER.into(),
        key: share_keys.node_key.clone(),
        passphrase: share_keys.node_passphrase.clone(),
        passphrase_signature: Some(share_keys.node_passphrase_signature.clone()),
        root_node: Some(root.clone()),
        kind: ShareKind::Main,
        is_collaborative: false,
    });
    tree.insert_node(Node {
        id: root.clone(),
        share_id: ShareId::new("main"),
        parent: None,
        node_key: root_keys.node_key.clone(),
        node_passphrase: root_keys.node_passphrase.clone(),
        node_passphrase_signature: Some(root_keys.node_passphrase_signature.clone()),
        name: drive.encrypt_name("My files", &share_public, USER)?,
        name_signature_email: Some(USER.into()),
        signature_email: Some(USER.into()),
        node_hash: None,
        kind: NodeKind::Folder {
            node_hash_key: Some(drive.generate_node_hash_key(&root_keys.key_pack())?),
        },
    });

    // ==================== File draft ====================

    println!("Adding 'hello.txt'...");
    let root_public = engine.public_key(&root_keys.node_key)?;
    let file_keys = drive.generate_node_keys(&root_public, USER)?;
    let content = drive.generate_content_keys(&file_keys.key_pack())?;
    let file = NodeId::new("hello");
    tree.insert_node(Node {
        id: file.clone(),
        share_id: ShareId::new("main"),
        parent: Some(root.clone()),
        node_key: file_keys.node_key.clone(),
        node_passphrase: file_keys.node_passphrase.clone(),
        node_passphrase_signature: Some(file_keys.node_passphrase_signature.clone()),
        name: drive.encrypt_name("hello.txt", &root_public, USER)?,
        name_signature_email: Some(USER.into()),
        signature_email: Some(USER.into()),
        node_hash: Some(drive.hash_name(&tree, "hello.txt", &root)?),
        kind: NodeKind::File {
            content_key_packet: Some(content.key_packet_base64.clone()),
            content_key_packet_signature: Some(content.signature.clone()),
            active_revision: None,
        },
    });

    // ==================== Upload ====================

    let data = b"Hello, encrypted world!".repeat(1000);
    let revision = RevisionId::new("hello-rev-1");
    let source = InMemoryBlockSource::new();
    let mut blocks = Vec::new();
    for (index, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
        let encrypted = drive.encrypt_block(
            index as u32,
            chunk,
            &content.key_packet_base64,
            &file_keys.key_pack(),
            USER,
        )?;
        let block = encrypted.to_block();
        source.insert(&block.reference(&revision), encrypted.ciphertext);
        blocks.push(block);
    }
    let hashes: Vec<&str> = blocks.iter().map(|b| b.sha256.as_str()).collect();
    let manifest = drive.sign_manifest::<_, &str>(&hashes, &[], USER)?;
    tree.insert_revision(Revision {
        id: revision.clone(),
        file: file.clone(),
        size: data.len() as u64,
        blocks,
        thumbnails: Vec::new(),
        manifest_signature: Some(manifest),
        extended_attributes: None,
        signature_address: Some(USER.into()),
    });
    println!("   uploaded {} bytes", data.len());

    // ==================== Read back ====================

    for node in [&root, &file] {
        let name = drive.decrypt_name(&tree, node)?;
        println!("   {} -> {:?} (verified: {})", node, name.value, name.is_verified());
    }

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("hello.txt");
    let result = drive.decrypt_revision(&tree, &revision, &source, &dest, &CancellationToken::new())?;
    println!(
        "\nDownloaded {} bytes to {} (verified: {})",
        result.size,
        result.path.display(),
        result.is_verified()
    );
    assert_eq!(std::fs::read(&dest)?, data);

    Ok(())
}
