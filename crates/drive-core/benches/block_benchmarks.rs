//! Benchmarks for block encryption and revision decryption

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use drive_core::{
    CancellationToken, CodecConfig, DecryptMode, DriveCrypto, InMemoryBlockSource,
    InMemoryKeyMaterial, Node, NodeId, NodeKind, NodeTree, Revision, RevisionId, Share, ShareId,
    ShareKind,
};
use drive_crypto::{CryptoEngine, KeyPack, NativeEngine};
use std::sync::Arc;

const USER: &str = "bench@example.com";

struct Setup {
    drive: DriveCrypto,
    tree: NodeTree,
    file: NodeId,
    pack: KeyPack,
    packet: String,
}

fn build(config: CodecConfig) -> Setup {
    let engine = Arc::new(NativeEngine::new());
    let keys = Arc::new(InMemoryKeyMaterial::new());
    let address = engine.generate_key("bench").unwrap();
    keys.add_address_key(USER, KeyPack::new(address, "bench")).unwrap();
    let drive = DriveCrypto::with_config(engine.clone(), keys, config);

    let share_keys = drive.generate_share_keys(USER).unwrap();
    let share_public = engine.public_key(&share_keys.node_key).unwrap();
    let node_keys = drive.generate_node_keys(&share_public, USER).unwrap();
    let pack = node_keys.key_pack();
    let content = drive.generate_content_keys(&pack).unwrap();

    let mut tree = NodeTree::new();
    let file = NodeId::new("file");
    tree.insert_share(Share {
        id: ShareId::new("share"),
        creator: USER.into(),
        key: share_keys.node_key.clone(),
        passphrase: share_keys.node_passphrase.clone(),
        passphrase_signature: Some(share_keys.node_passphrase_signature.clone()),
        root_node: Some(file.clone()),
        kind: ShareKind::Main,
        is_collaborative: false,
    });
    tree.insert_node(Node {
        id: file.clone(),
        share_id: ShareId::new("share"),
        parent: None,
        node_key: node_keys.node_key.clone(),
        node_passphrase: node_keys.node_passphrase.clone(),
        node_passphrase_signature: Some(node_keys.node_passphrase_signature.clone()),
        name: drive.encrypt_name("bench.bin", &share_public, USER).unwrap(),
        name_signature_email: Some(USER.into()),
        signature_email: Some(USER.into()),
        node_hash: None,
        kind: NodeKind::File {
            content_key_packet: Some(content.key_packet_base64.clone()),
            content_key_packet_signature: Some(content.signature.clone()),
            active_revision: None,
        },
    });

    Setup {
        drive,
        tree,
        file,
        pack,
        packet: content.key_packet_base64,
    }
}

fn upload(setup: &mut Setup, data: &[u8], block_size: usize) -> (RevisionId, InMemoryBlockSource) {
    let revision = RevisionId::new("rev");
    let source = InMemoryBlockSource::new();
    let mut blocks = Vec::new();
    for (index, chunk) in data.chunks(block_size).enumerate() {
        let encrypted = setup
            .drive
            .encrypt_block(index as u32, chunk, &setup.packet, &setup.pack, USER)
            .unwrap();
        let block = encrypted.to_block();
        source.insert(&block.reference(&revision), encrypted.ciphertext);
        blocks.push(block);
    }
    let hashes: Vec<&str> = blocks.iter().map(|b| b.sha256.as_str()).collect();
    let manifest = setup.drive.sign_manifest::<_, &str>(&hashes, &[], USER).unwrap();
    setup.tree.insert_revision(Revision {
        id: revision.clone(),
        file: setup.file.clone(),
        size: data.len() as u64,
        blocks,
        thumbnails: Vec::new(),
        manifest_signature: Some(manifest),
        extended_attributes: None,
        signature_address: Some(USER.into()),
    });
    (revision, source)
}

fn bench_encrypt_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("encrypt_block");
    let setup = build(CodecConfig::default());

    for size in [64 * 1024, 1024 * 1024, 4 * 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                black_box(
                    setup
                        .drive
                        .encrypt_block(0, data, &setup.packet, &setup.pack, USER)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

fn bench_decrypt_revision(c: &mut Criterion) {
    let mut group = c.benchmark_group("decrypt_revision");
    let size = 16 * 1024 * 1024;
    let data = vec![7u8; size];
    let dir = tempfile::tempdir().unwrap();
    group.throughput(Throughput::Bytes(size as u64));
    group.sample_size(10);

    for mode in [DecryptMode::InMemory, DecryptMode::Streaming, DecryptMode::Parallel] {
        let mut setup = build(CodecConfig::default().with_decrypt_mode(mode));
        let (revision, source) = upload(&mut setup, &data, 4 * 1024 * 1024);
        let dest = dir.path().join(format!("{mode:?}"));

        group.bench_function(BenchmarkId::from_parameter(format!("{mode:?}")), |b| {
            b.iter(|| {
                setup
                    .drive
                    .decrypt_revision(&setup.tree, &revision, &source, &dest, &CancellationToken::new())
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encrypt_block, bench_decrypt_revision);
criterion_main!(benches);
