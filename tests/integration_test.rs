//! Integration tests for the drive codecs
//!
//! These walk whole flows through the public API: creating a file, moving
//! it, opening shares and downloading revisions.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::{content, World, ALICE, BOB};
use drive_core::{
    BlockSource, CacheSlot, CancellationToken, CodecConfig, DecryptMode, DirectoryBlockSource, NodeId,
    NodeKind, Share, ShareId, ShareKind, SignatureFailure, VerificationStatus,
};
use drive_crypto::{CryptoEngine, KeyPack};
use rstest::rstest;
use std::slice;

fn set_content_signature(world: &mut World, file: &NodeId, signature: String) {
    if let NodeKind::File {
        content_key_packet_signature,
        ..
    } = &mut world.tree.node_mut(file).unwrap().kind
    {
        *content_key_packet_signature = Some(signature);
    }
    world.drive.invalidate(file.as_str());
}

#[test]
fn test_create_file_draft_and_read_back() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let docs = w.folder("docs", &root, "Documents");
    let file = w.file("report", &docs, "report.pdf");

    let name = w.drive.decrypt_name(&w.tree, &file).unwrap();
    assert_eq!(name.value, "report.pdf");
    assert!(name.is_verified());

    assert!(w.drive.decrypt_node_passphrase(&w.tree, &file).unwrap().is_verified());
    assert!(w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().is_verified());
    assert_eq!(
        w.tree.node(&file).unwrap().node_hash.as_deref(),
        Some(w.drive.hash_name(&w.tree, "report.pdf", &docs).unwrap().as_str())
    );
    assert_eq!(w.drive.decrypt_name(&w.tree, &docs).unwrap().value, "Documents");
}

#[test]
fn test_move_file_between_folders() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let from = w.folder("from", &root, "From");
    let to = w.folder("to", &root, "To");
    let file = w.file("file", &from, "notes.txt");
    let data = content(3000);
    let (revision, source) = w.upload(&file, &data, 1024);
    let session_key = w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().value;
    let old_hash = w.tree.node(&file).unwrap().node_hash.clone();

    let moved = w.drive.move_node(&w.tree, &file, &to, ALICE).unwrap();
    assert_eq!(moved.original_hash, old_hash);
    assert_eq!(moved.node_hash, w.drive.hash_name(&w.tree, "notes.txt", &to).unwrap());

    let node = w.tree.node_mut(&file).unwrap();
    node.parent = Some(moved.new_parent.clone());
    node.node_passphrase = moved.node_passphrase;
    node.node_passphrase_signature = moved.node_passphrase_signature;
    node.name = moved.name;
    node.node_hash = Some(moved.node_hash);
    node.name_signature_email = Some(moved.name_signature_email);
    w.forget();

    let name = w.drive.decrypt_name(&w.tree, &file).unwrap();
    assert_eq!(name.value, "notes.txt");
    assert!(name.is_verified());
    assert!(w.drive.decrypt_node_passphrase(&w.tree, &file).unwrap().is_verified());
    assert_eq!(
        w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().value,
        session_key
    );

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("notes.txt");
    w.drive
        .decrypt_revision(&w.tree, &revision, &source, &dest, &CancellationToken::new())
        .unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), data);
}

#[test]
fn test_rename_keeps_node_readable() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let folder = w.folder("folder", &root, "Old");

    let renamed = w.drive.rename_node(&w.tree, &folder, "New", BOB).unwrap();
    let node = w.tree.node_mut(&folder).unwrap();
    node.name = renamed.name;
    node.node_hash = renamed.node_hash;
    node.name_signature_email = Some(renamed.name_signature_email);
    w.forget();

    let name = w.drive.decrypt_name(&w.tree, &folder).unwrap();
    assert_eq!(name.value, "New");
    assert!(name.is_verified());
}

#[test_log::test]
fn test_legacy_collaborative_share_uses_root_node_key() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let team = w.folder("team", &root, "Team");

    // The creator's private keys are not available to us, only the public one
    const CAROL: &str = "carol@example.com";
    let carol = KeyPack::new(w.engine.generate_key("carol").unwrap(), "carol");
    w.keys.add_public_key(CAROL, w.public(&carol.armored_key));

    let passphrase = "legacy-share-passphrase";
    let share_key = w.engine.generate_key(passphrase).unwrap();
    let to_carol = w
        .engine
        .encrypt(passphrase.as_bytes(), &w.public(&carol.armored_key), None)
        .unwrap();
    let team_key = w.tree.node(&team).unwrap().node_key.clone();
    let both = w.drive.add_recipient_key_packet(&to_carol, &carol, &team_key).unwrap();
    assert_eq!(w.engine.key_packet_count(&both).unwrap(), 2);

    w.tree.insert_share(Share {
        id: ShareId::new("legacy"),
        creator: CAROL.into(),
        key: share_key,
        passphrase: both,
        passphrase_signature: Some(w.engine.sign_detached(passphrase.as_bytes(), &carol).unwrap()),
        root_node: Some(team.clone()),
        kind: ShareKind::Standard,
        is_collaborative: true,
    });

    let decrypted = w
        .drive
        .decrypt_share_passphrase(&w.tree, &ShareId::new("legacy"))
        .unwrap();
    assert_eq!(decrypted.value, passphrase);
    assert!(decrypted.is_verified());

    // Without the collaborative flag only the address path is tried, and it fails
    let mut share = w.tree.share(&ShareId::new("legacy")).unwrap().clone();
    share.is_collaborative = false;
    w.tree.insert_share(share);
    w.forget();
    assert!(w
        .drive
        .decrypt_share_passphrase(&w.tree, &ShareId::new("legacy"))
        .is_err());
}

#[test_log::test]
fn test_self_rooted_collaborative_share_falls_back_to_address_keys() {
    let mut w = World::new();
    let root = w.share("own", ALICE);
    let share_id = ShareId::new("own");
    let expected = w.drive.decrypt_share_passphrase(&w.tree, &share_id).unwrap().value;

    let alice = w.signing_key(ALICE);
    let root_key = w.tree.node(&root).unwrap().node_key.clone();
    let mut share = w.tree.share(&share_id).unwrap().clone();
    share.passphrase = w
        .drive
        .add_recipient_key_packet(&share.passphrase, &alice, &root_key)
        .unwrap();
    share.is_collaborative = true;
    w.tree.insert_share(share);
    w.forget();

    let decrypted = w.drive.decrypt_share_passphrase(&w.tree, &share_id).unwrap();
    assert_eq!(decrypted.value, expected);
    assert!(decrypted.is_verified());
}

/// Turn `share` into a collaborative share rooted at `root`, with its
/// passphrase also wrapped to `recipient`
fn make_collaborative(w: &mut World, share: &str, root: &NodeId, recipient: &str) {
    let alice = w.signing_key(ALICE);
    let mut share = w.tree.share(&ShareId::new(share)).unwrap().clone();
    share.passphrase = w
        .drive
        .add_recipient_key_packet(&share.passphrase, &alice, recipient)
        .unwrap();
    share.root_node = Some(root.clone());
    share.is_collaborative = true;
    w.tree.insert_share(share);
}

#[test_log::test]
fn test_collaborative_share_falls_back_when_root_key_is_not_a_recipient() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let team = w.folder("team", &root, "Team");
    w.share("legacy", ALICE);
    let legacy = ShareId::new("legacy");
    let expected = w.drive.decrypt_share_passphrase(&w.tree, &legacy).unwrap().value;

    let stranger = w.engine.generate_key("stranger").unwrap();
    make_collaborative(&mut w, "legacy", &team, &stranger);
    w.forget();

    let decrypted = w.drive.decrypt_share_passphrase(&w.tree, &legacy).unwrap();
    assert_eq!(decrypted.value, expected);
    assert!(decrypted.is_verified());

    // the root key was resolved, so the node path really ran before falling back
    let team_node = w.tree.node(&team).unwrap();
    assert!(w
        .drive
        .cache()
        .get(team.as_str(), CacheSlot::Passphrase, team_node.node_passphrase.as_bytes())
        .is_some());
}

#[test_log::test]
fn test_mutually_rooted_collaborative_shares_resolve() {
    let mut w = World::new();
    let a_root = w.share("a", ALICE);
    let b_root = w.share("b", ALICE);
    let x = w.folder("x", &b_root, "X");
    let y = w.folder("y", &a_root, "Y");
    let (a, b) = (ShareId::new("a"), ShareId::new("b"));
    let expected_a = w.drive.decrypt_share_passphrase(&w.tree, &a).unwrap().value;
    let expected_b = w.drive.decrypt_share_passphrase(&w.tree, &b).unwrap().value;

    // a is unlocked through x, which lives in b; b through y, which lives in a
    let x_key = w.tree.node(&x).unwrap().node_key.clone();
    let y_key = w.tree.node(&y).unwrap().node_key.clone();
    make_collaborative(&mut w, "a", &x, &x_key);
    make_collaborative(&mut w, "b", &y, &y_key);
    w.forget();

    let decrypted = w.drive.decrypt_share_passphrase(&w.tree, &a).unwrap();
    assert_eq!(decrypted.value, expected_a);
    assert!(decrypted.is_verified());

    w.forget();
    assert_eq!(
        w.drive.decrypt_share_passphrase(&w.tree, &b).unwrap().value,
        expected_b
    );
    assert_eq!(w.drive.decrypt_name(&w.tree, &x).unwrap().value, "X");
}

#[test]
fn test_content_key_signature_variants() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let file = w.file("file", &root, "a.bin");
    let session_key = w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().value;

    // address key over the session key
    let alice = w.signing_key(ALICE);
    let signature = w.engine.sign_detached(session_key.as_bytes(), &alice).unwrap();
    set_content_signature(&mut w, &file, signature);
    assert!(w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().is_verified());

    // node key over the key packet, as older clients signed
    let (packet, _) = w.tree.node(&file).unwrap().content_key().unwrap();
    let packet = STANDARD.decode(packet).unwrap();
    let node = w.drive.resolve_node_key_pack(&w.tree, &file).unwrap();
    let signature = w.engine.sign_detached(&packet, &node).unwrap();
    set_content_signature(&mut w, &file, signature);
    assert!(w.drive.decrypt_content_session_key(&w.tree, &file).unwrap().is_verified());

    // someone else entirely
    let bob = w.signing_key(BOB);
    let signature = w.engine.sign_detached(session_key.as_bytes(), &bob).unwrap();
    set_content_signature(&mut w, &file, signature);
    let result = w.drive.decrypt_content_session_key(&w.tree, &file).unwrap();
    assert_eq!(result.value, session_key);
    assert!(matches!(
        result.status,
        VerificationStatus::Unverified(SignatureFailure::Invalid(_))
    ));
}

#[test]
fn test_reencryption_preserves_payload() {
    let mut w = World::new();
    let root = w.share("main", ALICE);
    let a = w.folder("a", &root, "A");
    let b = w.folder("b", &root, "B");
    let child = w.folder("child", &a, "Child");

    let before = w.drive.decrypt_node_passphrase(&w.tree, &child).unwrap().value;
    let original = w.tree.node(&child).unwrap().node_passphrase.clone();
    let rewrapped = w.drive.reencrypt_node_passphrase(&w.tree, &child, &b).unwrap();
    assert_eq!(
        w.engine.split_message(&rewrapped).unwrap().data_packet,
        w.engine.split_message(&original).unwrap().data_packet
    );

    let new_parent = w.drive.resolve_node_key_pack(&w.tree, &b).unwrap();
    let after = w.engine.decrypt(&rewrapped, slice::from_ref(&new_parent), &[]).unwrap();
    assert_eq!(after.data, before.as_bytes());
}

#[rstest]
#[case(DecryptMode::InMemory)]
#[case(DecryptMode::Streaming)]
#[case(DecryptMode::Parallel)]
fn test_full_revision_download(#[case] mode: DecryptMode) {
    let mut w = World::with_config(CodecConfig::default().with_decrypt_mode(mode));
    let root = w.share("main", ALICE);
    let file = w.file("movie", &root, "movie.mp4");
    let data = content(10_000);
    let (revision, source) = w.upload(&file, &data, 2048);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("movie.mp4");
    let result = w
        .drive
        .decrypt_revision(&w.tree, &revision, &source, &dest, &CancellationToken::new())
        .unwrap();

    assert!(result.is_verified());
    assert_eq!(result.size, 10_000);
    assert_eq!(
        result.blocks.iter().map(|b| b.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(std::fs::read(&dest).unwrap(), data);

    let attrs = w
        .drive
        .decrypt_extended_attributes(&w.tree, &revision)
        .unwrap()
        .unwrap();
    assert!(attrs.is_verified());
    let common = attrs.value.common.unwrap();
    assert_eq!(common.size, Some(10_000));
    assert_eq!(common.block_sizes.unwrap(), vec![2048, 2048, 2048, 2048, 1808]);
    assert_eq!(common.digests.unwrap().sha1.map(|d| d.len()), Some(40));
}

#[test]
fn test_download_from_directory_source() {
    let mut w = World::with_config(CodecConfig::default().with_decrypt_mode(DecryptMode::Streaming));
    let root = w.share("main", ALICE);
    let file = w.file("file", &root, "a.bin");
    let data = content(5000);
    let (revision, memory) = w.upload(&file, &data, 1024);

    let store = tempfile::tempdir().unwrap();
    let source = DirectoryBlockSource::new(store.path());
    for block in &w.tree.revision(&revision).unwrap().blocks {
        let reference = block.reference(&revision);
        let path = source.path_of(&reference);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, memory.fetch_ciphertext(&reference).unwrap()).unwrap();
    }

    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("a.bin");
    w.drive
        .decrypt_revision(&w.tree, &revision, &source, &dest, &CancellationToken::new())
        .unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), data);
}
