//! End-to-end backup tests: encrypt a wallet descriptor, then decrypt it
//! with different sets of signer xpubs.
//!
//! Signers are derived from fixed BIP-39 mnemonics so every run sees the same
//! keys, and recovered descriptors are checked against rust-miniscript.

use std::str::FromStr;

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use miniscript::descriptor::DescriptorPublicKey;
use msbackup_core::bytes::to_base64;
use msbackup_core::{fingerprint_pair_hash, parse_fingerprint, split_encrypted, NetworkKind};
use msbackup_crypt::{
    decrypt, decrypt_descriptor, encrypt_descriptor, parse_encrypted_descriptor, CryptoContext,
    EncryptOutput,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ============================================================================
// Fixtures
// ============================================================================

struct Signer {
    fingerprint: String,
    xpub: String,
    origin: String,
}

fn signer(id: u8, network: Network) -> Signer {
    let secp = Secp256k1::new();
    let mnemonic = Mnemonic::from_entropy(&[id; 16]).unwrap();
    let master = Xpriv::new_master(network, &mnemonic.to_seed("")).unwrap();
    let coin = if network == Network::Bitcoin { 0 } else { 1 };
    let path = DerivationPath::from_str(&format!("m/48'/{}'/0'/2'", coin)).unwrap();
    let account = master.derive_priv(&secp, &path).unwrap();
    Signer {
        fingerprint: master.fingerprint(&secp).to_string(),
        xpub: Xpub::from_priv(&secp, &account).to_string(),
        origin: format!("48h/{}h/0h/2h", coin),
    }
}

fn key(s: &Signer) -> String {
    format!("[{}/{}]{}/<0;1>/*", s.fingerprint, s.origin, s.xpub)
}

fn signers(ids: std::ops::RangeInclusive<u8>) -> Vec<Signer> {
    ids.map(|id| signer(id, Network::Bitcoin)).collect()
}

fn sortedmulti(k: usize, signers: &[Signer]) -> String {
    let keys: Vec<String> = signers.iter().map(key).collect();
    format!("wsh(sortedmulti({},{}))", k, keys.join(","))
}

fn encrypt_seeded(descriptor: &str, seed: u64) -> EncryptOutput {
    let mut ctx = CryptoContext::with_rng(StdRng::seed_from_u64(seed));
    encrypt_descriptor(&mut ctx, descriptor).unwrap()
}

// ============================================================================
// 1. Threshold behaviour
// ============================================================================

#[test]
fn test_every_quorum_of_two_of_three_recovers() {
    let wallet = signers(1..=3);
    let descriptor = sortedmulti(2, &wallet);
    let encrypted = encrypt_seeded(&descriptor, 1).encrypted_text;

    for (a, b) in [(0, 1), (0, 2), (1, 2), (2, 0)] {
        let outcome = decrypt(&encrypted, &[&wallet[a].xpub, &wallet[b].xpub]).unwrap();
        assert!(outcome.is_complete(), "quorum ({}, {}) failed", a, b);
        assert_eq!(outcome.descriptor.as_deref(), Some(descriptor.as_str()));
    }
}

#[test]
fn test_one_xpub_short_of_quorum() {
    let wallet = signers(1..=3);
    let encrypted = encrypt_seeded(&sortedmulti(2, &wallet), 2).encrypted_text;

    for signer in &wallet {
        let outcome = decrypt(&encrypted, &[&signer.xpub]).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.decrypted_shares, 1);
        assert_eq!(outcome.required_shares, 2);
        assert_eq!(
            outcome.message(),
            "Decrypted 1 of 2 required shares. Please provide 1 more xpub(s)."
        );
    }
}

#[test]
fn test_foreign_xpubs_open_nothing() {
    let wallet = signers(1..=3);
    let strangers = signers(20..=22);
    let encrypted = encrypt_seeded(&sortedmulti(2, &wallet), 3).encrypted_text;

    let xpubs: Vec<&str> = strangers.iter().map(|s| s.xpub.as_str()).collect();
    let outcome = decrypt(&encrypted, &xpubs).unwrap();
    assert_eq!(outcome.decrypted_shares, 0);
    assert_eq!(outcome.shares_needed(), 2);
    assert!(outcome.descriptor.is_none());
}

#[test]
fn test_three_of_five_needs_exactly_three() {
    let wallet = signers(1..=5);
    let descriptor = sortedmulti(3, &wallet);
    let encrypted = encrypt_seeded(&descriptor, 4).encrypted_text;

    let two = decrypt(&encrypted, &[&wallet[4].xpub, &wallet[1].xpub]).unwrap();
    assert_eq!((two.decrypted_shares, two.required_shares), (2, 3));
    assert!(!two.is_complete());

    let three = decrypt(&encrypted, &[&wallet[4].xpub, &wallet[1].xpub, &wallet[3].xpub]).unwrap();
    assert_eq!(three.descriptor.as_deref(), Some(descriptor.as_str()));
}

// ============================================================================
// 2. Published form
// ============================================================================

#[test]
fn test_published_text_carries_no_key_material() {
    let wallet = signers(1..=3);
    let out = encrypt_seeded(&sortedmulti(2, &wallet), 5);

    assert!(out
        .encrypted_text
        .starts_with("wsh(sortedmulti(2,[48h/0h/0h/2h]<0;1>/*,[48h/0h/0h/2h]<0;1>/*,[48h/0h/0h/2h]<0;1>/*))"));
    for signer in &wallet {
        assert!(!out.encrypted_text.contains(&signer.xpub));
        assert!(!out.encrypted_text.contains(&signer.fingerprint));
    }
    assert!(!out.encrypted_text.contains('='));
    assert!(!out.missing_fingerprints);
    assert_eq!(out.network, NetworkKind::Main);
}

#[test]
fn test_pair_hashes_cover_every_fingerprint_pair() {
    let wallet = signers(1..=3);
    let out = encrypt_seeded(&sortedmulti(2, &wallet), 6);
    let parsed = parse_encrypted_descriptor(&out.encrypted_text).unwrap();

    let published = parsed.blob().pair_hashes.clone().unwrap();
    assert_eq!(published.len(), 3);
    for (a, b) in [(0, 1), (0, 2), (2, 1)] {
        let hash = fingerprint_pair_hash(
            &parse_fingerprint(&wallet[a].fingerprint).unwrap(),
            &parse_fingerprint(&wallet[b].fingerprint).unwrap(),
        );
        assert!(published.contains(&hash));
    }
}

#[test]
fn test_recovered_descriptor_passes_miniscript() {
    let wallet = signers(1..=3);
    let descriptor = sortedmulti(2, &wallet);
    let encrypted = encrypt_seeded(&descriptor, 7).encrypted_text;

    let recovered = decrypt(&encrypted, &[&wallet[0].xpub, &wallet[1].xpub])
        .unwrap()
        .descriptor_with_checksum()
        .unwrap();

    // rust-miniscript verifies the checksum while parsing
    let parsed = miniscript::Descriptor::<DescriptorPublicKey>::from_str(&recovered).unwrap();
    assert!(parsed.sanity_check().is_ok());

    let (body, checksum) = recovered.split_once('#').unwrap();
    let last = checksum.chars().last().unwrap();
    let flipped = format!(
        "{}#{}{}",
        body,
        &checksum[..7],
        if last == 'q' { 'p' } else { 'q' }
    );
    assert!(miniscript::Descriptor::<DescriptorPublicKey>::from_str(&flipped).is_err());
}

// ============================================================================
// 3. Corruption
// ============================================================================

fn rebuild(template: &str, data: &[u8]) -> String {
    format!("{}{}", template, to_base64(data))
}

#[test]
fn test_corrupted_share_costs_only_that_share() {
    let wallet = signers(1..=3);
    let descriptor = format!(
        "wsh(multi(3,{},{},{}))",
        key(&wallet[0]),
        key(&wallet[1]),
        key(&wallet[2])
    );
    let encrypted = encrypt_seeded(&descriptor, 8).encrypted_text;
    let (template, mut data) = split_encrypted(&encrypted).unwrap();
    data[0] ^= 0x01;
    let corrupted = rebuild(template, &data);

    let xpubs: Vec<&str> = wallet.iter().map(|s| s.xpub.as_str()).collect();
    let outcome = decrypt(&corrupted, &xpubs).unwrap();
    assert_eq!(outcome.decrypted_shares, 2);
    assert_eq!(outcome.required_shares, 3);
    assert!(outcome.descriptor.is_none());
}

#[test]
fn test_truncated_blob_is_rejected() {
    let wallet = signers(1..=3);
    let encrypted = encrypt_seeded(&sortedmulti(2, &wallet), 9).encrypted_text;
    let (template, data) = split_encrypted(&encrypted).unwrap();

    let truncated = rebuild(template, &data[..data.len() - 1]);
    assert!(decrypt(&truncated, &[&wallet[0].xpub]).is_err());

    // Dropping every pair hash is still a valid backup
    let without_hashes = rebuild(template, &data[..data.len() - 12]);
    let outcome = decrypt(&without_hashes, &[&wallet[0].xpub, &wallet[2].xpub]).unwrap();
    assert!(outcome.is_complete());
}

// ============================================================================
// 4. Policy shapes
// ============================================================================

#[test]
fn test_timelocked_recovery_group() {
    let wallet = signers(1..=5);
    let descriptor = format!(
        "wsh(or_d(multi(2,{},{},{}),and_v(v:multi(1,{},{}),older(52560))))",
        key(&wallet[0]),
        key(&wallet[1]),
        key(&wallet[2]),
        key(&wallet[3]),
        key(&wallet[4])
    );
    let ctx = CryptoContext::new();
    let encrypted = encrypt_seeded(&descriptor, 10).encrypted_text;

    // A single recovery key meets the second group's threshold
    let outcome = decrypt_descriptor(&ctx, &encrypted, &[&wallet[4].xpub]).unwrap();
    assert_eq!(outcome.descriptor.as_deref(), Some(descriptor.as_str()));
    assert_eq!((outcome.decrypted_shares, outcome.required_shares), (1, 1));

    // Equal shortfall in both groups reports the first
    let outcome = decrypt_descriptor(&ctx, &encrypted, &[&wallet[0].xpub]).unwrap();
    assert_eq!((outcome.decrypted_shares, outcome.required_shares), (1, 2));
    assert!(!outcome.is_complete());

    let outcome = decrypt_descriptor(&ctx, &encrypted, &[&wallet[0].xpub, &wallet[2].xpub]).unwrap();
    assert!(outcome.is_complete());
}

#[test]
fn test_key_without_origin() {
    let wallet = signers(1..=2);
    let descriptor = format!(
        "wsh(sortedmulti(1,{},{}/<0;1>/*))",
        key(&wallet[0]),
        wallet[1].xpub
    );
    let out = encrypt_seeded(&descriptor, 11);
    assert!(out.missing_fingerprints);

    let outcome = decrypt(&out.encrypted_text, &[&wallet[1].xpub]).unwrap();
    assert_eq!(outcome.descriptor.as_deref(), Some(descriptor.as_str()));
}

#[test]
fn test_testnet_wallet() {
    let wallet: Vec<Signer> = (1..=3).map(|id| signer(id, Network::Testnet)).collect();
    let descriptor = sortedmulti(2, &wallet);
    let out = encrypt_seeded(&descriptor, 12);
    assert_eq!(out.network, NetworkKind::Test);
    assert!(out.encrypted_text.starts_with("wsh(sortedmulti(2,[48h/1h/0h/2h]<0;1>/*"));

    let outcome = decrypt(&out.encrypted_text, &[&wallet[0].xpub, &wallet[1].xpub]).unwrap();
    let recovered = outcome.descriptor.unwrap();
    assert_eq!(recovered, descriptor);
    assert!(recovered.contains("]tpub"));
}
