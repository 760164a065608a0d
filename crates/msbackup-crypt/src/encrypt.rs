//! Descriptor encryption
//!
//! One fresh 16-byte secret protects the whole descriptor. The key material
//! is encrypted under a key derived from it, and every xpub holder gets a
//! share of the secret sealed to their own xpub. Anyone holding enough of
//! the xpubs can therefore recover the rest of the descriptor, and nobody
//! else learns which keys it contains.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use msbackup_core::{Descriptor, NetworkKind};

use crate::blob::{pair_hashes_for, EncryptedBlob, EncryptedDescriptor, GroupShares};
use crate::context::CryptoContext;
use crate::payload::{encrypt_payload, KeyMaterial};
use crate::share::{make_shares, seal_share, ShareKind};
use crate::BackupError;

/// Result of encrypting a descriptor
#[derive(Debug, Clone)]
pub struct EncryptOutput {
    /// Stripped template followed by the Base64 blob
    pub encrypted_text: String,
    /// Some key in the descriptor had no fingerprint
    pub missing_fingerprints: bool,
    /// Network of the first key, for choosing where to publish
    pub network: NetworkKind,
}

/// Encrypt a descriptor using the supplied context
pub fn encrypt_descriptor<R: RngCore + CryptoRng>(
    ctx: &mut CryptoContext<R>,
    text: &str,
) -> Result<EncryptOutput, BackupError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(BackupError::InvalidInput("Descriptor is empty".into()));
    }

    let descriptor = Descriptor::parse(text)?;
    if descriptor
        .groups()
        .iter()
        .any(|g| g.num_xpubs < g.required_sigs)
    {
        return Err(BackupError::InvalidInput(
            "Not enough xpubs for required signatures".into(),
        ));
    }

    let secret = ctx.random_secret()?;
    let key = ctx.derive_key(&secret[..])?;
    let payload = encrypt_payload(ctx, &key, &KeyMaterial::from_descriptor(&descriptor));

    let mut groups = Vec::with_capacity(descriptor.groups().len());
    let mut index = 0;
    for group in descriptor.groups() {
        let shares = make_shares(ctx, &secret, group.required_sigs, group.num_xpubs)?;
        let mut sealed = Vec::with_capacity(shares.len());
        for (share, xpub) in shares.iter().zip(&group.xpubs) {
            sealed.push(seal_share(ctx, share, xpub, &payload, index)?);
            index += 1;
        }
        groups.push(GroupShares {
            required_sigs: group.required_sigs,
            kind: ShareKind::for_group(group.num_xpubs, group.required_sigs),
            sealed,
        });
    }

    let pair_hashes = pair_hashes_for(&descriptor);
    let blob = EncryptedBlob {
        groups,
        payload,
        pair_hashes: (!pair_hashes.is_empty()).then_some(pair_hashes),
    };

    let network = descriptor
        .xpubs()
        .next()
        .map(|xpub| xpub.network())
        .unwrap_or(NetworkKind::Main);
    let missing_fingerprints = descriptor.missing_fingerprints();

    log::info!(
        "Encrypted descriptor: {} group(s), {} xpub(s), {} fingerprint(s)",
        blob.groups.len(),
        descriptor.total_xpubs(),
        descriptor.total_fingerprints()
    );
    if missing_fingerprints {
        log::warn!("Descriptor has keys without fingerprints; recovery lookup will be limited");
    }

    Ok(EncryptOutput {
        encrypted_text: EncryptedDescriptor::new(descriptor, blob).to_text(),
        missing_fingerprints,
        network,
    })
}

/// Encrypt a descriptor with the operating system RNG
pub fn encrypt(text: &str) -> Result<EncryptOutput, BackupError> {
    encrypt_descriptor(&mut CryptoContext::<OsRng>::new(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::parse_encrypted_descriptor;
    use crate::share::TAG_LEN;
    use msbackup_core::{DescriptorError, KeyError};
    use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::Network;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::str::FromStr;

    fn key_expr(seed: u8, network: Network) -> String {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(network, &[seed; 32]).unwrap();
        let path = DerivationPath::from_str("m/48'/0'/0'/2'").unwrap();
        let account = master.derive_priv(&secp, &path).unwrap();
        format!(
            "[{}/48h/0h/0h/2h]{}/<0;1>/*",
            master.fingerprint(&secp),
            Xpub::from_priv(&secp, &account)
        )
    }

    fn ctx() -> CryptoContext<StdRng> {
        CryptoContext::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_output_shape() {
        let desc = format!(
            "wsh(sortedmulti(2,{},{},{}))",
            key_expr(1, Network::Bitcoin),
            key_expr(2, Network::Bitcoin),
            key_expr(3, Network::Bitcoin)
        );
        let out = encrypt_descriptor(&mut ctx(), &desc).unwrap();
        assert!(out.encrypted_text.starts_with(
            "wsh(sortedmulti(2,[48h/0h/0h/2h]<0;1>/*,[48h/0h/0h/2h]<0;1>/*,[48h/0h/0h/2h]<0;1>/*))"
        ));
        assert!(!out.encrypted_text.contains("xpub"));
        assert!(!out.encrypted_text.ends_with('='));
        assert!(!out.missing_fingerprints);
        assert_eq!(out.network, NetworkKind::Main);

        let parsed = parse_encrypted_descriptor(&out.encrypted_text).unwrap();
        let group = &parsed.blob().groups[0];
        assert_eq!(group.kind, ShareKind::Threshold);
        assert!(group.sealed.iter().all(|s| s.len() == 17 + TAG_LEN));
        assert_eq!(parsed.blob().payload.len(), 4 * 3 + 74 * 3);
        assert_eq!(parsed.blob().pair_hashes.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn test_fresh_secret_each_time() {
        let desc = format!(
            "wsh(sortedmulti(1,{},{}))",
            key_expr(1, Network::Bitcoin),
            key_expr(2, Network::Bitcoin)
        );
        let mut ctx = ctx();
        let a = encrypt_descriptor(&mut ctx, &desc).unwrap();
        let b = encrypt_descriptor(&mut ctx, &desc).unwrap();
        assert_ne!(a.encrypted_text, b.encrypted_text);
    }

    #[test]
    fn test_testnet_network() {
        let desc = format!(
            "wsh(multi(1,{},{}))",
            key_expr(4, Network::Testnet),
            key_expr(5, Network::Testnet)
        );
        let out = encrypt_descriptor(&mut ctx(), &desc).unwrap();
        assert_eq!(out.network, NetworkKind::Test);
    }

    #[test]
    fn test_missing_fingerprints_flag() {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[9; 32]).unwrap();
        let bare = Xpub::from_priv(&secp, &master);
        let desc = format!(
            "wsh(sortedmulti(1,{},{}/<0;1>/*))",
            key_expr(1, Network::Bitcoin),
            bare
        );
        let out = encrypt_descriptor(&mut ctx(), &desc).unwrap();
        assert!(out.missing_fingerprints);
        let parsed = parse_encrypted_descriptor(&out.encrypted_text).unwrap();
        assert_eq!(parsed.total_fingerprints(), 1);
        assert_eq!(parsed.total_xpubs(), 2);
        assert_eq!(parsed.blob().pair_hashes, None);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            encrypt_descriptor(&mut ctx(), "   "),
            Err(BackupError::InvalidInput(_))
        ));
        assert!(matches!(
            encrypt_descriptor(&mut ctx(), "wpkh(xpub)"),
            Err(BackupError::Descriptor(_))
        ));
        let desc = format!("wsh(sortedmulti(3,{},{}))", key_expr(1, Network::Bitcoin), key_expr(2, Network::Bitcoin));
        match encrypt_descriptor(&mut ctx(), &desc) {
            Err(BackupError::InvalidInput(msg)) => {
                assert_eq!(msg, "Not enough xpubs for required signatures")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_uppercase_fingerprint() {
        let upper = format!("[AABBCCDD{}", &key_expr(1, Network::Bitcoin)[9..]);
        let desc = format!("wsh(sortedmulti(1,{},{}))", upper, key_expr(2, Network::Bitcoin));
        assert!(matches!(
            encrypt_descriptor(&mut ctx(), &desc),
            Err(BackupError::Descriptor(DescriptorError::Key(KeyError::InvalidFingerprint(_))))
        ));
    }
}
