//! Secret shares and their per-key sealing
//!
//! Each key slot of a group receives one share of the backup secret. A group
//! that needs more than one signature out of several keys gets Shamir shares
//! (16 y-bytes plus the x-coordinate); any other group gets the raw secret in
//! every slot. Sealed with a 16-byte Poly1305 tag that makes 33 or 32 bytes.

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use msbackup_core::bytes::minimal_be_bytes;
use msbackup_core::ExtendedKey;
use msbackup_shamir::{reconstruct_secret, split_secret};

use crate::context::CryptoContext;
use crate::BackupError;

/// Backup secret length
pub const SECRET_LEN: usize = 16;

/// Poly1305 tag length
pub const TAG_LEN: usize = 16;

/// How a group's shares are formed, fixed by the group's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareKind {
    /// The raw secret (1-of-n, or a single key)
    Single,
    /// A Shamir share (k-of-n with k > 1 and n > 1)
    Threshold,
}

impl ShareKind {
    pub fn for_group(num_xpubs: usize, required_sigs: usize) -> Self {
        if num_xpubs > 1 && required_sigs > 1 {
            ShareKind::Threshold
        } else {
            ShareKind::Single
        }
    }

    /// Plaintext share length
    pub fn share_len(self) -> usize {
        match self {
            ShareKind::Single => SECRET_LEN,
            ShareKind::Threshold => SECRET_LEN + 1,
        }
    }

    /// Sealed share length (share plus tag)
    pub fn sealed_len(self) -> usize {
        self.share_len() + TAG_LEN
    }
}

/// One plaintext share
#[derive(Clone, PartialEq, Eq)]
pub enum Share {
    Single([u8; SECRET_LEN]),
    Threshold([u8; SECRET_LEN + 1]),
}

impl Drop for Share {
    fn drop(&mut self) {
        match self {
            Share::Single(bytes) => bytes.zeroize(),
            Share::Threshold(bytes) => bytes.zeroize(),
        }
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Share::{:?}([REDACTED])", self.kind())
    }
}

impl Share {
    pub fn kind(&self) -> ShareKind {
        match self {
            Share::Single(_) => ShareKind::Single,
            Share::Threshold(_) => ShareKind::Threshold,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Share::Single(bytes) => bytes,
            Share::Threshold(bytes) => bytes,
        }
    }

    /// Interpret opened bytes as a share of the given kind
    pub fn from_bytes(kind: ShareKind, bytes: &[u8]) -> Option<Self> {
        match kind {
            ShareKind::Single => bytes.try_into().ok().map(Share::Single),
            ShareKind::Threshold => bytes.try_into().ok().map(Share::Threshold),
        }
    }
}

/// Shares for one group: `num_xpubs` of them, any `required_sigs` of which
/// give back the secret.
pub fn make_shares<R: RngCore + CryptoRng>(
    ctx: &mut CryptoContext<R>,
    secret: &[u8; SECRET_LEN],
    required_sigs: usize,
    num_xpubs: usize,
) -> Result<Vec<Share>, BackupError> {
    match ShareKind::for_group(num_xpubs, required_sigs) {
        ShareKind::Single => Ok(vec![Share::Single(*secret); num_xpubs]),
        ShareKind::Threshold => {
            let threshold = u8::try_from(required_sigs)
                .map_err(|_| BackupError::InvalidInput("threshold above 255".into()))?;
            let total = u8::try_from(num_xpubs)
                .map_err(|_| BackupError::InvalidInput("more than 255 keys in a group".into()))?;
            split_secret(secret, threshold, total, ctx.rng())?
                .iter()
                .map(|share| {
                    Share::from_bytes(ShareKind::Threshold, &share.to_bytes()).ok_or_else(|| {
                        BackupError::CryptoUnavailable("unexpected Shamir share length".into())
                    })
                })
                .collect()
        }
    }
}

/// Recover the secret from at least `required_sigs` opened shares of one group
pub fn combine_shares(
    shares: &[Share],
    required_sigs: usize,
) -> Result<Zeroizing<[u8; SECRET_LEN]>, BackupError> {
    let first = shares
        .first()
        .ok_or_else(|| BackupError::InvalidInput("no shares to combine".into()))?;
    let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
    match first {
        Share::Single(bytes) => secret.copy_from_slice(bytes),
        Share::Threshold(_) if required_sigs <= 1 => {
            return Err(BackupError::InvalidInput(
                "threshold share in a single-signature group".into(),
            ))
        }
        Share::Threshold(_) => {
            let parsed = shares
                .iter()
                .map(|s| msbackup_shamir::Share::from_bytes(s.as_bytes()))
                .collect::<Result<Vec<_>, _>>()?;
            let recovered = reconstruct_secret(&parsed)?;
            if recovered.len() != SECRET_LEN {
                return Err(BackupError::InvalidInput("recovered secret has wrong length".into()));
            }
            secret.copy_from_slice(&recovered);
        }
    }
    Ok(secret)
}

/// Per-share AEAD key: SHA-256(xpub payload ‖ encrypted payload ‖ index),
/// the index as minimal big-endian bytes and global across groups.
pub fn share_key<R>(
    ctx: &CryptoContext<R>,
    xpub: &ExtendedKey,
    encrypted_payload: &[u8],
    index: usize,
) -> Zeroizing<[u8; 32]> {
    let index_bytes = minimal_be_bytes(index);
    Zeroizing::new(ctx.sha256(&[xpub.payload(), encrypted_payload, index_bytes.as_slice()]))
}

/// Seal a share for the holder of `xpub`
pub fn seal_share<R>(
    ctx: &CryptoContext<R>,
    share: &Share,
    xpub: &ExtendedKey,
    encrypted_payload: &[u8],
    index: usize,
) -> Result<Vec<u8>, BackupError> {
    let key = share_key(ctx, xpub, encrypted_payload, index);
    ctx.seal(&key, share.as_bytes())
}

/// Try to open a sealed share with `xpub`. A wrong key is not an error.
pub fn open_share<R>(
    ctx: &CryptoContext<R>,
    kind: ShareKind,
    sealed: &[u8],
    xpub: &ExtendedKey,
    encrypted_payload: &[u8],
    index: usize,
) -> Option<Share> {
    let key = share_key(ctx, xpub, encrypted_payload, index);
    let opened = ctx.open(&key, sealed)?;
    Share::from_bytes(kind, &opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::bip32::{Xpriv, Xpub};
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::Network;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn xpub(seed: u8) -> ExtendedKey {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[seed; 32]).unwrap();
        ExtendedKey::from_base58(&Xpub::from_priv(&secp, &master).to_string()).unwrap()
    }

    fn ctx() -> CryptoContext<StdRng> {
        CryptoContext::with_rng(StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_share_kind_for_group() {
        assert_eq!(ShareKind::for_group(3, 2), ShareKind::Threshold);
        assert_eq!(ShareKind::for_group(3, 1), ShareKind::Single);
        assert_eq!(ShareKind::for_group(1, 1), ShareKind::Single);
        assert_eq!(ShareKind::Threshold.sealed_len(), 33);
        assert_eq!(ShareKind::Single.sealed_len(), 32);
    }

    #[test]
    fn test_single_shares_are_the_secret() {
        let mut ctx = ctx();
        let secret = [9u8; SECRET_LEN];
        let shares = make_shares(&mut ctx, &secret, 1, 3).unwrap();
        assert_eq!(shares.len(), 3);
        assert!(shares.iter().all(|s| s.as_bytes() == secret));
        assert_eq!(*combine_shares(&shares[2..], 1).unwrap(), secret);
    }

    #[test]
    fn test_threshold_shares_combine() {
        let mut ctx = ctx();
        let secret = [5u8; SECRET_LEN];
        let shares = make_shares(&mut ctx, &secret, 2, 3).unwrap();
        assert!(shares.iter().all(|s| s.kind() == ShareKind::Threshold));
        assert_eq!(*combine_shares(&shares[..2], 2).unwrap(), secret);
        assert_eq!(*combine_shares(&[shares[0].clone(), shares[2].clone()], 2).unwrap(), secret);
    }

    #[test]
    fn test_seal_and_open() {
        let mut ctx = ctx();
        let share = make_shares(&mut ctx, &[1u8; SECRET_LEN], 2, 2).unwrap().remove(0);
        let payload = [0xaau8; 78];
        let sealed = seal_share(&ctx, &share, &xpub(1), &payload, 0).unwrap();
        assert_eq!(sealed.len(), ShareKind::Threshold.sealed_len());

        let opened = open_share(&ctx, ShareKind::Threshold, &sealed, &xpub(1), &payload, 0);
        assert_eq!(opened, Some(share));
    }

    #[test]
    fn test_open_needs_matching_key_payload_and_index() {
        let ctx = ctx();
        let share = Share::Single([3u8; SECRET_LEN]);
        let payload = [0x55u8; 78];
        let sealed = seal_share(&ctx, &share, &xpub(1), &payload, 7).unwrap();

        let kind = ShareKind::Single;
        assert!(open_share(&ctx, kind, &sealed, &xpub(2), &payload, 7).is_none());
        assert!(open_share(&ctx, kind, &sealed, &xpub(1), &payload, 8).is_none());
        assert!(open_share(&ctx, kind, &sealed, &xpub(1), &payload[1..], 7).is_none());
        assert!(open_share(&ctx, kind, &sealed, &xpub(1), &payload, 7).is_some());
    }

    #[test]
    fn test_share_key_uses_minimal_index() {
        let ctx = ctx();
        let key = xpub(1);
        let expected = ctx.sha256(&[key.payload(), &b"p"[..]]);
        assert_eq!(*share_key(&ctx, &key, b"p", 0), expected);
        let expected = ctx.sha256(&[key.payload(), &b"p"[..], &[1u8, 0][..]]);
        assert_eq!(*share_key(&ctx, &key, b"p", 256), expected);
    }

    #[test]
    fn test_debug_is_redacted() {
        let share = Share::Single([0x42; SECRET_LEN]);
        assert_eq!(format!("{:?}", share), "Share::Single([REDACTED])");
    }
}
