//! Extended public keys and master fingerprints
//!
//! Keys are handled as raw 78-byte BIP-32 serializations rather than parsed
//! [`bitcoin::bip32::Xpub`] values: SLIP-132 prefixes (`ypub`, `Zpub`, `vpub`,
//! ...) carry version bytes that `Xpub` refuses, and the backup format only
//! ever needs the version/payload split.

use bitcoin::base58;
use bitcoin::NetworkKind;
use thiserror::Error;

use crate::bytes::sha256;

/// Serialized extended key length
pub const EXTENDED_KEY_LEN: usize = 78;

/// Version prefix length
pub const VERSION_LEN: usize = 4;

/// Extended key without its version prefix
pub const KEY_PAYLOAD_LEN: usize = EXTENDED_KEY_LEN - VERSION_LEN;

/// Master fingerprint length
pub const FINGERPRINT_LEN: usize = 4;

/// Standard mainnet `xpub` version bytes
pub const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];

/// A master key fingerprint
pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// First letters of public key prefixes (`xpub`, `ypub`, `Zpub`, `tpub`, ...)
const KEY_PREFIXES: &str = "xyztuvUVYZ";

/// Prefixes that denote test-network keys
const TEST_PREFIXES: &str = "tuvUV";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid extended public key: {0}")]
    InvalidXpub(String),
    #[error("Invalid fingerprint '{0}': expected 8 lowercase hex characters")]
    InvalidFingerprint(String),
    #[error("Invalid derivation path format: {0}")]
    InvalidDerivationPath(String),
}

/// A base58check extended public key, kept as its 78 raw bytes
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExtendedKey {
    bytes: [u8; EXTENDED_KEY_LEN],
}

impl ExtendedKey {
    /// Decode a base58check extended public key of any supported prefix
    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        if !looks_like_public_key(s) {
            return Err(KeyError::InvalidXpub(format!("unsupported prefix in '{}'", s)));
        }
        let data = base58::decode_check(s).map_err(|e| KeyError::InvalidXpub(e.to_string()))?;
        let bytes: [u8; EXTENDED_KEY_LEN] = data.as_slice().try_into().map_err(|_| {
            KeyError::InvalidXpub(format!("expected {} bytes, got {}", EXTENDED_KEY_LEN, data.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Rebuild a key from version bytes and a 74-byte payload
    pub fn from_parts(version: [u8; VERSION_LEN], payload: &[u8; KEY_PAYLOAD_LEN]) -> Self {
        let mut bytes = [0u8; EXTENDED_KEY_LEN];
        bytes[..VERSION_LEN].copy_from_slice(&version);
        bytes[VERSION_LEN..].copy_from_slice(payload);
        Self { bytes }
    }

    pub fn version(&self) -> [u8; VERSION_LEN] {
        let mut version = [0u8; VERSION_LEN];
        version.copy_from_slice(&self.bytes[..VERSION_LEN]);
        version
    }

    /// Depth, parent fingerprint, child number, chain code and key data
    pub fn payload(&self) -> &[u8] {
        &self.bytes[VERSION_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8; EXTENDED_KEY_LEN] {
        &self.bytes
    }

    pub fn to_base58(&self) -> String {
        base58::encode_check(&self.bytes)
    }

    /// Network the key belongs to, judged by its textual prefix
    pub fn network(&self) -> NetworkKind {
        let encoded = self.to_base58();
        match encoded.chars().next() {
            Some(c) if TEST_PREFIXES.contains(c) => NetworkKind::Test,
            _ => NetworkKind::Main,
        }
    }
}

impl std::fmt::Display for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl std::fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExtendedKey({})", self.to_base58())
    }
}

impl std::str::FromStr for ExtendedKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

/// True if `s` starts like an extended public key (`xpub`, `Zpub`, `tpub`, ...)
pub fn looks_like_public_key(s: &str) -> bool {
    has_key_prefix(s, "pub")
}

/// True if `s` starts like an extended private key (`xprv`, `tprv`, ...)
pub fn looks_like_private_key(s: &str) -> bool {
    has_key_prefix(s, "prv")
}

fn has_key_prefix(s: &str, kind: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if KEY_PREFIXES.contains(c) => chars.as_str().starts_with(kind),
        _ => false,
    }
}

/// Parse a master fingerprint: exactly 8 lowercase hex characters
pub fn parse_fingerprint(s: &str) -> Result<Fingerprint, KeyError> {
    let valid = s.len() == 2 * FINGERPRINT_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !valid {
        return Err(KeyError::InvalidFingerprint(s.to_string()));
    }
    let mut fp = [0u8; FINGERPRINT_LEN];
    hex::decode_to_slice(s, &mut fp).map_err(|_| KeyError::InvalidFingerprint(s.to_string()))?;
    Ok(fp)
}

/// Lowercase hex rendering of a fingerprint
pub fn fingerprint_to_hex(fp: &Fingerprint) -> String {
    hex::encode(fp)
}

/// Sort key for fingerprint pairs: the bytes as comma-joined decimals.
///
/// The published lookup index was built with this ordering, so it is kept
/// even though it differs from plain byte order (`[10,..]` sorts before
/// `[9,..]`).
fn pair_order_key(fp: &Fingerprint) -> String {
    fp.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",")
}

/// Lookup hash for a pair of fingerprints: first 4 bytes of SHA-256 over the
/// ordered concatenation. Symmetric in its arguments.
pub fn fingerprint_pair_hash(a: &Fingerprint, b: &Fingerprint) -> [u8; 4] {
    let (first, second) = if pair_order_key(a) < pair_order_key(b) { (a, b) } else { (b, a) };
    let mut data = [0u8; 2 * FINGERPRINT_LEN];
    data[..FINGERPRINT_LEN].copy_from_slice(first);
    data[FINGERPRINT_LEN..].copy_from_slice(second);
    let digest = sha256(&data);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Pair hashes for every unique pair `(i, j)` with `i < j`, in that order
pub fn all_pair_hashes(fingerprints: &[Fingerprint]) -> Vec<[u8; 4]> {
    let mut hashes = Vec::new();
    for (i, a) in fingerprints.iter().enumerate() {
        for b in &fingerprints[i + 1..] {
            hashes.push(fingerprint_pair_hash(a, b));
        }
    }
    hashes
}
