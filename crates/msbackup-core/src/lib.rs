//! msbackup core
//!
//! Text and byte handling for encrypted multisig descriptor backups.
//!
//! # Descriptor codec
//!
//! A wallet descriptor such as
//! `wsh(sortedmulti(2,[aabbccdd/48h/0h/0h/2h]xpub.../<0;1>/*,...))` is split
//! into a stripped template, which is published as-is, and the key material
//! (fingerprints and extended keys), which is encrypted. The same template
//! later drives reinsertion of the decrypted material.
//!
//! # Checksum
//!
//! Recovered descriptors get a fresh Bitcoin Core descriptor checksum.

pub mod bytes;
pub mod checksum;
pub mod descriptor;
pub mod keys;
pub mod path;

pub use checksum::{descriptor_checksum, verify_checksum, with_checksum};
pub use descriptor::{split_encrypted, strip_descriptor, Descriptor, DescriptorError, MultisigGroup};
pub use keys::{
    fingerprint_pair_hash, parse_fingerprint, ExtendedKey, Fingerprint, KeyError,
};
pub use path::parse_derivation_path;

/// Network of the keys in a backup (re-exported from `bitcoin`)
pub use bitcoin::NetworkKind;
