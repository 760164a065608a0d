//! msbackup crypt
//!
//! Threshold encryption of multisig wallet descriptors.
//!
//! # Encrypted text
//!
//! ```text
//! wsh(sortedmulti(2,[48h/0h/0h/2h]<0;1>/*,...))<unpadded Base64 blob>
//! ```
//!
//! The template in front is the descriptor with every fingerprint and key
//! removed. The blob holds one sealed share of a random secret per key, the
//! key material encrypted under that secret, and optional 4-byte hashes of
//! every fingerprint pair for index lookup.
//!
//! # Recovery
//!
//! Each share is sealed under SHA-256 of an xpub, so whoever holds enough of
//! a group's xpubs opens enough shares to rebuild the secret, decrypt the key
//! material and reinsert it into the template.

pub mod blob;
pub mod context;
pub mod decrypt;
pub mod encrypt;
pub mod payload;
pub mod share;

pub use blob::{parse_encrypted_descriptor, EncryptedBlob, EncryptedDescriptor, GroupShares, PairHash};
pub use context::{CryptoContext, SymmetricKey};
pub use decrypt::{decrypt, decrypt_descriptor, decrypt_parsed, DecryptOutcome};
pub use encrypt::{encrypt, encrypt_descriptor, EncryptOutput};
pub use share::{Share, ShareKind};

use msbackup_core::{DescriptorError, KeyError};
use msbackup_shamir::ShamirError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("Secret sharing failed: {0}")]
    Shamir(#[from] ShamirError),
    #[error("Secure cryptography unavailable: {0}")]
    CryptoUnavailable(String),
}
