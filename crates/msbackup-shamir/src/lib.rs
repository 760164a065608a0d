//! msbackup Shamir module
//!
//! Threshold splitting of the per-backup secret, so that any `k` of the `n`
//! key holders of a multisig group can recover it.
//!
//! # Example: split a 128-bit secret 2-of-3
//!
//! ```
//! use msbackup_shamir::{reconstruct_secret, split_secret};
//! use rand::rngs::OsRng;
//!
//! let secret = [0x42u8; 16];
//! let shares = split_secret(&secret, 2, 3, &mut OsRng).unwrap();
//!
//! // Each share is 17 bytes on the wire: 16 y-values then its x-coordinate
//! assert_eq!(shares[0].to_bytes().len(), 17);
//!
//! // Recover with any 2 shares
//! let recovered = reconstruct_secret(&shares[1..]).unwrap();
//! assert_eq!(recovered.as_slice(), &secret);
//! ```

pub mod gf256;
pub mod shamir;

pub use shamir::{reconstruct_secret, split_secret, Share};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShamirError {
    #[error("Invalid threshold: need at least 2")]
    InvalidThreshold,
    #[error("Threshold exceeds share count")]
    ThresholdExceedsShares,
    #[error("Not enough shares to reconstruct")]
    InsufficientShares,
    #[error("Invalid share format: {0}")]
    InvalidShare(String),
}
