//! Core Shamir's Secret Sharing implementation
//!
//! Split a secret into N shares where any M can reconstruct it. Each share
//! carries its own random, non-zero x-coordinate; on the wire a share is the
//! y-bytes followed by that coordinate.

use rand::seq::index;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::gf256::{lagrange_interpolate, poly_eval};
use crate::ShamirError;

/// A single share of a secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// Evaluation point (never 0, which would be the secret itself)
    pub x: u8,
    /// Polynomial values, one per secret byte
    pub y: Vec<u8>,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("x", &self.x)
            .field("y", &"[REDACTED]")
            .finish()
    }
}

impl Share {
    /// Serialized form: `y ‖ x`
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(self.y.len() + 1));
        out.extend_from_slice(&self.y);
        out.push(self.x);
        out
    }

    /// Parse a serialized share
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShamirError> {
        match bytes.split_last() {
            Some((&x, y)) if !y.is_empty() => {
                if x == 0 {
                    return Err(ShamirError::InvalidShare("x-coordinate is zero".into()));
                }
                Ok(Self { x, y: y.to_vec() })
            }
            _ => Err(ShamirError::InvalidShare(format!(
                "share too short ({} bytes)",
                bytes.len()
            ))),
        }
    }
}

/// Split a secret into shares using Shamir's Secret Sharing
///
/// # Arguments
/// * `secret` - The secret bytes to split
/// * `threshold` - Minimum shares needed to reconstruct (M)
/// * `total` - Total shares to generate (N)
/// * `rng` - Source of the polynomial coefficients and x-coordinates
///
/// # Returns
/// Vector of N shares, any M of which can reconstruct the secret
pub fn split_secret<R>(
    secret: &[u8],
    threshold: u8,
    total: u8,
    rng: &mut R,
) -> Result<Vec<Share>, ShamirError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    if threshold < 2 {
        return Err(ShamirError::InvalidThreshold);
    }
    if threshold > total {
        return Err(ShamirError::ThresholdExceedsShares);
    }
    if secret.is_empty() {
        return Err(ShamirError::InvalidShare("Empty secret".into()));
    }

    // Distinct x-coordinates drawn from 1..=255
    let mut shares: Vec<Share> = index::sample(&mut *rng, 255, total as usize)
        .into_iter()
        .map(|i| Share {
            x: (i + 1) as u8,
            y: Vec::with_capacity(secret.len()),
        })
        .collect();

    // p(x) = secret + c1*x + ... + c_{t-1}*x^{t-1}, one polynomial per byte
    let mut coefficients = Zeroizing::new(vec![0u8; threshold as usize]);
    for &secret_byte in secret {
        coefficients[0] = secret_byte;
        rng.fill_bytes(&mut coefficients[1..]);
        for share in &mut shares {
            share.y.push(poly_eval(&coefficients, share.x));
        }
    }

    Ok(shares)
}

/// Reconstruct a secret from shares
///
/// Any set of at least threshold shares works; with fewer the result is
/// unrelated to the secret, so callers must know the threshold.
pub fn reconstruct_secret(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    let first = shares.first().ok_or(ShamirError::InsufficientShares)?;
    if shares.len() < 2 {
        return Err(ShamirError::InsufficientShares);
    }

    let secret_len = first.y.len();
    if shares.iter().any(|s| s.y.len() != secret_len) {
        return Err(ShamirError::InvalidShare(
            "Shares have different lengths".into(),
        ));
    }
    if shares.iter().any(|s| s.x == 0) {
        return Err(ShamirError::InvalidShare("x-coordinate is zero".into()));
    }

    let mut xs: Vec<u8> = shares.iter().map(|s| s.x).collect();
    xs.sort_unstable();
    xs.dedup();
    if xs.len() != shares.len() {
        return Err(ShamirError::InvalidShare("Duplicate share indices".into()));
    }

    let mut secret = Zeroizing::new(Vec::with_capacity(secret_len));
    let mut points = vec![(0u8, 0u8); shares.len()];
    for byte_idx in 0..secret_len {
        for (point, share) in points.iter_mut().zip(shares) {
            *point = (share.x, share.y[byte_idx]);
        }
        secret.push(lagrange_interpolate(&points));
    }
    points.fill((0, 0));

    Ok(secret)
}
