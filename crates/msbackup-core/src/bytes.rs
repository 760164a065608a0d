//! Byte-level helpers shared by the codec and cipher layers.
//!
//! Everything here is a pure function. The only fallible primitives are the
//! text decoders and HKDF, whose errors the callers map into their own types.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of an HKDF-derived key (256 bits)
pub const DERIVED_KEY_LEN: usize = 32;

/// Standard alphabet, no padding on encode, padding optional on decode.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encode bytes as lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string (either case)
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

/// Encode bytes as unpadded Base64
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode Base64, with or without trailing `=` padding
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(s)
}

/// True for characters of the standard Base64 alphabet (padding excluded)
pub fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

/// Big-endian encoding of `n` using the fewest bytes that hold it.
///
/// Zero encodes to an empty vector.
pub fn minimal_be_bytes(n: usize) -> Vec<u8> {
    let bits = (usize::BITS - n.leading_zeros()) as usize;
    let width = bits.div_ceil(8);
    let be = n.to_be_bytes();
    be[be.len() - width..].to_vec()
}

/// Concatenate byte slices in order
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Derive a 256-bit key from entropy of any length.
///
/// HKDF-SHA256 with an empty salt and empty info.
pub fn hkdf_sha256(entropy: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, hkdf::InvalidLength> {
    let hk = Hkdf::<Sha256>::new(None, entropy);
    let mut okm = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    hk.expand(&[], &mut okm[..])?;
    Ok(okm)
}
