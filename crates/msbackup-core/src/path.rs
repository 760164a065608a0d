//! Derivation path grammar
//!
//! Descriptor text is kept verbatim through a backup, so paths are only
//! validated here, never normalised. Hardened steps may be written `h`, `H`
//! or `'`.

use bitcoin::bip32::DerivationPath;
use std::str::FromStr;

use crate::keys::KeyError;

/// BIP-32 hardened index offset; plain indices must stay below it
const HARDENED_OFFSET: u64 = 1 << 31;

/// Purposes of the standard derivation schemes (BIP-44/45/48/49/84/86)
pub const STANDARD_PURPOSES: [u32; 6] = [44, 45, 48, 49, 84, 86];

fn strip_hardened(step: &str) -> &str {
    step.strip_suffix(['h', 'H', '\'']).unwrap_or(step)
}

fn is_index(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && s.parse::<u64>().map(|n| n < HARDENED_OFFSET).unwrap_or(false)
}

/// `<0;1>`-style multipath step: two or more indices
fn is_multipath(s: &str) -> bool {
    let Some(inner) = s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) else {
        return false;
    };
    let alternatives: Vec<&str> = inner.split(';').collect();
    alternatives.len() >= 2 && alternatives.iter().all(|a| is_index(strip_hardened(a)))
}

fn is_key_step(step: &str) -> bool {
    if is_multipath(step) {
        return true;
    }
    let bare = strip_hardened(step);
    bare == "*" || is_index(bare)
}

/// Steps of a key origin (`48h/0h/0h/2h`): plain or hardened indices only
pub fn is_origin_path(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(|step| is_index(strip_hardened(step)))
}

/// Steps following a key (`0/*`, `<0;1>/*`), written without the leading `/`
pub fn is_key_suffix(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(is_key_step)
}

/// True if the first step of `path` is one of [`STANDARD_PURPOSES`]
pub fn has_standard_purpose(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or_default();
    strip_hardened(first)
        .parse::<u32>()
        .map(|purpose| STANDARD_PURPOSES.contains(&purpose))
        .unwrap_or(false)
}

/// Suggest the path to request from a key holder's device.
///
/// Only standard-purpose paths are considered; a suggestion is made when
/// all of them agree.
pub fn suggest_origin_path<'a, I>(paths: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut standard = paths.into_iter().filter(|p| has_standard_purpose(p));
    let first = standard.next()?;
    if standard.all(|p| p == first) {
        Some(first.to_string())
    } else {
        None
    }
}

/// Parse a user supplied derivation path such as `48h/0h/0h/2h` or
/// `m/48'/0'/0'/2'`.
pub fn parse_derivation_path(input: &str) -> Result<DerivationPath, KeyError> {
    let trimmed = input.trim();
    let relative = trimmed.strip_prefix("m/").unwrap_or(trimmed);
    if !is_origin_path(relative) {
        return Err(KeyError::InvalidDerivationPath(input.to_string()));
    }
    let bip32 = format!("m/{}", relative.replace(['h', 'H'], "'"));
    DerivationPath::from_str(&bip32).map_err(|e| KeyError::InvalidDerivationPath(e.to_string()))
}
