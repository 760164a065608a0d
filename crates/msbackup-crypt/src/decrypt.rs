//! Descriptor decryption with share progress
//!
//! Every supplied xpub is tried against every sealed share of every group.
//! A share that does not open is simply not ours; only structural problems
//! are errors. When no group reaches its threshold the outcome still reports
//! how far the closest group got.

use msbackup_core::keys::XPUB_VERSION;
use msbackup_core::{with_checksum, ExtendedKey};

use crate::blob::EncryptedDescriptor;
use crate::context::CryptoContext;
use crate::payload::decrypt_payload;
use crate::share::{combine_shares, open_share};
use crate::BackupError;

/// Share counts and, once enough shares opened, the descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOutcome {
    pub decrypted_shares: usize,
    pub required_shares: usize,
    /// Reconstructed descriptor without checksum
    pub descriptor: Option<String>,
}

impl DecryptOutcome {
    pub fn is_complete(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Additional xpubs needed before the descriptor can be rebuilt
    pub fn shares_needed(&self) -> usize {
        if self.is_complete() {
            0
        } else {
            self.required_shares.saturating_sub(self.decrypted_shares).max(1)
        }
    }

    pub fn descriptor_with_checksum(&self) -> Option<String> {
        self.descriptor.as_deref().map(with_checksum)
    }

    /// Human readable progress line
    pub fn message(&self) -> String {
        let mut message = format!(
            "Decrypted {} of {} required shares.",
            self.decrypted_shares, self.required_shares
        );
        if !self.is_complete() {
            message.push_str(&format!(
                " Please provide {} more xpub(s).",
                self.shares_needed()
            ));
        }
        message
    }
}

/// Decrypt encrypted text with whatever xpubs are at hand
pub fn decrypt_descriptor<R, S: AsRef<str>>(
    ctx: &CryptoContext<R>,
    text: &str,
    xpubs: &[S],
) -> Result<DecryptOutcome, BackupError> {
    let encrypted = EncryptedDescriptor::parse(text)?;
    decrypt_parsed(ctx, &encrypted, xpubs)
}

/// Decrypt with the default context
pub fn decrypt<S: AsRef<str>>(text: &str, xpubs: &[S]) -> Result<DecryptOutcome, BackupError> {
    decrypt_descriptor(&CryptoContext::new(), text, xpubs)
}

/// Decrypt an already parsed backup. Empty xpub strings are skipped; the
/// rebuilt xpubs take the version bytes of the last key supplied.
pub fn decrypt_parsed<R, S: AsRef<str>>(
    ctx: &CryptoContext<R>,
    encrypted: &EncryptedDescriptor,
    xpubs: &[S],
) -> Result<DecryptOutcome, BackupError> {
    let mut keys = Vec::with_capacity(xpubs.len());
    let mut version = XPUB_VERSION;
    for xpub in xpubs {
        let xpub = xpub.as_ref().trim();
        if xpub.is_empty() {
            continue;
        }
        let key = ExtendedKey::from_base58(xpub)?;
        version = key.version();
        keys.push(key);
    }
    if keys.is_empty() {
        return Err(BackupError::InvalidInput("No xpubs provided".into()));
    }

    let blob = encrypted.blob();
    let mut index = 0;
    let mut secret = None;
    let mut progress: Option<(usize, usize)> = None;
    for (n, group) in blob.groups.iter().enumerate() {
        let mut opened = Vec::new();
        for sealed in &group.sealed {
            let share = keys
                .iter()
                .find_map(|key| open_share(ctx, group.kind, sealed, key, &blob.payload, index));
            opened.extend(share);
            index += 1;
        }
        log::debug!(
            "Group {}: opened {} of {} shares, {} required",
            n,
            opened.len(),
            group.sealed.len(),
            group.required_sigs
        );

        if secret.is_some() {
            continue;
        }
        let counts = (opened.len(), group.required_sigs);
        if opened.len() >= group.required_sigs {
            secret = Some(combine_shares(
                &opened[..group.required_sigs],
                group.required_sigs,
            )?);
            progress = Some(counts);
        } else if progress.map_or(true, |best| shortfall(counts) < shortfall(best)) {
            progress = Some(counts);
        }
    }

    let (decrypted_shares, required_shares) = progress.unwrap_or((0, 0));
    let descriptor = match secret {
        Some(secret) => {
            let key = ctx.derive_key(&secret[..])?;
            let material = decrypt_payload(
                ctx,
                &key,
                &blob.payload,
                encrypted.total_fingerprints(),
                encrypted.total_xpubs(),
            )?;
            let xpub_strings = material.xpub_strings(version);
            Some(encrypted.template().reinsert(&material.fingerprints, &xpub_strings))
        }
        None => None,
    };

    log::info!(
        "Decrypted {} of {} required shares{}",
        decrypted_shares,
        required_shares,
        if descriptor.is_some() { ", descriptor recovered" } else { "" }
    );

    Ok(DecryptOutcome {
        decrypted_shares,
        required_shares,
        descriptor,
    })
}

fn shortfall((have, need): (usize, usize)) -> usize {
    need.saturating_sub(have)
}
