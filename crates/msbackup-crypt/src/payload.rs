//! Encrypted key material
//!
//! The payload is every fingerprint (4 bytes each) followed by every xpub
//! without its version bytes (74 bytes each), in group order, under a
//! ChaCha20 keystream. There is no tag: a wrong key can only come from a
//! wrong secret, and the sealed shares already authenticate the secret.

use msbackup_core::keys::{FINGERPRINT_LEN, KEY_PAYLOAD_LEN};
use msbackup_core::{Descriptor, ExtendedKey, Fingerprint};

use crate::context::CryptoContext;
use crate::BackupError;

/// Payload length for the given totals
pub fn payload_len(total_xfps: usize, total_xpubs: usize) -> usize {
    FINGERPRINT_LEN * total_xfps + KEY_PAYLOAD_LEN * total_xpubs
}

/// Fingerprints and version-less xpubs of a whole descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub fingerprints: Vec<Fingerprint>,
    pub xpub_payloads: Vec<[u8; KEY_PAYLOAD_LEN]>,
}

impl KeyMaterial {
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        let xpub_payloads = descriptor
            .xpubs()
            .map(|xpub| {
                let mut payload = [0u8; KEY_PAYLOAD_LEN];
                payload.copy_from_slice(xpub.payload());
                payload
            })
            .collect();
        Self {
            fingerprints: descriptor.fingerprints().copied().collect(),
            xpub_payloads,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload_len(
            self.fingerprints.len(),
            self.xpub_payloads.len(),
        ));
        for fp in &self.fingerprints {
            out.extend_from_slice(fp);
        }
        for payload in &self.xpub_payloads {
            out.extend_from_slice(payload);
        }
        out
    }

    /// Split plaintext bytes back into fingerprints and xpub payloads
    pub fn from_bytes(
        bytes: &[u8],
        total_xfps: usize,
        total_xpubs: usize,
    ) -> Result<Self, BackupError> {
        if bytes.len() != payload_len(total_xfps, total_xpubs) {
            return Err(BackupError::InvalidInput(format!(
                "key material is {} bytes, expected {}",
                bytes.len(),
                payload_len(total_xfps, total_xpubs)
            )));
        }
        let (fp_bytes, xpub_bytes) = bytes.split_at(FINGERPRINT_LEN * total_xfps);
        let fingerprints = fp_bytes
            .chunks_exact(FINGERPRINT_LEN)
            .map(|chunk| {
                let mut fp = [0u8; FINGERPRINT_LEN];
                fp.copy_from_slice(chunk);
                fp
            })
            .collect();
        let xpub_payloads = xpub_bytes
            .chunks_exact(KEY_PAYLOAD_LEN)
            .map(|chunk| {
                let mut payload = [0u8; KEY_PAYLOAD_LEN];
                payload.copy_from_slice(chunk);
                payload
            })
            .collect();
        Ok(Self {
            fingerprints,
            xpub_payloads,
        })
    }

    /// Base58check xpubs, all under the same version bytes
    pub fn xpub_strings(&self, version: [u8; 4]) -> Vec<String> {
        self.xpub_payloads
            .iter()
            .map(|payload| ExtendedKey::from_parts(version, payload).to_base58())
            .collect()
    }
}

/// Encrypt key material under the secret-derived key
pub fn encrypt_payload<R>(ctx: &CryptoContext<R>, key: &[u8; 32], material: &KeyMaterial) -> Vec<u8> {
    let mut data = material.to_bytes();
    ctx.apply_keystream(key, &mut data);
    data
}

/// Decrypt a payload and split it per the descriptor totals
pub fn decrypt_payload<R>(
    ctx: &CryptoContext<R>,
    key: &[u8; 32],
    ciphertext: &[u8],
    total_xfps: usize,
    total_xpubs: usize,
) -> Result<KeyMaterial, BackupError> {
    let mut data = ciphertext.to_vec();
    ctx.apply_keystream(key, &mut data);
    KeyMaterial::from_bytes(&data, total_xfps, total_xpubs)
}
