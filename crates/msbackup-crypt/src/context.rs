//! Cryptographic capabilities
//!
//! Every primitive the engine uses goes through a [`CryptoContext`]: the
//! random source for the backup secret and Shamir coefficients, SHA-256,
//! HKDF, the ChaCha20-Poly1305 AEAD that seals shares and the ChaCha20
//! stream that covers the key material. Production code uses the operating
//! system RNG; tests pass a seeded one.
//!
//! # Nonces
//!
//! Both ciphers run with an all-zero 96-bit nonce. Every AEAD key is derived
//! from (xpub, payload ciphertext, share index) and every stream key from a
//! fresh secret, so no key is ever used twice.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use msbackup_core::bytes::{concat, hkdf_sha256, sha256, DERIVED_KEY_LEN};

use crate::share::SECRET_LEN;
use crate::BackupError;

/// Nonce length for both ChaCha20 variants
const NONCE_LEN: usize = 12;

/// 256-bit symmetric key
pub type SymmetricKey = Zeroizing<[u8; DERIVED_KEY_LEN]>;

/// Randomness plus the fixed primitive suite
pub struct CryptoContext<R = OsRng> {
    rng: R,
}

impl CryptoContext<OsRng> {
    /// Context backed by the operating system RNG
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for CryptoContext<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CryptoContext<R> {
    /// SHA-256 over the concatenation of `parts`
    pub fn sha256(&self, parts: &[&[u8]]) -> [u8; 32] {
        sha256(&concat(parts))
    }

    /// HKDF-SHA256 (empty salt and info) from the backup secret
    pub fn derive_key(&self, secret: &[u8]) -> Result<SymmetricKey, BackupError> {
        hkdf_sha256(secret).map_err(|e| BackupError::CryptoUnavailable(e.to_string()))
    }

    /// ChaCha20-Poly1305 encrypt; output is ciphertext followed by the tag
    pub fn seal(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, BackupError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .encrypt(Nonce::from_slice(&[0u8; NONCE_LEN]), plaintext)
            .map_err(|e| BackupError::CryptoUnavailable(format!("AEAD encryption failed: {}", e)))
    }

    /// ChaCha20-Poly1305 decrypt. `None` when the tag does not verify.
    pub fn open(&self, key: &[u8; 32], sealed: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .decrypt(Nonce::from_slice(&[0u8; NONCE_LEN]), sealed)
            .ok()
            .map(Zeroizing::new)
    }

    /// XOR `data` with the ChaCha20 keystream (block counter starts at 0).
    /// Encryption and decryption are the same call.
    pub fn apply_keystream(&self, key: &[u8; 32], data: &mut [u8]) {
        let mut cipher = ChaCha20::new(
            chacha20::Key::from_slice(key),
            chacha20::Nonce::from_slice(&[0u8; NONCE_LEN]),
        );
        cipher.apply_keystream(data);
    }
}

impl<R: RngCore + CryptoRng> CryptoContext<R> {
    /// Context over a caller supplied RNG
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Draw a fresh backup secret
    pub fn random_secret(&mut self) -> Result<Zeroizing<[u8; SECRET_LEN]>, BackupError> {
        let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
        self.rng
            .try_fill_bytes(&mut secret[..])
            .map_err(|e| BackupError::CryptoUnavailable(e.to_string()))?;
        Ok(secret)
    }

    pub(crate) fn rng(&mut self) -> &mut R {
        &mut self.rng
    }
}
