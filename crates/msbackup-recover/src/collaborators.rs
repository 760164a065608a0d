//! External services a recovery depends on
//!
//! All calls are blocking. Discovery fans content fetches out over scoped
//! threads, so the index and content traits require `Sync`.

use bitcoin::bip32::DerivationPath;

use msbackup_crypt::PairHash;

use crate::RecoverError;

/// Maps a fingerprint pair hash to inscription ids
pub trait InscriptionIndex: Sync {
    /// Name used in error messages (usually the base URL)
    fn service(&self) -> &str;

    fn inscription_ids(&self, pair_hash: &PairHash) -> Result<Vec<String>, RecoverError>;
}

/// Where a candidate's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// The content service returned it directly
    Primary,
    /// Extracted from the raw reveal transaction
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub text: String,
    pub source: CandidateSource,
}

/// Fetches inscription bodies by id
pub trait ContentSource: Sync {
    fn service(&self) -> &str;

    /// `Ok(None)` when no source knows the id
    fn fetch(&self, inscription_id: &str) -> Result<Option<FetchedContent>, RecoverError>;
}

/// A signer that can export public key material, such as a hardware wallet
pub trait KeySource {
    /// Master fingerprint as 8 lowercase hex characters
    fn master_fingerprint(&self) -> Result<String, RecoverError>;

    /// Base58check extended public key at `path`
    fn extended_public_key(&self, path: &DerivationPath) -> Result<String, RecoverError>;
}
