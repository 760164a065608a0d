//! msbackup recover
//!
//! Finding and opening a published backup.
//!
//! # Discovery
//!
//! Two master fingerprints of the wallet give a pair hash. The index service
//! maps that hash to inscription ids, each id is fetched as text and every
//! text that parses as an encrypted descriptor becomes a candidate.
//!
//! # Reconstruction
//!
//! xpubs are added one at a time, typed in or read from a [`KeySource`].
//! Each addition retries decryption of the selected candidate and reports
//! either the recovered descriptor or how many more xpubs are needed.
//!
//! # Example
//!
//! ```ignore
//! use msbackup_recover::{HttpContentSource, HttpIndex, RecoverySession};
//!
//! let index = HttpIndex::new("https://api.multisigbackup.com", timeout)?;
//! let content = HttpContentSource::new("https://ordinals.com", None, timeout)?;
//! let mut session = RecoverySession::new(index, content);
//! session.discover("aabbccdd", "11223344")?;
//! let state = session.add_xpub(&xpub)?;
//! ```

pub mod collaborators;
pub mod envelope;
pub mod http;
pub mod keysource;
pub mod session;

pub use collaborators::{CandidateSource, ContentSource, FetchedContent, InscriptionIndex, KeySource};
pub use http::{inscribe_url, HttpContentSource, HttpIndex};
pub use keysource::SeedKeySource;
pub use session::{Candidate, RecoverySession, RecoveryState};

use msbackup_core::KeyError;
use msbackup_crypt::BackupError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoverError {
    #[error("Please enter two master fingerprints")]
    MissingFingerprints,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(
        "No inscription was found at this xfp pair. Newly confirmed inscriptions \
         take up to 1 minute to be indexed."
    )]
    NoInscriptions,

    #[error("Failed to fetch valid inscription(s) from {0}.")]
    NoValidCandidates(String),

    #[error("Failed to fetch inscription(s) from {0}.")]
    NoFetchedCandidates(String),

    #[error("{service}: {message}")]
    Collaborator { service: String, message: String },

    #[error("Invalid inscription id: {0}")]
    InvalidInscriptionId(String),

    #[error("No encrypted descriptor selected")]
    NothingSelected,

    #[error("No candidate at position {0}")]
    NoSuchCandidate(usize),

    #[error("No derivation path given and none could be suggested")]
    NoDerivationPath,

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl RecoverError {
    pub(crate) fn collaborator(service: impl Into<String>, message: impl ToString) -> Self {
        RecoverError::Collaborator {
            service: service.into(),
            message: message.to_string(),
        }
    }
}
