//! Recovery state machine
//!
//! Discovery turns two fingerprints into candidate backups, at most once per
//! fingerprint pair. Reconstruction reruns decryption of the active backup
//! whenever a candidate is selected or an xpub is added, and always ends in
//! either [`RecoveryState::Recovered`] or [`RecoveryState::AwaitingMoreShares`].

use std::collections::HashMap;

use msbackup_core::{fingerprint_pair_hash, parse_derivation_path, parse_fingerprint, ExtendedKey};
use msbackup_crypt::{decrypt_parsed, CryptoContext, EncryptedDescriptor, PairHash};

use crate::collaborators::{CandidateSource, ContentSource, FetchedContent, InscriptionIndex, KeySource};
use crate::RecoverError;

/// Prefix shown in front of candidates read from raw transactions
const FALLBACK_LABEL: &str = "[testnet4]";

/// Content fetches in flight at once during discovery
const MAX_CONCURRENT_FETCHES: usize = 8;

/// A published backup that parsed successfully
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub source: CandidateSource,
    encrypted: EncryptedDescriptor,
}

impl Candidate {
    pub fn encrypted(&self) -> &EncryptedDescriptor {
        &self.encrypted
    }

    /// Short label: the template head up to its first `)`, then the first
    /// eight characters of the Base64 tail.
    pub fn summary(&self) -> String {
        let parts: Vec<&str> = self.text.split(')').collect();
        let label = if parts.len() < 3 {
            self.text.clone()
        } else {
            let tail = parts[parts.len() - 1];
            let head: String = tail.chars().take(8).collect();
            format!("{}){}...", parts[0], head)
        };
        match self.source {
            CandidateSource::Primary => label,
            CandidateSource::Fallback => format!("{} {}", FALLBACK_LABEL, label),
        }
    }
}

/// Where reconstruction stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
    Recovered {
        /// Full descriptor with a fresh checksum
        descriptor: String,
    },
    AwaitingMoreShares {
        decrypted: usize,
        required: usize,
        needed: usize,
    },
}

impl RecoveryState {
    pub fn message(&self) -> String {
        match self {
            RecoveryState::Recovered { .. } => "Descriptor recovered.".to_string(),
            RecoveryState::AwaitingMoreShares {
                decrypted,
                required,
                needed,
            } => format!(
                "Decrypted {} of {} required shares. Please provide {} more xpub(s).",
                decrypted, required, needed
            ),
        }
    }
}

pub struct RecoverySession<I, C> {
    index: I,
    content: C,
    ctx: CryptoContext,
    discovered: HashMap<PairHash, Vec<Candidate>>,
    candidates: Vec<Candidate>,
    active: Option<EncryptedDescriptor>,
    xpubs: Vec<String>,
}

impl<I: InscriptionIndex, C: ContentSource> RecoverySession<I, C> {
    pub fn new(index: I, content: C) -> Self {
        Self {
            index,
            content,
            ctx: CryptoContext::new(),
            discovered: HashMap::new(),
            candidates: Vec::new(),
            active: None,
            xpubs: Vec::new(),
        }
    }

    /// Look up backups published under two master fingerprints.
    ///
    /// The first candidate becomes the active one. Repeating the lookup for
    /// the same pair (in either order) reuses the earlier result. A failed
    /// lookup leaves no candidate selected.
    pub fn discover(&mut self, xfp_a: &str, xfp_b: &str) -> Result<&[Candidate], RecoverError> {
        self.active = None;
        self.candidates.clear();

        let (xfp_a, xfp_b) = (xfp_a.trim(), xfp_b.trim());
        if xfp_a.is_empty() || xfp_b.is_empty() {
            return Err(RecoverError::MissingFingerprints);
        }
        let pair_hash = fingerprint_pair_hash(&parse_fingerprint(xfp_a)?, &parse_fingerprint(xfp_b)?);

        let candidates = match self.discovered.get(&pair_hash) {
            Some(cached) => {
                log::debug!("Reusing discovery result for this fingerprint pair");
                cached.clone()
            }
            None => {
                let found = self.fetch_candidates(&pair_hash)?;
                self.discovered.insert(pair_hash, found.clone());
                found
            }
        };

        self.active = candidates.first().map(|c| c.encrypted.clone());
        self.candidates = candidates;
        Ok(&self.candidates)
    }

    fn fetch_candidates(&self, pair_hash: &PairHash) -> Result<Vec<Candidate>, RecoverError> {
        let ids = self.index.inscription_ids(pair_hash)?;
        if ids.is_empty() {
            return Err(RecoverError::NoInscriptions);
        }

        let content = &self.content;
        let mut fetched: Vec<Result<Option<FetchedContent>, RecoverError>> = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_CONCURRENT_FETCHES) {
            std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| scope.spawn(move || content.fetch(id)))
                    .collect();
                fetched.extend(handles.into_iter().map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(RecoverError::collaborator(content.service(), "fetch thread panicked"))
                    })
                }));
            });
        }

        let mut candidates = Vec::new();
        let mut failed_to_parse = false;
        let mut first_error = None;
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(Some(content)) => match EncryptedDescriptor::parse(&content.text) {
                    Ok(encrypted) => candidates.push(Candidate {
                        id: id.clone(),
                        text: content.text,
                        source: content.source,
                        encrypted,
                    }),
                    Err(e) => {
                        log::debug!("Inscription {} is not an encrypted descriptor: {}", id, e);
                        failed_to_parse = true;
                    }
                },
                Ok(None) => log::debug!("Inscription {} not found", id),
                Err(e) => {
                    log::warn!("Fetching inscription {} failed: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if candidates.is_empty() {
            if failed_to_parse {
                return Err(RecoverError::NoValidCandidates(self.index.service().to_string()));
            }
            return Err(first_error.unwrap_or_else(|| {
                RecoverError::NoFetchedCandidates(self.content.service().to_string())
            }));
        }
        log::info!("Found {} candidate backup(s) of {} inscription(s)", candidates.len(), ids.len());
        Ok(candidates)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Make a discovered candidate the active backup
    pub fn select(&mut self, position: usize) -> Result<RecoveryState, RecoverError> {
        let candidate = self
            .candidates
            .get(position)
            .ok_or(RecoverError::NoSuchCandidate(position))?;
        self.active = Some(candidate.encrypted.clone());
        self.reconstruct()
    }

    /// Skip discovery and work from pasted encrypted text
    pub fn use_encrypted_text(&mut self, text: &str) -> Result<RecoveryState, RecoverError> {
        if text.trim().is_empty() {
            return Err(msbackup_crypt::BackupError::InvalidInput(
                "Please enter the encrypted descriptor".into(),
            )
            .into());
        }
        self.active = Some(EncryptedDescriptor::parse(text)?);
        self.reconstruct()
    }

    /// Number of xpub inputs worth offering: the largest group threshold
    pub fn required_xpub_slots(&self) -> usize {
        self.active
            .as_ref()
            .map(EncryptedDescriptor::max_required_sigs)
            .unwrap_or(0)
    }

    /// Origin path to ask a signer for, when every standard key agrees
    pub fn suggested_origin_path(&self) -> Option<String> {
        self.active.as_ref()?.suggested_origin_path()
    }

    pub fn xpubs(&self) -> &[String] {
        &self.xpubs
    }

    /// Add one xpub and retry decryption
    pub fn add_xpub(&mut self, xpub: &str) -> Result<RecoveryState, RecoverError> {
        let xpub = xpub.trim();
        ExtendedKey::from_base58(xpub)?;
        if !self.xpubs.iter().any(|known| known == xpub) {
            self.xpubs.push(xpub.to_string());
        }
        self.reconstruct()
    }

    /// Ask a signer for its xpub at `path`, or at the suggested origin path
    pub fn add_from_key_source<K: KeySource + ?Sized>(
        &mut self,
        source: &K,
        path: Option<&str>,
    ) -> Result<RecoveryState, RecoverError> {
        let path = match path {
            Some(path) => path.to_string(),
            None => self
                .suggested_origin_path()
                .ok_or(RecoverError::NoDerivationPath)?,
        };
        let path = parse_derivation_path(&path)?;
        let xpub = source.extended_public_key(&path)?;
        log::info!("Key source exported xpub at {}", path);
        self.add_xpub(&xpub)
    }

    /// Decrypt the active backup with the xpubs collected so far
    pub fn reconstruct(&self) -> Result<RecoveryState, RecoverError> {
        let encrypted = self.active.as_ref().ok_or(RecoverError::NothingSelected)?;
        if self.xpubs.is_empty() {
            let required = encrypted
                .blob()
                .groups
                .iter()
                .map(|g| g.required_sigs)
                .min()
                .unwrap_or(0);
            return Ok(RecoveryState::AwaitingMoreShares {
                decrypted: 0,
                required,
                needed: required,
            });
        }

        let outcome = decrypt_parsed(&self.ctx, encrypted, &self.xpubs)?;
        Ok(match outcome.descriptor_with_checksum() {
            Some(descriptor) => RecoveryState::Recovered { descriptor },
            None => RecoveryState::AwaitingMoreShares {
                decrypted: outcome.decrypted_shares,
                required: outcome.required_shares,
                needed: outcome.shares_needed(),
            },
        })
    }
}
