//! End-to-end recovery: publish a backup to in-memory collaborators, find it
//! again by two master fingerprints and rebuild the descriptor from xpubs
//! and a mnemonic key source.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use msbackup_crypt::{encrypt, parse_encrypted_descriptor, PairHash};
use msbackup_recover::{
    CandidateSource, ContentSource, FetchedContent, InscriptionIndex, KeySource, RecoverError,
    RecoverySession, RecoveryState, SeedKeySource,
};

// ============================================================================
// In-memory collaborators
// ============================================================================

/// Plays both the lookup index and the content server
#[derive(Default)]
struct Board {
    by_pair: HashMap<PairHash, Vec<String>>,
    content: HashMap<String, FetchedContent>,
    lookups: Mutex<usize>,
}

impl Board {
    /// Publish `text` under every pair hash it carries
    fn inscribe(&mut self, id: &str, text: &str, source: CandidateSource) {
        let parsed = parse_encrypted_descriptor(text).unwrap();
        for hash in parsed.blob().pair_hashes.iter().flatten() {
            self.by_pair.entry(*hash).or_default().push(id.to_string());
        }
        self.content.insert(
            id.to_string(),
            FetchedContent {
                text: text.to_string(),
                source,
            },
        );
    }

    /// An inscription that is not a backup, indexed under another one's hashes
    fn inscribe_noise(&mut self, id: &str, beside: &str, text: &str) {
        let hashes: Vec<PairHash> = self
            .by_pair
            .iter()
            .filter(|(_, ids)| ids.iter().any(|i| i == beside))
            .map(|(hash, _)| *hash)
            .collect();
        for hash in hashes {
            self.by_pair.entry(hash).or_default().push(id.to_string());
        }
        self.content.insert(
            id.to_string(),
            FetchedContent {
                text: text.to_string(),
                source: CandidateSource::Primary,
            },
        );
    }
}

impl InscriptionIndex for Board {
    fn service(&self) -> &str {
        "board-index"
    }

    fn inscription_ids(&self, pair_hash: &PairHash) -> Result<Vec<String>, RecoverError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.by_pair.get(pair_hash).cloned().unwrap_or_default())
    }
}

impl ContentSource for Board {
    fn service(&self) -> &str {
        "board-content"
    }

    fn fetch(&self, inscription_id: &str) -> Result<Option<FetchedContent>, RecoverError> {
        Ok(self.content.get(inscription_id).cloned())
    }
}

/// Shares one `Board` between the index and content roles
struct Shared<'a>(&'a Board);

impl InscriptionIndex for Shared<'_> {
    fn service(&self) -> &str {
        InscriptionIndex::service(self.0)
    }

    fn inscription_ids(&self, pair_hash: &PairHash) -> Result<Vec<String>, RecoverError> {
        self.0.inscription_ids(pair_hash)
    }
}

impl ContentSource for Shared<'_> {
    fn service(&self) -> &str {
        ContentSource::service(self.0)
    }

    fn fetch(&self, inscription_id: &str) -> Result<Option<FetchedContent>, RecoverError> {
        self.0.fetch(inscription_id)
    }
}

// ============================================================================
// Wallet fixture
// ============================================================================

const MNEMONICS: [&str; 3] = [
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
    "legal winner thank year wave sausage worth useful legal winner thank yellow",
    "letter advice cage absurd amount doctor acoustic avoid letter advice cage above",
];

struct Signer {
    fingerprint: String,
    xpub: String,
}

fn signer(words: &str) -> Signer {
    let secp = Secp256k1::new();
    let seed = Mnemonic::parse(words).unwrap().to_seed("");
    let master = Xpriv::new_master(Network::Bitcoin, &seed).unwrap();
    let path = DerivationPath::from_str("m/48'/0'/0'/2'").unwrap();
    let account = master.derive_priv(&secp, &path).unwrap();
    Signer {
        fingerprint: master.fingerprint(&secp).to_string(),
        xpub: Xpub::from_priv(&secp, &account).to_string(),
    }
}

fn wallet() -> (String, Vec<Signer>) {
    let signers: Vec<Signer> = MNEMONICS.iter().map(|w| signer(w)).collect();
    let keys: Vec<String> = signers
        .iter()
        .map(|s| format!("[{}/48h/0h/0h/2h]{}/<0;1>/*", s.fingerprint, s.xpub))
        .collect();
    (format!("wsh(sortedmulti(2,{}))", keys.join(",")), signers)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_discover_then_add_xpubs() {
    let (descriptor, signers) = wallet();
    let mut board = Board::default();
    let published = encrypt(&descriptor).unwrap().encrypted_text;
    board.inscribe("aaaai0", &published, CandidateSource::Primary);

    let mut session = RecoverySession::new(Shared(&board), Shared(&board));
    let candidates = session
        .discover(&signers[2].fingerprint, &signers[0].fingerprint)
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "aaaai0");
    assert_eq!(session.required_xpub_slots(), 2);
    assert_eq!(session.suggested_origin_path().as_deref(), Some("48h/0h/0h/2h"));

    let state = session.add_xpub(&signers[1].xpub).unwrap();
    assert_eq!(
        state,
        RecoveryState::AwaitingMoreShares {
            decrypted: 1,
            required: 2,
            needed: 1
        }
    );

    let state = session.add_xpub(&signers[2].xpub).unwrap();
    let RecoveryState::Recovered { descriptor: recovered } = state else {
        panic!("expected recovery, got {:?}", state);
    };
    assert!(recovered.starts_with(&format!("{}#", descriptor)));
}

#[test]
fn test_key_source_supplies_the_second_xpub() {
    let (descriptor, signers) = wallet();
    let mut board = Board::default();
    board.inscribe("bbbbi0", &encrypt(&descriptor).unwrap().encrypted_text, CandidateSource::Primary);

    let mut session = RecoverySession::new(Shared(&board), Shared(&board));
    session
        .discover(&signers[0].fingerprint, &signers[1].fingerprint)
        .unwrap();
    session.add_xpub(&signers[0].xpub).unwrap();

    let device = SeedKeySource::from_mnemonic(MNEMONICS[1], "", Network::Bitcoin).unwrap();
    assert_eq!(device.master_fingerprint().unwrap(), signers[1].fingerprint);

    // No path given: the backup's own origin path is used
    let state = session.add_from_key_source(&device, None).unwrap();
    assert!(matches!(state, RecoveryState::Recovered { .. }));
}

#[test]
fn test_lookup_is_cached_per_pair() {
    let (descriptor, signers) = wallet();
    let mut board = Board::default();
    board.inscribe("cccci0", &encrypt(&descriptor).unwrap().encrypted_text, CandidateSource::Primary);

    let mut session = RecoverySession::new(Shared(&board), Shared(&board));
    session.discover(&signers[0].fingerprint, &signers[1].fingerprint).unwrap();
    session.discover(&signers[1].fingerprint, &signers[0].fingerprint).unwrap();
    assert_eq!(*board.lookups.lock().unwrap(), 1);

    session.discover(&signers[1].fingerprint, &signers[2].fingerprint).unwrap();
    assert_eq!(*board.lookups.lock().unwrap(), 2);
}

#[test]
fn test_candidates_keep_index_order_and_skip_noise() {
    let (descriptor, signers) = wallet();
    let mut board = Board::default();
    let first = encrypt(&descriptor).unwrap().encrypted_text;
    let second = encrypt(&descriptor).unwrap().encrypted_text;
    board.inscribe("dddd0i0", &first, CandidateSource::Primary);
    board.inscribe_noise("dddd1i0", "dddd0i0", "gm");
    board.inscribe("dddd2i0", &second, CandidateSource::Fallback);

    let mut session = RecoverySession::new(Shared(&board), Shared(&board));
    let candidates = session
        .discover(&signers[0].fingerprint, &signers[2].fingerprint)
        .unwrap();
    let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["dddd0i0", "dddd2i0"]);
    let summary = candidates[1].summary();
    assert!(summary.starts_with("[testnet4] wsh(sortedmulti(2,[48h/0h/0h/2h]<0;1>/*,"));
    assert!(summary.ends_with("..."));
    assert!(candidates[0].summary().starts_with("wsh("));

    // Both candidates encrypt the same wallet under different secrets
    session.select(1).unwrap();
    session.add_xpub(&signers[0].xpub).unwrap();
    let state = session.add_xpub(&signers[1].xpub).unwrap();
    assert!(matches!(state, RecoveryState::Recovered { .. }));
    assert!(matches!(session.select(2), Err(RecoverError::NoSuchCandidate(2))));
}

#[test]
fn test_unknown_pair_and_bad_input() {
    let (_, signers) = wallet();
    let board = Board::default();
    let mut session = RecoverySession::new(Shared(&board), Shared(&board));

    assert!(matches!(
        session.discover(&signers[0].fingerprint, &signers[1].fingerprint),
        Err(RecoverError::NoInscriptions)
    ));
    assert!(matches!(
        session.discover("", &signers[1].fingerprint),
        Err(RecoverError::MissingFingerprints)
    ));
    assert!(matches!(
        session.discover("AABBCCDD", &signers[1].fingerprint),
        Err(RecoverError::Key(_))
    ));
    assert!(matches!(session.reconstruct(), Err(RecoverError::NothingSelected)));
}

#[test]
fn test_pasted_text_skips_discovery() {
    let (descriptor, signers) = wallet();
    let board = Board::default();
    let text = encrypt(&descriptor).unwrap().encrypted_text;

    let mut session = RecoverySession::new(Shared(&board), Shared(&board));
    let state = session.use_encrypted_text(&text).unwrap();
    assert_eq!(
        state.message(),
        "Decrypted 0 of 2 required shares. Please provide 2 more xpub(s)."
    );
    session.add_xpub(&signers[1].xpub).unwrap();
    session.add_xpub(&signers[1].xpub).unwrap();
    assert_eq!(session.xpubs().len(), 1);

    let state = session.add_xpub(&signers[0].xpub).unwrap();
    assert_eq!(state.message(), "Descriptor recovered.");
    assert_eq!(*board.lookups.lock().unwrap(), 0);
}
