//! Software key source from a BIP-39 mnemonic

use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::Network;
use zeroize::Zeroize;

use crate::collaborators::KeySource;
use crate::RecoverError;

const SERVICE: &str = "seed key source";

/// Answers like a hardware signer, from a seed held in memory
pub struct SeedKeySource {
    master: Xpriv,
    secp: Secp256k1<All>,
}

impl SeedKeySource {
    pub fn from_mnemonic(
        words: &str,
        passphrase: &str,
        network: Network,
    ) -> Result<Self, RecoverError> {
        let mnemonic = Mnemonic::parse_in(Language::English, words)
            .map_err(|e| RecoverError::collaborator(SERVICE, format!("invalid mnemonic: {}", e)))?;
        let mut seed = mnemonic.to_seed(passphrase);
        let master = Xpriv::new_master(network, &seed);
        seed.zeroize();
        Ok(Self {
            master: master.map_err(|e| RecoverError::collaborator(SERVICE, e))?,
            secp: Secp256k1::new(),
        })
    }
}

impl std::fmt::Debug for SeedKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedKeySource")
            .field("master", &"[REDACTED]")
            .finish()
    }
}

impl KeySource for SeedKeySource {
    fn master_fingerprint(&self) -> Result<String, RecoverError> {
        Ok(self.master.fingerprint(&self.secp).to_string())
    }

    fn extended_public_key(&self, path: &DerivationPath) -> Result<String, RecoverError> {
        let child = self
            .master
            .derive_priv(&self.secp, path)
            .map_err(|e| RecoverError::collaborator(SERVICE, e))?;
        Ok(Xpub::from_priv(&self.secp, &child).to_string())
    }
}
