//! HTTP collaborators
//!
//! - Index: `GET {index}/inscriptionIds/{pair hash hex}` returning
//!   `{"inscriptionIds": [...]}`
//! - Content: `GET {ord}/content/{id}` returning the text body
//! - Fallback: `GET {explorer}/tx/{txid}/hex`, then the envelope is read from
//!   the raw transaction. Used where the ord server does not index the
//!   network yet.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use msbackup_core::bytes::to_hex;
use msbackup_core::NetworkKind;
use msbackup_crypt::PairHash;

use crate::collaborators::{CandidateSource, ContentSource, FetchedContent, InscriptionIndex};
use crate::envelope::{inscription_text, parse_inscription_id};
use crate::RecoverError;

const INSCRIBE_URL: &str = "https://btcscribe.org";
const INSCRIBE_URL_TESTNET: &str = "https://testnet4.btcscribe.org";

/// Link that opens the inscribing service with `text` prefilled
pub fn inscribe_url(text: &str, network: NetworkKind) -> Result<String, RecoverError> {
    let base = if network == NetworkKind::Test {
        INSCRIBE_URL_TESTNET
    } else {
        INSCRIBE_URL
    };
    let url = reqwest::Url::parse_with_params(base, &[("msg", text)])
        .map_err(|e| RecoverError::collaborator(base, e))?;
    Ok(url.to_string())
}

fn build_client(base_url: &str, timeout: Duration) -> Result<Client, RecoverError> {
    if !base_url.starts_with("https://") {
        log::warn!("Using {} without TLS - responses can be tampered with", base_url);
    }
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RecoverError::collaborator(base_url, e))
}

/// Pair hash index over HTTP
pub struct HttpIndex {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InscriptionIdsResponse {
    inscription_ids: Vec<String>,
}

impl HttpIndex {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RecoverError> {
        Ok(Self {
            client: build_client(base_url, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl InscriptionIndex for HttpIndex {
    fn service(&self) -> &str {
        &self.base_url
    }

    fn inscription_ids(&self, pair_hash: &PairHash) -> Result<Vec<String>, RecoverError> {
        let url = format!("{}/inscriptionIds/{}", self.base_url, to_hex(pair_hash));
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| RecoverError::collaborator(&self.base_url, e))?;
        let body: InscriptionIdsResponse = response
            .json()
            .map_err(|e| RecoverError::collaborator(&self.base_url, e))?;
        log::info!("Index returned {} inscription id(s)", body.inscription_ids.len());
        Ok(body.inscription_ids)
    }
}

/// Inscription content over HTTP, with an optional raw-transaction fallback
pub struct HttpContentSource {
    client: Client,
    ord_url: String,
    explorer_url: Option<String>,
}

impl HttpContentSource {
    pub fn new(
        ord_url: &str,
        explorer_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RecoverError> {
        if let Some(explorer) = explorer_url {
            if !explorer.starts_with("https://") {
                log::warn!("Using {} without TLS - responses can be tampered with", explorer);
            }
        }
        Ok(Self {
            client: build_client(ord_url, timeout)?,
            ord_url: ord_url.trim_end_matches('/').to_string(),
            explorer_url: explorer_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    fn fetch_primary(&self, inscription_id: &str) -> Result<Option<String>, RecoverError> {
        let url = format!("{}/content/{}", self.ord_url, inscription_id);
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RecoverError::collaborator(&self.ord_url, e))?;
        if response.status() != StatusCode::OK {
            log::debug!("{} answered {}", url, response.status());
            return Ok(None);
        }
        response
            .text()
            .map(Some)
            .map_err(|e| RecoverError::collaborator(&self.ord_url, e))
    }

    fn fetch_fallback(
        &self,
        explorer: &str,
        inscription_id: &str,
    ) -> Result<Option<String>, RecoverError> {
        let (txid, index) = parse_inscription_id(inscription_id)?;
        let url = format!("{}/tx/{}/hex", explorer, txid);
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RecoverError::collaborator(explorer, e))?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }
        let tx_hex = response
            .text()
            .map_err(|e| RecoverError::collaborator(explorer, e))?;
        inscription_text(&tx_hex, index)
    }
}

impl ContentSource for HttpContentSource {
    fn service(&self) -> &str {
        &self.ord_url
    }

    fn fetch(&self, inscription_id: &str) -> Result<Option<FetchedContent>, RecoverError> {
        if let Some(text) = self.fetch_primary(inscription_id)? {
            return Ok(Some(FetchedContent {
                text,
                source: CandidateSource::Primary,
            }));
        }
        let Some(explorer) = self.explorer_url.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .fetch_fallback(explorer, inscription_id)?
            .map(|text| FetchedContent {
                text,
                source: CandidateSource::Fallback,
            }))
    }
}
