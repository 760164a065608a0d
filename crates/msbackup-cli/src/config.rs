//! CLI configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSection,

    /// Index, content and explorer endpoints
    #[serde(default)]
    pub services: ServicesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bitcoin network: "bitcoin", "testnet4", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: default_network(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesSection {
    /// Pair hash → inscription ids
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Inscription content server
    #[serde(default = "default_ord_url")]
    pub ord_url: String,

    /// Raw transaction API used when the content server has nothing.
    /// Only consulted on test networks.
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            ord_url: default_ord_url(),
            explorer_url: default_explorer_url(),
            timeout_secs: default_timeout(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_index_url() -> String {
    "https://api.multisigbackup.com".to_string()
}

fn default_ord_url() -> String {
    "https://ordinals.com".to_string()
}

fn default_explorer_url() -> String {
    "https://mempool.space/testnet4/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `MSBACKUP_LOG_LEVEL`
    /// - `MSBACKUP_NETWORK`
    /// - `MSBACKUP_INDEX_URL`
    /// - `MSBACKUP_ORD_URL`
    /// - `MSBACKUP_EXPLORER_URL`
    /// - `MSBACKUP_TIMEOUT_SECS`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("MSBACKUP_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(v) = lookup("MSBACKUP_NETWORK") {
            self.general.network = v;
        }
        if let Some(v) = lookup("MSBACKUP_INDEX_URL") {
            self.services.index_url = v;
        }
        if let Some(v) = lookup("MSBACKUP_ORD_URL") {
            self.services.ord_url = v;
        }
        if let Some(v) = lookup("MSBACKUP_EXPLORER_URL") {
            self.services.explorer_url = v;
        }
        if let Some(v) = lookup("MSBACKUP_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.services.timeout_secs = secs;
            }
        }
    }

    /// Parse the network string to a `bitcoin::Network`.
    pub fn network(&self) -> bitcoin::Network {
        match self.general.network.as_str() {
            "testnet" | "testnet3" | "testnet4" => bitcoin::Network::Testnet,
            "signet" => bitcoin::Network::Signet,
            "regtest" => bitcoin::Network::Regtest,
            _ => bitcoin::Network::Bitcoin,
        }
    }

    /// Explorer for the raw-transaction fallback, on test networks only
    pub fn fallback_explorer(&self) -> Option<&str> {
        if self.network() == bitcoin::Network::Bitcoin {
            None
        } else {
            Some(self.services.explorer_url.as_str())
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.services.timeout_secs)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("services.index_url", &self.services.index_url),
            ("services.ord_url", &self.services.ord_url),
            ("services.explorer_url", &self.services.explorer_url),
        ] {
            anyhow::ensure!(!url.is_empty(), "{} must not be empty", name);
            anyhow::ensure!(
                url.starts_with("https://") || url.starts_with("http://"),
                "{} must be an http(s) URL",
                name
            );
        }

        anyhow::ensure!(
            self.services.timeout_secs > 0,
            "services.timeout_secs must be > 0"
        );

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
