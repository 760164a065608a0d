//! msbackup: encrypted multisig descriptor backups from the command line
//!
//! # Usage
//!
//! ```bash
//! msbackup encrypt 'wsh(sortedmulti(2,[aabbccdd/48h/0h/0h/2h]xpub.../<0;1>/*,...))'
//! msbackup decrypt '<encrypted text>' --xpub xpub6A... --xpub xpub6B...
//! msbackup recover --xfp aabbccdd 11223344 --xpub xpub6A...
//! msbackup derive --path 48h/0h/0h/2h      # mnemonic from MSBACKUP_MNEMONIC
//! msbackup checksum 'wsh(...)'
//! ```

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use msbackup_core::{parse_derivation_path, verify_checksum, with_checksum};
use msbackup_recover::{
    inscribe_url, HttpContentSource, HttpIndex, KeySource, RecoverySession, RecoveryState,
    SeedKeySource,
};

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "msbackup",
    version,
    about = "Encrypted multisig descriptor backups",
    long_about = "msbackup: encrypt a multisig descriptor so that any signing quorum of its xpubs can decrypt it, and recover published backups"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', env = "MSBACKUP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a descriptor (read from stdin when omitted)
    Encrypt {
        descriptor: Option<String>,
    },

    /// Decrypt an encrypted descriptor with some of its xpubs
    Decrypt {
        /// Encrypted text (read from stdin when omitted)
        encrypted: Option<String>,
        /// Extended public key, repeatable
        #[arg(long = "xpub", short = 'x')]
        xpubs: Vec<String>,
    },

    /// Find a published backup by two master fingerprints and decrypt it
    Recover(RecoverArgs),

    /// Add or verify a descriptor checksum
    Checksum {
        descriptor: String,
        /// Check the existing checksum instead of printing a new one
        #[arg(long)]
        verify: bool,
    },

    /// Print the master fingerprint and xpub of a mnemonic at a path
    Derive {
        #[command(flatten)]
        seed: SeedArgs,
        /// Derivation path, `h` or `'` for hardened steps
        #[arg(long, short = 'p', default_value = "48h/0h/0h/2h")]
        path: String,
    },

    /// Print the active configuration (defaults + file + environment)
    Config,
}

#[derive(Args, Debug)]
struct RecoverArgs {
    /// Two master fingerprints of the wallet
    #[arg(long = "xfp", num_args = 2, value_names = ["XFP_A", "XFP_B"], conflicts_with = "encrypted")]
    xfps: Vec<String>,

    /// Encrypted text, skipping the inscription lookup
    #[arg(long, short = 'e')]
    encrypted: Option<String>,

    /// Which discovered candidate to decrypt
    #[arg(long, default_value_t = 0)]
    candidate: usize,

    /// Extended public key, repeatable
    #[arg(long = "xpub", short = 'x')]
    xpubs: Vec<String>,

    /// Also derive an xpub from a mnemonic
    #[command(flatten)]
    seed: OptionalSeedArgs,

    /// Path for the mnemonic xpub (default: the path the backup suggests)
    #[arg(long, short = 'p')]
    path: Option<String>,
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// BIP-39 mnemonic
    #[arg(long, env = "MSBACKUP_MNEMONIC", hide_env_values = true)]
    mnemonic: String,
    /// BIP-39 passphrase
    #[arg(long, env = "MSBACKUP_PASSPHRASE", hide_env_values = true, default_value = "")]
    passphrase: String,
}

#[derive(Args, Debug)]
struct OptionalSeedArgs {
    /// BIP-39 mnemonic
    #[arg(long, env = "MSBACKUP_MNEMONIC", hide_env_values = true)]
    mnemonic: Option<String>,
    /// BIP-39 passphrase
    #[arg(long, env = "MSBACKUP_PASSPHRASE", hide_env_values = true, default_value = "")]
    passphrase: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply env overrides
    config.apply_env_overrides();

    // Validate
    config.validate().context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &config.general.log_level);
    env_logger::init();

    log::info!(
        "msbackup {} on {} ({})",
        env!("CARGO_PKG_VERSION"),
        config.general.network,
        cli.config
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "default config".to_string())
    );

    match cli.command {
        Commands::Encrypt { descriptor } => encrypt(descriptor),
        Commands::Decrypt { encrypted, xpubs } => decrypt(encrypted, &xpubs),
        Commands::Recover(args) => recover(&config, args),
        Commands::Checksum { descriptor, verify } => checksum(&descriptor, verify),
        Commands::Derive { seed, path } => derive(&config, &seed, &path),
        Commands::Config => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render config")?
            );
            Ok(())
        }
    }
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn encrypt(descriptor: Option<String>) -> Result<()> {
    let descriptor = text_or_stdin(descriptor)?;
    let output = msbackup_crypt::encrypt(&descriptor).context("Encryption failed")?;
    log::info!("Encrypted {:?} network descriptor", output.network);

    if output.missing_fingerprints {
        eprintln!(
            "⚠️  Some keys have no master fingerprint. The backup cannot be found by fingerprint lookup."
        );
    }
    println!("{}", output.encrypted_text);
    println!();
    println!(
        "Inscribe: {}",
        inscribe_url(&output.encrypted_text, output.network)?
    );
    Ok(())
}

fn decrypt(encrypted: Option<String>, xpubs: &[String]) -> Result<()> {
    let encrypted = text_or_stdin(encrypted)?;
    log::info!("Decrypting with {} xpub(s)", xpubs.len());
    let outcome = msbackup_crypt::decrypt(&encrypted, xpubs).context("Decryption failed")?;

    eprintln!("{}", outcome.message());
    if let Some(descriptor) = outcome.descriptor_with_checksum() {
        println!("{}", descriptor);
    }
    Ok(())
}

fn recover(config: &Config, args: RecoverArgs) -> Result<()> {
    let index = HttpIndex::new(&config.services.index_url, config.timeout())?;
    let content = HttpContentSource::new(
        &config.services.ord_url,
        config.fallback_explorer(),
        config.timeout(),
    )?;
    log::info!(
        "Recovering via index {} and content server {}",
        config.services.index_url,
        config.services.ord_url
    );
    let mut session = RecoverySession::new(index, content);

    let mut state = match (&args.encrypted, args.xfps.as_slice()) {
        (Some(text), _) => session.use_encrypted_text(text)?,
        (None, [xfp_a, xfp_b]) => {
            let candidates = session
                .discover(xfp_a, xfp_b)
                .context("Backup lookup failed")?;
            log::info!("Found {} candidate backup(s)", candidates.len());
            for (position, candidate) in candidates.iter().enumerate() {
                eprintln!("  [{}] {}  ({})", position, candidate.summary(), candidate.id);
            }
            session.select(args.candidate)?
        }
        _ => anyhow::bail!("Provide --encrypted or two --xfp fingerprints"),
    };

    eprintln!(
        "Backup needs up to {} xpub(s){}",
        session.required_xpub_slots(),
        session
            .suggested_origin_path()
            .map(|path| format!(", likely at m/{}", path))
            .unwrap_or_default()
    );

    for xpub in &args.xpubs {
        state = session
            .add_xpub(xpub)
            .with_context(|| format!("Rejected xpub {}", xpub))?;
    }

    if let Some(words) = &args.seed.mnemonic {
        let source = SeedKeySource::from_mnemonic(words, &args.seed.passphrase, config.network())?;
        log::debug!("Adding xpub from mnemonic {}", source.master_fingerprint()?);
        state = session.add_from_key_source(&source, args.path.as_deref())?;
    }

    eprintln!("{}", state.message());
    if let RecoveryState::Recovered { descriptor } = state {
        println!("{}", descriptor);
    }
    Ok(())
}

fn checksum(descriptor: &str, verify: bool) -> Result<()> {
    let descriptor = descriptor.trim();
    if verify {
        anyhow::ensure!(verify_checksum(descriptor), "Checksum does not match");
        println!("✅ Checksum is valid.");
    } else {
        println!("{}", with_checksum(descriptor));
    }
    Ok(())
}

fn derive(config: &Config, seed: &SeedArgs, path: &str) -> Result<()> {
    let source = SeedKeySource::from_mnemonic(&seed.mnemonic, &seed.passphrase, config.network())?;
    let path = parse_derivation_path(path)?;
    println!("Fingerprint: {}", source.master_fingerprint()?);
    println!("Path:        {}", path);
    println!("Xpub:        {}", source.extended_public_key(&path)?);
    Ok(())
}
