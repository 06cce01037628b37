//! vfc: vfcrypt command-line interface
//!
//! Commands:
//!   encrypt <input> <output-uri>   - write a file as an encrypted resource
//!   decrypt <uri> [-o <file>]      - read a resource, decrypting if flagged
//!   passphrase set <location>      - store a passphrase through the daemon
//!   passphrase check <location>    - confirm a passphrase is configured
//!   ping                           - check the secret-holder daemon
//!   ciphers                        - list cipher backends
//!   config show                    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use vfc_cipher::{is_accel_available, BlockCipher, CipherRegistry};
use vfc_core::config::VfcConfig;
use vfc_core::Algorithm;
use vfc_keyring::{AccessMode, ChannelConfig, Passphrase, SecretChannel};
use vfc_resolver::{EncryptedResourceResolver, ResourcePath};
use zeroize::Zeroizing;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vfc",
    version,
    about = "vfcrypt client",
    long_about = "vfc: encrypt and decrypt virtual resources, manage passphrases held by vfc-keyringd"
)]
struct Cli {
    /// Path to vfcrypt.toml configuration file
    #[arg(long, short = 'c', env = "VFC_CONFIG", default_value = "/etc/vfcrypt/config.toml")]
    config: PathBuf,

    /// Override the keyring socket from the config
    #[arg(long, env = "VFC_KEYRING_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "VFC_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a local file to a resource, encrypting when the URI asks for it
    ///
    /// Example: vfc encrypt notes.txt 'vfile:/srv/notes.enc?enc&pwfile=team/notes'
    Encrypt {
        /// Local plaintext file
        input: PathBuf,
        /// Destination resource URI
        output: String,
    },

    /// Read a resource, decrypting when the URI is flagged as encrypted
    Decrypt {
        /// Source resource URI
        uri: String,
        /// Write plaintext here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Passphrase management through vfc-keyringd
    Passphrase {
        #[command(subcommand)]
        action: PassphraseAction,
    },

    /// Check that vfc-keyringd is serving
    Ping,

    /// List cipher backends and whether they can be constructed here
    Ciphers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum PassphraseAction {
    /// Prompt for a passphrase and store it at <location>
    Set { location: String },
    /// Confirm a passphrase is configured at <location>
    Check { location: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let mut config = vfc_core::config::load(&cli.config)?;
    if let Some(socket) = cli.socket {
        config.keyring.socket = socket;
    }

    match cli.command {
        Commands::Encrypt { input, output } => cmd_encrypt(&config, &input, &output).await,
        Commands::Decrypt { uri, output } => cmd_decrypt(&config, &uri, output.as_deref()).await,
        Commands::Passphrase {
            action: PassphraseAction::Set { location },
        } => cmd_passphrase_set(&config, &location).await,
        Commands::Passphrase {
            action: PassphraseAction::Check { location },
        } => cmd_passphrase_check(&config, &location).await,
        Commands::Ping => cmd_ping(&config).await,
        Commands::Ciphers => cmd_ciphers(),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn resolver(config: &VfcConfig) -> EncryptedResourceResolver<SecretChannel> {
    EncryptedResourceResolver::from_config(SecretChannel::from_config(&config.keyring), config)
}

// ── `vfc encrypt` / `vfc decrypt` ─────────────────────────────────────────────

async fn cmd_encrypt(config: &VfcConfig, input: &Path, output: &str) -> Result<()> {
    let target: ResourcePath = output.parse().context("parsing output URI")?;
    let mut source = File::open(input).with_context(|| format!("opening {}", input.display()))?;

    let resolver = resolver(config);
    let mut created = resolver
        .create_path(&target)
        .await
        .with_context(|| format!("creating {target}"))?;
    let encrypted = created.is_encrypted();
    let bytes = io::copy(&mut source, &mut created).context("writing resource")?;
    created.commit().context("finishing resource")?;

    println!(
        "{} → {} ({} bytes{})",
        input.display(),
        target,
        bytes,
        if encrypted { ", encrypted" } else { "" }
    );
    Ok(())
}

async fn cmd_decrypt(config: &VfcConfig, uri: &str, output: Option<&Path>) -> Result<()> {
    let source: ResourcePath = uri.parse().context("parsing resource URI")?;

    let resolver = resolver(config);
    let mut opened = resolver
        .open_path_read(&source)
        .await
        .with_context(|| format!("opening {source}"))?;

    match output {
        Some(path) => {
            let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            io::copy(&mut opened, &mut file).context("reading resource")?;
            file.sync_all()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            io::copy(&mut opened, &mut stdout).context("reading resource")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// ── `vfc passphrase` ──────────────────────────────────────────────────────────

async fn cmd_passphrase_set(config: &VfcConfig, location: &str) -> Result<()> {
    let first = rpassword::prompt_password(format!("Passphrase for '{location}': "))
        .context("reading passphrase")?;
    let second = Zeroizing::new(rpassword::prompt_password("Repeat passphrase: ").context("reading passphrase")?);
    if first != *second {
        anyhow::bail!("passphrases do not match");
    }
    let passphrase = Passphrase::from_string(first)?;

    let channel = SecretChannel::new(ChannelConfig::from(&config.keyring), AccessMode::ReadWrite);
    channel
        .update_secret(location, passphrase)
        .await
        .with_context(|| format!("storing passphrase at '{location}'"))?;
    channel.close().await;

    println!("passphrase stored at '{location}'");
    Ok(())
}

async fn cmd_passphrase_check(config: &VfcConfig, location: &str) -> Result<()> {
    let channel = SecretChannel::from_config(&config.keyring);
    let secret = channel
        .read_secret(location)
        .await
        .with_context(|| format!("reading passphrase at '{location}'"))?;
    println!("'{location}': configured ({} bytes)", secret.len());
    Ok(())
}

// ── `vfc ping` ────────────────────────────────────────────────────────────────

async fn cmd_ping(config: &VfcConfig) -> Result<()> {
    let channel = SecretChannel::from_config(&config.keyring);
    channel.ping().await.context("vfc-keyringd not reachable")?;
    println!("vfc-keyringd: serving at {}", channel.socket().display());
    Ok(())
}

// ── `vfc ciphers` ─────────────────────────────────────────────────────────────

fn cmd_ciphers() -> Result<()> {
    let registry = CipherRegistry::global();
    println!("hardware AES: {}", if is_accel_available() { "yes" } else { "no" });
    println!();
    println!("{:<10} {:<14} {:>6} {:>6}  {}", "ALGORITHM", "BACKEND", "BLOCK", "KEY", "STATUS");
    for algorithm in Algorithm::ALL {
        match registry.get(algorithm) {
            Ok(cipher) => println!(
                "{:<10} {:<14} {:>6} {:>6}  ok (interface {})",
                algorithm,
                cipher.name(),
                cipher.block_size(),
                cipher.key_size(),
                cipher.interface_version()
            ),
            Err(e) => println!("{:<10} {:<14} {:>6} {:>6}  unavailable: {e}", algorithm, "-", "-", "-"),
        }
    }
    Ok(())
}

// ── `vfc config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &VfcConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
