//! vfc-keyringd: vfcrypt secret-holder daemon
//!
//! Usage:
//!   vfc-keyringd [--config /etc/vfcrypt/config.toml] [--socket PATH] [--store DIR]
//!
//! Serves passphrases from the store directory over a private Unix socket.
//! Clients ask for a secret only while deriving a key and discard it after.

mod daemon;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "vfc-keyringd", version, about = "vfcrypt secret-holder daemon")]
struct Cli {
    /// Path to vfcrypt.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "VFC_CONFIG",
        default_value = "/etc/vfcrypt/config.toml"
    )]
    config: PathBuf,

    /// Override the listening socket from the config
    #[arg(long, env = "VFC_KEYRING_SOCKET")]
    socket: Option<PathBuf>,

    /// Override the passphrase store directory from the config
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, env = "VFC_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to the config value
    #[arg(long, env = "VFC_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = vfc_core::config::load(&cli.config)?;
    if let Some(socket) = cli.socket {
        config.daemon.socket = socket;
    }
    if let Some(store) = cli.store {
        config.store.dir = store;
    }

    let level = cli.log.unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.unwrap_or(match config.daemon.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "vfc-keyringd starting"
    );

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
