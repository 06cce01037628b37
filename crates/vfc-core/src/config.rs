use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VfcError, VfcResult};
use crate::types::Algorithm;

/// Top-level configuration (loaded from vfcrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VfcConfig {
    pub daemon: DaemonConfig,
    pub keyring: KeyringConfig,
    pub store: StoreConfig,
    pub crypto: CryptoConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

/// Secret-holder daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on (default: /run/vfcrypt/keyring.sock)
    pub socket: PathBuf,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

/// Client-side secret channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// Socket of the secret-holder process
    pub socket: PathBuf,
    /// Connection attempts after the first refused connect (default: 3)
    pub connect_retries: u32,
    /// Fixed delay between connection attempts in milliseconds (default: 200)
    pub retry_backoff_ms: u64,
    /// Per-request I/O timeout in milliseconds (default: 5000)
    pub io_timeout_ms: u64,
    /// Open sessions read-only (refuses update-secret locally)
    pub read_only: bool,
}

/// Passphrase store served by the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for relative secret locations
    pub dir: PathBuf,
    /// Location used when a resource names no passphrase file
    pub default_location: String,
}

/// Cipher and key-derivation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Algorithm used when a resource does not declare one
    pub default_algorithm: Algorithm,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/vfcrypt/keyring.sock"),
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/vfcrypt/keyring.sock"),
            connect_retries: 3,
            retry_backoff_ms: 200,
            io_timeout_ms: 5000,
            read_only: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.config/vfcrypt/secrets"),
            default_location: "default".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::Aes,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load(path: &Path) -> VfcResult<VfcConfig> {
    if !path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        return Ok(VfcConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| VfcError::Config(format!("reading config {}: {e}", path.display())))?;
    let config: VfcConfig = toml::from_str(&content)
        .map_err(|e| VfcError::Config(format!("parsing config {}: {e}", path.display())))?;

    if config.config_file_mode_check {
        warn_if_world_readable(path);
    }
    Ok(config)
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        if meta.permissions().mode() & 0o004 != 0 {
            tracing::warn!(
                path = %path.display(),
                "config file is world-readable; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}

/// Expand a leading `~/` against $HOME.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        return home.join(rest);
    }
    path.to_path_buf()
}
