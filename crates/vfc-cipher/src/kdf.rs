//! Key derivation: Argon2id passphrase → cipher key, plus the key check value
//! stored in container headers.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use vfc_core::config::CryptoConfig;
use zeroize::Zeroize;

use crate::error::{CipherError, CipherResult};

/// Derived key length (AES-256)
pub const DERIVED_KEY_SIZE: usize = 32;

/// Salt length
pub const SALT_SIZE: usize = 16;

/// Length of the key check value
pub const KEY_CHECK_SIZE: usize = 16;

const KEY_CHECK_CONTEXT: &str = "vfcrypt key check v1";

/// A 256-bit key derived from a passphrase via Argon2id.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; DERIVED_KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; DERIVED_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.bytes
    }

    /// Non-secret fingerprint used to reject a wrong passphrase before any
    /// ciphertext is processed.
    pub fn check_value(&self) -> [u8; KEY_CHECK_SIZE] {
        let full = blake3::derive_key(KEY_CHECK_CONTEXT, &self.bytes);
        let mut check = [0u8; KEY_CHECK_SIZE];
        check.copy_from_slice(&full[..KEY_CHECK_SIZE]);
        check
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl From<&CryptoConfig> for KdfParams {
    fn from(config: &CryptoConfig) -> Self {
        Self {
            mem_cost_kib: config.argon2_mem_cost_kib,
            time_cost: config.argon2_time_cost,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// A fresh random salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
///
/// The salt is stored alongside the encrypted data; it does not need to be
/// secret.
pub fn derive_key(
    passphrase: &SecretSlice<u8>,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> CipherResult<DerivedKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(DERIVED_KEY_SIZE),
    )
    .map_err(|e| CipherError::InvalidArgument(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; DERIVED_KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret(), salt, &mut key)
        .map_err(|e| CipherError::InvalidArgument(format!("Argon2id KDF failed: {e}")))?;

    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn secret(s: &str) -> SecretSlice<u8> {
        SecretSlice::from(s.as_bytes().to_vec())
    }

    #[test]
    fn test_kdf_deterministic() {
        let salt = [1u8; 16];
        let key1 = derive_key(&secret("test-passphrase-123"), &salt, &fast()).unwrap();
        let key2 = derive_key(&secret("test-passphrase-123"), &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
        assert_eq!(key1.check_value(), key2.check_value());
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = [1u8; 16];
        let key1 = derive_key(&secret("passphrase-a"), &salt, &fast()).unwrap();
        let key2 = derive_key(&secret("passphrase-b"), &salt, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_ne!(key1.check_value(), key2.check_value());
    }

    #[test]
    fn test_kdf_different_salts() {
        let key1 = derive_key(&secret("same-passphrase"), &[1u8; 16], &fast()).unwrap();
        let key2 = derive_key(&secret("same-passphrase"), &[2u8; 16], &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_params() {
        let params = KdfParams {
            mem_cost_kib: 1,
            time_cost: 0,
            parallelism: 0,
        };
        let err = derive_key(&secret("x"), &[0u8; 16], &params).unwrap_err();
        assert!(matches!(err, CipherError::InvalidArgument(_)));
    }

    #[test]
    fn test_debug_redacts() {
        let key = DerivedKey::from_bytes([7u8; 32]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains('7'));
    }

    #[test]
    fn test_params_from_config() {
        let config = CryptoConfig::default();
        assert_eq!(KdfParams::from(&config), KdfParams::default());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
