//! Validated passphrase bytes.

use secrecy::{ExposeSecret, SecretSlice};
use zeroize::Zeroize;

use crate::error::{SecretError, SecretResult};

/// Longest passphrase the protocol carries.
pub const MAX_PASSPHRASE_LEN: usize = 4096;

/// Check the wire constraints: non-empty, at most [`MAX_PASSPHRASE_LEN`]
/// bytes, and no CR or LF anywhere.
pub fn validate(bytes: &[u8]) -> SecretResult<()> {
    if bytes.len() > MAX_PASSPHRASE_LEN {
        return Err(SecretError::TooLarge);
    }
    if bytes.is_empty() {
        return Err(SecretError::BadRequest("empty passphrase".into()));
    }
    if bytes.iter().any(|b| matches!(b, b'\r' | b'\n')) {
        return Err(SecretError::ForbiddenByte);
    }
    Ok(())
}

/// A passphrase that satisfies [`validate`]. Wiped on drop.
pub struct Passphrase(SecretSlice<u8>);

impl Passphrase {
    /// Take ownership of `bytes`; they are wiped if validation fails.
    pub fn new(mut bytes: Vec<u8>) -> SecretResult<Self> {
        if let Err(e) = validate(&bytes) {
            bytes.zeroize();
            return Err(e);
        }
        Ok(Passphrase(SecretSlice::from(bytes)))
    }

    pub fn from_string(s: String) -> SecretResult<Self> {
        Self::new(s.into_bytes())
    }

    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }

    pub fn as_secret(&self) -> &SecretSlice<u8> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy into a new `Passphrase`.
    pub fn duplicate(&self) -> Self {
        Passphrase(SecretSlice::from(self.expose().to_vec()))
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passphrase")
            .field("len", &self.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
