use std::io;
use thiserror::Error;
use vfc_cipher::CipherError;
use vfc_core::Algorithm;
use vfc_keyring::SecretError;

pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid resource path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Scheme has no local file behind it
    #[error("scheme '{0}' does not name a local file")]
    NotLocal(String),

    #[error("secret: {0}")]
    Secret(#[from] SecretError),

    #[error("cipher: {0}")]
    Cipher(#[from] CipherError),

    #[error("passphrase does not match the key this resource was encrypted with")]
    WrongPassphrase,

    #[error("resource declares cipher {declared} but was encrypted with {found}")]
    AlgorithmMismatch { declared: Algorithm, found: Algorithm },

    #[error("malformed encrypted resource: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ResolveError {
    /// The secret holder could not be reached within the retry budget.
    pub fn is_secret_unavailable(&self) -> bool {
        matches!(self, ResolveError::Secret(e) if e.is_unavailable())
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            ResolveError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
