use thiserror::Error;
use vfc_core::{Algorithm, Direction};

use crate::block::InterfaceVersion;

pub type CipherResult<T> = Result<T, CipherError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Malformed call parameters; always a programming error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cipher '{name}' implements interface {found}, this build understands major version {supported}")]
    UnsupportedInterfaceVersion {
        name: String,
        found: InterfaceVersion,
        supported: u16,
    },

    #[error("constructing {algorithm} cipher failed: {reason}")]
    ConstructionFailed { algorithm: Algorithm, reason: String },

    #[error("allocating {bytes} bytes of cipher state failed")]
    AllocationFailed { bytes: usize },

    #[error("invalid key material: {len} bytes ({reason})")]
    InvalidKeyMaterial { len: usize, reason: String },

    #[error("{0} key schedule not initialized; call set_key first")]
    NotInitialized(Direction),

    #[error("buffer length {len} is not a multiple of the {block_size}-byte block size")]
    InvalidBufferLength { len: usize, block_size: usize },
}
