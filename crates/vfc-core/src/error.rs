use thiserror::Error;

pub type VfcResult<T> = Result<T, VfcError>;

#[derive(Debug, Error)]
pub enum VfcError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}
