use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::Status;

pub type SecretResult<T> = Result<T, SecretError>;

#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret holder could not be reached, or the session broke mid-request.
    #[error("secret holder at {} unavailable after {attempts} attempt(s): {reason}", .socket.display())]
    Unavailable {
        socket: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no secret configured at '{0}'")]
    NotConfigured(String),

    #[error("secret store unreadable at '{location}': {reason}")]
    StoreUnreadable { location: String, reason: String },

    #[error("secret exceeds 4096 bytes")]
    TooLarge,

    #[error("secret contains a forbidden CR or LF byte")]
    ForbiddenByte,

    #[error("write-back to secret store incomplete at '{location}': {reason}")]
    WriteIncomplete { location: String, reason: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretError {
    /// Wire status reported to a client for this failure.
    pub fn status(&self) -> Status {
        match self {
            SecretError::NotConfigured(_) => Status::NotConfigured,
            SecretError::StoreUnreadable { .. } | SecretError::Io(_) => Status::StoreUnreadable,
            SecretError::TooLarge => Status::TooLarge,
            SecretError::ForbiddenByte => Status::ForbiddenByte,
            SecretError::WriteIncomplete { .. } => Status::WriteIncomplete,
            _ => Status::BadRequest,
        }
    }

    /// Client-side error for a non-OK wire status.
    pub fn from_status(status: Status, location: &str) -> Self {
        match status {
            Status::Ok => SecretError::Protocol("OK status treated as failure".into()),
            Status::NotConfigured => SecretError::NotConfigured(location.to_string()),
            Status::StoreUnreadable => SecretError::StoreUnreadable {
                location: location.to_string(),
                reason: "reported by secret holder".into(),
            },
            Status::TooLarge => SecretError::TooLarge,
            Status::ForbiddenByte => SecretError::ForbiddenByte,
            Status::WriteIncomplete => SecretError::WriteIncomplete {
                location: location.to_string(),
                reason: "reported by secret holder".into(),
            },
            Status::BadRequest => SecretError::BadRequest(format!("secret holder rejected request for '{location}'")),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SecretError::Unavailable { .. })
    }
}
