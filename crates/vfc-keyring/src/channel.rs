//! Client side of the keyring protocol.
//!
//! A [`SecretChannel`] owns at most one connection to the secret holder,
//! established lazily on the first request and reused afterwards. Any I/O
//! failure drops the connection; the next request reconnects.

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use vfc_core::config::KeyringConfig;

use crate::error::{SecretError, SecretResult};
use crate::passphrase::Passphrase;
use crate::protocol::{ClientCodec, Request, Response, Status, MAX_LOCATION_LEN};

/// What a session is allowed to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Anything that can hand out passphrases by location.
pub trait SecretSource: Send + Sync {
    fn read_secret(&self, location: &str) -> impl Future<Output = SecretResult<Passphrase>> + Send;
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub socket: PathBuf,
    /// Extra connection attempts after a refused connect
    pub connect_retries: u32,
    pub retry_backoff: Duration,
    /// Per-request deadline, covering send and receive
    pub io_timeout: Duration,
}

impl From<&KeyringConfig> for ChannelConfig {
    fn from(config: &KeyringConfig) -> Self {
        Self {
            socket: vfc_core::config::expand_tilde(&config.socket),
            connect_retries: config.connect_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            io_timeout: Duration::from_millis(config.io_timeout_ms),
        }
    }
}

type Session = Framed<UnixStream, ClientCodec>;

pub struct SecretChannel {
    config: ChannelConfig,
    mode: AccessMode,
    session: Mutex<Option<Session>>,
}

impl SecretChannel {
    pub fn new(config: ChannelConfig, mode: AccessMode) -> Self {
        Self {
            config,
            mode,
            session: Mutex::new(None),
        }
    }

    /// Channel configured from `[keyring]`; `read_only` selects the mode.
    pub fn from_config(config: &KeyringConfig) -> Self {
        let mode = if config.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };
        Self::new(ChannelConfig::from(config), mode)
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn socket(&self) -> &std::path::Path {
        &self.config.socket
    }

    /// Fetch the passphrase stored at `location`.
    pub async fn read_secret(&self, location: &str) -> SecretResult<Passphrase> {
        check_location(location)?;
        let response = self
            .request(Request::Read {
                location: location.to_string(),
            })
            .await?;
        match (response.status, response.secret) {
            (Status::Ok, Some(secret)) => {
                tracing::debug!(location, len = secret.len(), "secret received");
                Ok(secret)
            }
            (Status::Ok, None) => Err(SecretError::Protocol("OK read response without a secret".into())),
            (status, _) => Err(SecretError::from_status(status, location)),
        }
    }

    /// Replace the passphrase at `location`. Refused locally on read-only
    /// sessions.
    pub async fn update_secret(&self, location: &str, secret: Passphrase) -> SecretResult<()> {
        if self.mode == AccessMode::ReadOnly {
            return Err(SecretError::PermissionDenied(format!(
                "update of '{location}' on a read-only session"
            )));
        }
        check_location(location)?;
        let response = self
            .request(Request::Update {
                location: location.to_string(),
                secret,
            })
            .await?;
        match response.status {
            Status::Ok => Ok(()),
            status => Err(SecretError::from_status(status, location)),
        }
    }

    /// Round-trip a no-op request to check the secret holder is serving.
    pub async fn ping(&self) -> SecretResult<()> {
        let response = self.request(Request::Ping).await?;
        match response.status {
            Status::Ok => Ok(()),
            status => Err(SecretError::from_status(status, "")),
        }
    }

    /// Drop the connection, if any.
    pub async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            tracing::debug!(socket = %self.config.socket.display(), "secret channel closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn request(&self, request: Request) -> SecretResult<Response> {
        let mut guard = self.session.lock().await;
        let mut session = match guard.take() {
            Some(session) => session,
            None => self.connect().await?,
        };

        let exchange = async {
            session.send(request).await?;
            match session.next().await {
                Some(response) => response,
                None => Err(SecretError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "secret holder closed the connection",
                ))),
            }
        };

        let outcome = match tokio::time::timeout(self.config.io_timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SecretError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no response within {:?}", self.config.io_timeout),
            ))),
        };

        match outcome {
            Ok(response) => {
                *guard = Some(session);
                Ok(response)
            }
            // stream position is unknown after a failed exchange; drop it
            Err(e) => {
                drop(session);
                Err(match e {
                    SecretError::Io(io) => SecretError::Unavailable {
                        socket: self.config.socket.clone(),
                        attempts: 1,
                        reason: io.to_string(),
                    },
                    other => other,
                })
            }
        }
    }

    async fn connect(&self) -> SecretResult<Session> {
        let attempts = self.config.connect_retries + 1;
        let mut last_err = None;

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.io_timeout, UnixStream::connect(&self.config.socket)).await {
                Ok(Ok(stream)) => {
                    tracing::debug!(socket = %self.config.socket.display(), attempt, "secret channel connected");
                    return Ok(Framed::new(stream, ClientCodec::default()));
                }
                Ok(Err(e)) if is_transient(&e) => {
                    tracing::debug!(attempt, error = %e, "secret holder not accepting connections");
                    last_err = Some(e.to_string());
                }
                Ok(Err(e)) => {
                    return Err(SecretError::Unavailable {
                        socket: self.config.socket.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    })
                }
                Err(_) => last_err = Some("connect timed out".into()),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        tracing::warn!(
            socket = %self.config.socket.display(),
            attempts,
            "secret holder unavailable"
        );
        Err(SecretError::Unavailable {
            socket: self.config.socket.clone(),
            attempts,
            reason: last_err.unwrap_or_else(|| "no connection attempts made".into()),
        })
    }
}

impl SecretSource for SecretChannel {
    async fn read_secret(&self, location: &str) -> SecretResult<Passphrase> {
        SecretChannel::read_secret(self, location).await
    }
}

impl std::fmt::Debug for SecretChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretChannel")
            .field("socket", &self.config.socket)
            .field("mode", &self.mode)
            .finish()
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound)
}

fn check_location(location: &str) -> SecretResult<()> {
    if location.is_empty() {
        return Err(SecretError::BadRequest("empty secret location".into()));
    }
    if location.len() > MAX_LOCATION_LEN {
        return Err(SecretError::BadRequest(format!(
            "secret location is {} bytes, limit {MAX_LOCATION_LEN}",
            location.len()
        )));
    }
    Ok(())
}
