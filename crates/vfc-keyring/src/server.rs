//! Secret-holder side of the keyring protocol.

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;

use crate::error::SecretError;
use crate::protocol::{Request, Response, ServerCodec, Status};
use crate::store::PassphraseStore;

/// Bind the keyring socket at `path`, replacing a stale socket file and
/// restricting access to the owner.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(listener)
}

/// Accept connections until `shutdown` resolves. Each connection runs on its
/// own task and may carry any number of requests.
pub async fn serve<F>(listener: UnixListener, store: Arc<PassphraseStore>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let store = store.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, store).await {
                                tracing::debug!(error = %e, "keyring connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("keyring server shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, store: Arc<PassphraseStore>) -> Result<(), SecretError> {
    let mut framed = Framed::new(stream, ServerCodec);

    while let Some(frame) = framed.next().await {
        let request = match frame {
            Ok(request) => request,
            Err(SecretError::Io(e)) => return Err(SecretError::Io(e)),
            Err(e) => {
                // framing is lost after a rejected request; report and hang up
                tracing::warn!(error = %e, "rejecting malformed request");
                framed.send(Response::failed(e.status())).await?;
                return Ok(());
            }
        };
        let response = dispatch(request, store.clone()).await;
        framed.send(response).await?;
    }
    Ok(())
}

async fn dispatch(request: Request, store: Arc<PassphraseStore>) -> Response {
    match request {
        Request::Ping => Response::ok(),
        Request::Read { location } => {
            let result = {
                let location = location.clone();
                tokio::task::spawn_blocking(move || store.read(&location)).await
            };
            match result {
                Ok(Ok(secret)) => {
                    tracing::debug!(location = %location, "secret served");
                    Response::secret(secret)
                }
                Ok(Err(e)) => {
                    tracing::info!(location = %location, error = %e, "secret read refused");
                    Response::failed(e.status())
                }
                Err(e) => {
                    tracing::warn!(location = %location, error = %e, "store task failed");
                    Response::failed(Status::StoreUnreadable)
                }
            }
        }
        Request::Update { location, secret } => {
            let result = {
                let location = location.clone();
                tokio::task::spawn_blocking(move || store.write(&location, &secret)).await
            };
            match result {
                Ok(Ok(())) => Response::ok(),
                Ok(Err(e)) => {
                    tracing::warn!(location = %location, error = %e, "secret update failed");
                    Response::failed(e.status())
                }
                Err(e) => {
                    tracing::warn!(location = %location, error = %e, "store task failed");
                    Response::failed(Status::WriteIncomplete)
                }
            }
        }
    }
}
