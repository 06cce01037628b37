//! Daemon lifecycle: socket setup, systemd notify, serve until Ctrl-C

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use vfc_core::config::{expand_tilde, VfcConfig};
use vfc_keyring::{server, PassphraseStore};

pub async fn run(config: VfcConfig) -> Result<()> {
    let store_dir = expand_tilde(&config.store.dir);
    if !store_dir.is_dir() {
        warn!(
            dir = %store_dir.display(),
            "passphrase store directory does not exist yet (created on first update)"
        );
    }
    let store = Arc::new(PassphraseStore::new(store_dir));

    let socket_path = expand_tilde(&config.daemon.socket);
    let listener = server::bind(&socket_path)
        .with_context(|| format!("binding keyring socket {}", socket_path.display()))?;
    info!(
        socket = %socket_path.display(),
        store = %store.root().display(),
        default_location = %config.store.default_location,
        "keyring: listening"
    );

    notify_ready();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("installing Ctrl-C handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };
    server::serve(listener, store, shutdown).await?;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!(socket = %socket_path.display(), "removing socket failed: {e}");
    }
    info!("vfc-keyringd stopped");
    Ok(())
}

fn notify_ready() {
    // Send sd_notify(READY=1) to systemd if running as a service
    // Uses $NOTIFY_SOCKET env var; no-op if not set
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
