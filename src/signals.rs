use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Resolve once SIGTERM or SIGINT (Ctrl-C) is received
///
/// Used as the graceful shutdown trigger of the HTTP server.
#[cfg(unix)]
pub async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to setup SIGTERM handler, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, initiating graceful shutdown");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, initiating graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }
}

/// Windows: only Ctrl-C is supported
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, initiating graceful shutdown");
}
