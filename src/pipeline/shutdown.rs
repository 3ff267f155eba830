//! Process shutdown requests

use std::future::Future;

use tracing::{info, warn};

/// Start listening for SIGINT and SIGTERM, returning a future that resolves
/// on the first one received.
///
/// Handlers are installed before this returns, so a signal that arrives while
/// the sink is still opening is not lost. Must be called within a Tokio
/// runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let listen = |kind: SignalKind, name: &str| match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to listen for {}: {}", name, e);
            None
        }
    };
    let mut interrupt = listen(SignalKind::interrupt(), "SIGINT");
    let mut terminate = listen(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = recv(&mut interrupt) => info!("Received SIGINT"),
            _ = recv(&mut terminate) => info!("Received SIGTERM"),
        }
    }
}

/// Waits forever when the handler could not be installed.
#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    let ctrl_c = tokio::signal::ctrl_c();
    async move {
        match ctrl_c.await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
