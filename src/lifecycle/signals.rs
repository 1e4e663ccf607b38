//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM (container stop) or SIGINT (interactive)
//! - Translate either into a shutdown broadcast

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::lifecycle::Shutdown;

/// Resolve when SIGTERM or SIGINT arrives.
pub async fn wait_for_termination() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT");
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => {}
        _ = interrupt => {}
    }
}

/// Spawn a task that triggers `shutdown` on the first termination signal.
pub fn spawn_signal_listener(shutdown: Arc<Shutdown>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.trigger();
    })
}
