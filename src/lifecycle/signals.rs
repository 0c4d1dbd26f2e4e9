//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for Ctrl+C, and SIGTERM on Unix
//! - Drive the controller's shutdown when the process is asked to exit
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second signal during the drain cancels the grace period

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::controller::LifecycleController;
use crate::lifecycle::shutdown::ShutdownReport;

/// Resolves when the process receives an exit signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("function-logger: failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                eprintln!("function-logger: failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Shut the controller down on the first exit signal. A second signal
/// shortens the grace period.
pub fn spawn_exit_hook(controller: Arc<LifecycleController>) -> JoinHandle<ShutdownReport> {
    tokio::spawn(async move {
        shutdown_signal().await;

        let cancel = CancellationToken::new();
        let impatient = cancel.clone();
        let second = tokio::spawn(async move {
            shutdown_signal().await;
            impatient.cancel();
        });

        let report = controller.shutdown_with(cancel).await;
        second.abort();
        report
    })
}
