//! Graceful shutdown handling.

use inferadb_issues_detector::PhaseState;
use tokio::signal;

/// Waits for a shutdown signal (Ctrl-C, or SIGTERM on Unix).
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Resolves once `signal` completes, after flipping the detector into its
/// shutting-down phase.
///
/// Requests still in flight when the signal arrives are answered with
/// `503 shutting_down`.
pub async fn drain_on<F>(signal: F, phase: PhaseState)
where
    F: std::future::Future<Output = ()>,
{
    signal.await;
    phase.mark_shutting_down();
}
