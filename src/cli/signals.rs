//! Signal handling for graceful stop

use crate::workflow::WorkflowExecutor;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Wait for SIGINT or SIGTERM (Ctrl+C elsewhere)
pub async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                tracing::warn!("failed to install signal handlers, falling back to ctrl_c");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        // Never resolve: without a handler there is nothing to wait for
        std::future::pending::<()>().await;
    }
}

/// Stop the run when `signal` resolves; a second signal exits immediately
pub fn stop_on<F, G>(executor: Arc<WorkflowExecutor>, signal: F, second: G) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    G: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        eprintln!("\nStopping after the current step (interrupt again to exit)...");
        tracing::info!("interrupt received, stopping workflow");
        executor.stop();

        second.await;
        eprintln!("\nExiting");
        std::process::exit(130);
    })
}

/// Stop the run on Ctrl+C
pub fn stop_on_interrupt(executor: Arc<WorkflowExecutor>) -> JoinHandle<()> {
    stop_on(executor, interrupted(), async {
        interrupted().await;
    })
}
