//! HTTP surface over the dispatcher.
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/health` | GET | `{status, service, ready, time}` |
//! | `/session` | GET | status, identity, last response, status line |
//! | `/dispatch` | POST | `OperationRequest` → `OperationResult` |
//! | `/reconcile` | POST | retry startup reconcile |

mod routes;

pub use routes::{create_router, dispatch, health, reconcile, session, AppState, ReconcileResponse, SessionResponse};

use crate::backend::ExternalAccount;
use tokio::sync::broadcast;

/// Feeds external active-account notifications into the dispatcher.
pub fn spawn_account_listener(
    state: AppState,
    mut events: broadcast::Receiver<Option<ExternalAccount>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(account) => state.dispatcher.lock().await.on_external_account(account),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "external account events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Resolves on SIGINT/SIGTERM (Ctrl+C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C");
    }
}
