//! Reconciler - folds both backends' restored sessions into one identity.
//!
//! Both restore calls run concurrently and are joined before priority is
//! applied, so the result never depends on which backend answers first.
//! Embedded wins over external; the losing session is left untouched.

use crate::backend::Backends;
use crate::errors::{BackendError, BackendResult, WalletError, WalletResult};
use crate::identity::{Identity, Provider};
use std::future::Future;
use std::time::Duration;

pub struct Reconciler {
    backends: Backends,
    call_timeout: Option<Duration>,
}

impl Reconciler {
    pub fn new(backends: Backends) -> Self { Self { backends, call_timeout: None } }
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self { self.call_timeout = timeout; self }

    pub async fn reconcile(&self) -> WalletResult<Option<Identity>> {
        let (embedded, external) = tokio::join!(
            bounded(self.call_timeout, "restore", self.backends.embedded.restore()),
            bounded(self.call_timeout, "active_account", self.backends.external.active_account()),
        );
        let embedded = embedded.map_err(|source| WalletError::Startup { provider: Provider::Embedded, source })?;
        let external = external.map_err(|source| WalletError::Startup { provider: Provider::External, source })?;

        let identity = embedded
            .and_then(|user| {
                let name = user.display_name();
                Identity::embedded(user.pkh, name)
            })
            .or_else(|| external.and_then(|account| Identity::external(account.address)));

        match &identity {
            Some(id) => tracing::info!(provider = %id.provider, address = %id.address, "restored session"),
            None => tracing::info!("no session to restore"),
        }
        Ok(identity)
    }
}

/// Awaits `fut`, turning an elapsed deadline into a `Timeout` backend error.
pub(crate) async fn bounded<T>(
    timeout: Option<Duration>,
    op: &str,
    fut: impl Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    match timeout {
        Some(after) => tokio::time::timeout(after, fut).await.map_err(|_| BackendError::timeout(op, after))?,
        None => fut.await,
    }
}
