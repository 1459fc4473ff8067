//! Dispatcher - routes operations to the backend that owns the session.
//!
//! # Operations
//!
//! | Request | Needs identity | Routed to |
//! |---------|----------------|-----------|
//! | `Login` / `LoginWithParams` | must be absent | embedded, external on fallback |
//! | `Sign` | logs in if absent | owning provider |
//! | `SignWithParams` | logs in if absent | external only |
//! | `Send` | yes | owning provider, best effort |
//! | `Logout` | no | owning provider |
//!
//! Every backend response or error is turned into an [`OperationResult`]
//! here; nothing backend-specific leaves this module.

mod request;

pub use request::{OperationRequest, OperationResult};

use crate::backend::{Backends, ExternalAccount, TransactionIntent};
use crate::config::WalletConfig;
use crate::errors::{BackendError, BackendResult, FailureReason, WalletResult};
use crate::identity::{Identity, Provider};
use crate::reconciler::{bounded, Reconciler};
use crate::session::SessionState;
use std::future::Future;

/// Log target for errors swallowed under [`ErrorPolicy::BestEffort`].
pub const DIAGNOSTICS_TARGET: &str = "duowallet::diagnostics";

/// How a failed backend call is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Logged as an operation failure.
    Report,
    /// Recorded for diagnostics only; never retried or re-dispatched.
    BestEffort,
}

pub const SEND_POLICY: ErrorPolicy = ErrorPolicy::BestEffort;
pub const SIGN_POLICY: ErrorPolicy = ErrorPolicy::Report;

enum LoginOutcome {
    Authenticated { provider: Provider, artifact: Option<String> },
    Failed(FailureReason),
}

pub struct Dispatcher {
    backends: Backends,
    session: SessionState,
    config: WalletConfig,
}

impl Dispatcher {
    pub fn new(backends: Backends, session: SessionState, config: WalletConfig) -> Self {
        Self { backends, session, config }
    }

    pub fn session(&self) -> &SessionState { &self.session }

    pub fn identity(&self) -> Option<Identity> { self.session.get() }

    /// Startup reconcile. On success the session becomes ready; on failure it
    /// stays loading and the caller may retry.
    pub async fn reconcile(&mut self) -> WalletResult<Option<Identity>> {
        let identity = Reconciler::new(self.backends.clone())
            .with_call_timeout(self.config.call_timeout)
            .reconcile()
            .await?;
        self.session.set(identity.clone());
        self.session.mark_ready();
        Ok(identity)
    }

    pub async fn dispatch(&mut self, request: OperationRequest) -> OperationResult {
        if !self.session.is_ready() {
            return OperationResult::failed(FailureReason::NotReady);
        }
        tracing::debug!(op = request.name(), "dispatch");
        match request {
            OperationRequest::Login => self.login_request(false).await,
            OperationRequest::LoginWithParams => self.login_request(true).await,
            OperationRequest::Logout => self.logout().await,
            OperationRequest::Sign { expression } => self.sign(&expression, false).await,
            OperationRequest::SignWithParams { expression } => self.sign(&expression, true).await,
            OperationRequest::Send { operations } => self.send(&operations).await,
        }
    }

    /// Active-account notifications from the external client. Ignored until
    /// startup reconcile has set the session.
    pub fn on_external_account(&mut self, account: Option<ExternalAccount>) {
        if !self.session.is_ready() {
            tracing::debug!(?account, "external account event ignored, session still loading");
            return;
        }
        let current = self.session.get();
        match (current.as_ref().map(|i| i.provider), account) {
            (Some(Provider::Embedded), account) => {
                tracing::debug!(?account, "external account event ignored, embedded session live");
            }
            (Some(Provider::External), None) => {
                tracing::info!("external account removed");
                self.session.set(None);
            }
            (None, None) => {}
            (_, Some(account)) => {
                tracing::info!(address = %account.address, "external account set");
                if let Some(identity) = Identity::external(account.address) {
                    self.session.set(Some(identity));
                }
            }
        }
    }

    async fn call<T>(&self, op: &str, fut: impl Future<Output = BackendResult<T>>) -> BackendResult<T> {
        bounded(self.config.call_timeout, op, fut).await
    }

    async fn login_request(&mut self, with_params: bool) -> OperationResult {
        if let Some(identity) = self.session.get() {
            tracing::info!(provider = %identity.provider, "login ignored, session already live");
            return OperationResult::NoOp;
        }
        match self.login(with_params).await {
            LoginOutcome::Authenticated { artifact, .. } => OperationResult::Success { value: artifact },
            LoginOutcome::Failed(reason) => OperationResult::failed(reason),
        }
    }

    /// Embedded first; external only when embedded declines the context.
    async fn login(&mut self, with_params: bool) -> LoginOutcome {
        let options = self.config.login_options(with_params);
        tracing::info!(template = %options.template, with_params, "embedded login");

        let response = match self.call("login", self.backends.embedded.login(&options)).await {
            Ok(response) => response,
            Err(err) if err.is_fallback_trigger() => {
                tracing::info!(error_id = ?err.error_id, "embedded declined, falling back to external");
                return self.fallback_login().await;
            }
            Err(err) => {
                tracing::warn!(kind = err.kind.as_str(), message = %err.message, "embedded login failed");
                return LoginOutcome::Failed(FailureReason::backend(Provider::Embedded, &err));
            }
        };

        let name = response.display_name();
        let Some(identity) = response.pkh.clone().and_then(|pkh| Identity::embedded(pkh, name)) else {
            tracing::warn!("embedded login response has no pkh");
            return LoginOutcome::Failed(FailureReason::MalformedResponse {
                provider: Provider::Embedded,
                detail: "missing pkh".into(),
            });
        };

        let artifact = match response.auth_response.filter(|_| with_params) {
            Some(auth) => {
                tracing::debug!(message = ?auth.message, "embedded auth response");
                Some(auth.signature)
            }
            None => None,
        };
        tracing::info!(address = %identity.address, "embedded login succeeded");
        self.session.set(Some(identity));
        if artifact.is_some() {
            self.session.set_response(artifact.clone());
        }
        LoginOutcome::Authenticated { provider: Provider::Embedded, artifact }
    }

    async fn fallback_login(&mut self) -> LoginOutcome {
        match self.call("request_permissions", self.backends.external.request_permissions()).await {
            Ok(Some(granted)) => match Identity::external(granted.address) {
                Some(identity) => {
                    tracing::info!(address = %identity.address, scopes = ?granted.scopes, "external login succeeded");
                    self.session.set(Some(identity));
                    LoginOutcome::Authenticated { provider: Provider::External, artifact: None }
                }
                None => LoginOutcome::Failed(FailureReason::MalformedResponse {
                    provider: Provider::External,
                    detail: "empty address".into(),
                }),
            },
            Ok(None) => {
                tracing::info!("external permission request dismissed");
                LoginOutcome::Failed(FailureReason::FallbackUnavailable)
            }
            Err(err) => {
                tracing::warn!(kind = err.kind.as_str(), message = %err.message, "external login failed");
                LoginOutcome::Failed(FailureReason::backend(Provider::External, &err))
            }
        }
    }

    /// Provider owning the session, logging in first when none is live.
    async fn ensure_identity(&mut self, with_params: bool) -> Result<Provider, FailureReason> {
        if let Some(identity) = self.session.get() {
            return Ok(identity.provider);
        }
        match self.login(with_params).await {
            LoginOutcome::Authenticated { provider, .. } => Ok(provider),
            LoginOutcome::Failed(reason) => Err(reason),
        }
    }

    async fn sign(&mut self, expression: &str, with_params: bool) -> OperationResult {
        let provider = match self.ensure_identity(with_params).await {
            Ok(provider) => provider,
            Err(reason) => return OperationResult::failed(reason),
        };
        // The params flow only signs through the external wallet.
        if with_params && provider != Provider::External {
            tracing::info!(provider = %provider, "sign with params skipped");
            return OperationResult::NoOp;
        }
        let capability = self.backends.capability(provider);
        let result = self.call("sign", capability.sign(expression)).await;
        self.settle(SIGN_POLICY, capability.provider(), "sign", result)
    }

    async fn send(&mut self, operations: &[TransactionIntent]) -> OperationResult {
        self.session.set_response(None);
        let Some(identity) = self.session.get() else {
            tracing::info!("send without identity");
            return OperationResult::failed(FailureReason::NoIdentity);
        };
        let capability = self.backends.capability(identity.provider);
        let result = self.call("send", capability.send(operations)).await;
        self.settle(SEND_POLICY, capability.provider(), "send", result)
    }

    async fn logout(&mut self) -> OperationResult {
        let Some(identity) = self.session.get() else {
            self.session.set_response(None);
            return OperationResult::NoOp;
        };
        let capability = self.backends.capability(identity.provider);
        match self.call("logout", capability.logout()).await {
            Ok(()) => tracing::info!(provider = %identity.provider, "logged out"),
            Err(err) => tracing::warn!(
                provider = %identity.provider,
                kind = err.kind.as_str(),
                message = %err.message,
                "backend logout failed, clearing session anyway"
            ),
        }
        self.session.set(None);
        self.session.set_response(None);
        OperationResult::Success { value: None }
    }

    fn settle(&self, policy: ErrorPolicy, provider: Provider, op: &str, result: BackendResult<String>) -> OperationResult {
        match result {
            Ok(value) => {
                tracing::info!(provider = %provider, op, "operation succeeded");
                self.session.set_response(Some(value.clone()));
                OperationResult::Success { value: Some(value) }
            }
            Err(err) => {
                record_failure(policy, provider, op, &err);
                OperationResult::failed(FailureReason::backend(provider, &err))
            }
        }
    }
}

fn record_failure(policy: ErrorPolicy, provider: Provider, op: &str, err: &BackendError) {
    match policy {
        ErrorPolicy::Report => {
            tracing::warn!(provider = %provider, op, kind = err.kind.as_str(), message = %err.message, "operation failed");
        }
        ErrorPolicy::BestEffort => {
            tracing::warn!(
                target: DIAGNOSTICS_TARGET,
                provider = %provider,
                op,
                error_id = err.error_id.as_deref().unwrap_or("-"),
                kind = err.kind.as_str(),
                message = %err.message,
                "backend error swallowed"
            );
        }
    }
}
