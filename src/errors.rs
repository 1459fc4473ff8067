//! Error taxonomy.
//!
//! Backend clients speak [`BackendError`]. The dispatcher never lets one of
//! those escape: it translates them into [`FailureReason`] inside an
//! `OperationResult`. [`WalletError`] is reserved for crate-level failures
//! (startup reconcile, config, session files).

use crate::identity::Provider;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type BackendResult<T> = Result<T, BackendError>;
pub type WalletResult<T> = Result<T, WalletError>;

/// Discriminant for backend failures. `UnsupportedForContext` is the one
/// variant that triggers login fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Embedded wallet declines this login flow ("other wallets" chosen).
    UnsupportedForContext,
    /// User or wallet rejected the request.
    Rejected,
    Unreachable,
    Timeout,
    Other,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::UnsupportedForContext => "unsupported_for_context",
            BackendErrorKind::Rejected => "rejected",
            BackendErrorKind::Unreachable => "unreachable",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    /// Backend-assigned identifier, kept for diagnostics.
    pub error_id: Option<String>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), error_id: None }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::UnsupportedForContext, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Rejected, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unreachable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    pub fn timeout(op: &str, after: Duration) -> Self {
        Self::new(BackendErrorKind::Timeout, format!("{op} timed out after {}ms", after.as_millis()))
    }

    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        self.error_id = Some(id.into());
        self
    }

    pub fn is_fallback_trigger(&self) -> bool {
        self.kind == BackendErrorKind::UnsupportedForContext
    }
}

/// Why an operation produced `OperationResult::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("session not ready")]
    NotReady,
    #[error("no live identity")]
    NoIdentity,
    #[error("malformed {provider} response: {detail}")]
    MalformedResponse { provider: Provider, detail: String },
    #[error("external wallet returned no account")]
    FallbackUnavailable,
    #[error("{provider} backend failed ({}): {message}", .kind.as_str())]
    Backend { provider: Provider, kind: BackendErrorKind, message: String },
}

impl FailureReason {
    pub fn backend(provider: Provider, err: &BackendError) -> Self {
        FailureReason::Backend { provider, kind: err.kind, message: err.message.clone() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("startup: {provider} restore failed: {source}")]
    Startup {
        provider: Provider,
        #[source]
        source: BackendError,
    },
    #[error("config: {0}")]
    Config(String),
    #[error("session file {path}: {message}")]
    SessionFile { path: String, message: String },
}
