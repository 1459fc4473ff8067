//! Backend clients and the provider capability table.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!     │
//!     ├── login ──────────────► EmbeddedBackend::login
//!     │                              │ UnsupportedForContext
//!     │                              ▼
//!     │                         ExternalBackend::request_permissions
//!     │
//!     └── sign / send / logout ─► Backends::capability(provider)
//!                                    ├── Embedded → EmbeddedCapability
//!                                    └── External → ExternalCapability
//! ```
//!
//! Each capability adapter translates its backend's response shape into
//! the common one (`String` signature, `String` transaction hash).

mod embedded;
mod external;
pub mod simulated;

pub use embedded::{
    AuthParams, AuthResponse, EmbeddedBackend, EmbeddedCapability, EmbeddedLoginResponse, EmbeddedUser, LoginOptions,
};
pub use external::{ExternalAccount, ExternalBackend, ExternalCapability, OperationResponse, PermissionResponse, SignPayloadResponse};

use crate::errors::BackendResult;
use crate::identity::Provider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Opaque transaction-intent record. The dispatcher never inspects it.
pub type TransactionIntent = Value;

/// What every provider can do once it owns the session.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    fn provider(&self) -> Provider;
    async fn sign(&self, payload: &str) -> BackendResult<String>;
    /// Returns the transaction hash, or the raw response rendered as text.
    async fn send(&self, operations: &[TransactionIntent]) -> BackendResult<String>;
    async fn logout(&self) -> BackendResult<()>;
}

/// Explicitly constructed backend handles, shared by reconciler and dispatcher.
#[derive(Clone)]
pub struct Backends {
    pub embedded: Arc<dyn EmbeddedBackend>,
    pub external: Arc<dyn ExternalBackend>,
    embedded_cap: Arc<EmbeddedCapability>,
    external_cap: Arc<ExternalCapability>,
}

impl Backends {
    pub fn new(embedded: Arc<dyn EmbeddedBackend>, external: Arc<dyn ExternalBackend>) -> Self {
        Self {
            embedded_cap: Arc::new(EmbeddedCapability::new(embedded.clone())),
            external_cap: Arc::new(ExternalCapability::new(external.clone())),
            embedded,
            external,
        }
    }

    pub fn capability(&self, provider: Provider) -> &dyn WalletCapability {
        match provider {
            Provider::Embedded => self.embedded_cap.as_ref(),
            Provider::External => self.external_cap.as_ref(),
        }
    }
}

/// `transactionHash` field if the backend segments one, else the raw value.
pub fn extract_transaction_hash(response: &Value) -> String {
    match response {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("transactionHash")
            .or_else(|| map.get("transaction_hash"))
            .or_else(|| map.get("opHash"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| response.to_string()),
        other => other.to_string(),
    }
}
