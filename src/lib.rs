//! Duowallet: one session over two wallet backends.
//!
//! An embedded custodial-style wallet and an external wallet-connect client
//! sit behind a single dispatcher. The rest of the application sees one
//! [`Identity`] and one [`OperationResult`] shape, whichever backend
//! authenticated the user.
//!
//! # Architecture
//!
//! ```text
//! presentation (CLI / HTTP)
//!   │
//!   ├── Dispatcher ── dispatch(OperationRequest) → OperationResult
//!   │     │
//!   │     ├── Reconciler (startup: join both restores, embedded wins)
//!   │     │
//!   │     └── Backends
//!   │           ├── EmbeddedBackend  (login templates, sign_expr, send)
//!   │           └── ExternalBackend  (permissions, sign payload, operations)
//!   │
//!   └── SessionState (watch channel: status, identity, last response)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use duowallet::{Backends, Dispatcher, OperationRequest, SessionState, WalletConfig};
//!
//! let backends = Backends::new(embedded_client, external_client);
//! let mut dispatcher = Dispatcher::new(backends, SessionState::new(), WalletConfig::new("myapp"));
//! dispatcher.reconcile().await?;
//!
//! let result = dispatcher.dispatch(OperationRequest::Login).await;
//! let who = dispatcher.identity();
//! ```

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod reconciler;
pub mod session;
#[cfg(feature = "server")]
pub mod server;

pub use backend::{Backends, EmbeddedBackend, ExternalBackend, TransactionIntent, WalletCapability};
pub use config::WalletConfig;
pub use dispatcher::{Dispatcher, ErrorPolicy, OperationRequest, OperationResult};
pub use errors::{BackendError, BackendErrorKind, BackendResult, FailureReason, WalletError, WalletResult};
pub use identity::{Identity, Provider};
pub use reconciler::Reconciler;
pub use session::{AppStatus, SessionSnapshot, SessionState};
