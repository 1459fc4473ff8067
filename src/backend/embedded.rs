//! Embedded wallet client boundary.

use super::{extract_transaction_hash, TransactionIntent, WalletCapability};
use crate::errors::BackendResult;
use crate::identity::Provider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Extra authentication parameters for the "login with params" flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    pub id: String,
    pub nonce: String,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self { id: "my-dapp".into(), nonce: "sample nonce".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOptions {
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_params: Option<AuthParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub signature: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Login response. `pkh` may be missing on a malformed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmbeddedLoginResponse {
    pub pkh: Option<String>,
    #[serde(default)]
    pub user_data: Value,
    #[serde(default)]
    pub auth_response: Option<AuthResponse>,
}

impl EmbeddedLoginResponse {
    pub fn display_name(&self) -> Option<String> {
        user_name(&self.user_data)
    }
}

/// User restored by the embedded client's init call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedUser {
    pub pkh: String,
    #[serde(default)]
    pub user_data: Value,
}

impl EmbeddedUser {
    pub fn display_name(&self) -> Option<String> {
        user_name(&self.user_data)
    }
}

fn user_name(user_data: &Value) -> Option<String> {
    user_data.get("name").and_then(|v| v.as_str()).map(String::from)
}

#[async_trait]
pub trait EmbeddedBackend: Send + Sync {
    /// Initialize and report the already-active user, if any.
    async fn restore(&self) -> BackendResult<Option<EmbeddedUser>>;
    async fn login(&self, options: &LoginOptions) -> BackendResult<EmbeddedLoginResponse>;
    async fn sign_expr(&self, expression: &str) -> BackendResult<String>;
    /// Raw response; may or may not segment a `transactionHash`.
    async fn send(&self, operations: &[TransactionIntent]) -> BackendResult<Value>;
    async fn logout(&self) -> BackendResult<()>;
}

pub struct EmbeddedCapability {
    client: Arc<dyn EmbeddedBackend>,
}

impl EmbeddedCapability {
    pub fn new(client: Arc<dyn EmbeddedBackend>) -> Self { Self { client } }
}

#[async_trait]
impl WalletCapability for EmbeddedCapability {
    fn provider(&self) -> Provider { Provider::Embedded }

    async fn sign(&self, payload: &str) -> BackendResult<String> {
        self.client.sign_expr(payload).await
    }

    async fn send(&self, operations: &[TransactionIntent]) -> BackendResult<String> {
        let raw = self.client.send(operations).await?;
        Ok(extract_transaction_hash(&raw))
    }

    async fn logout(&self) -> BackendResult<()> {
        self.client.logout().await
    }
}
