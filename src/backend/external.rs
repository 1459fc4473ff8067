//! Wallet-connect protocol client boundary.

use super::{TransactionIntent, WalletCapability};
use crate::errors::BackendResult;
use crate::identity::Provider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub address: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPayloadResponse {
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

#[async_trait]
pub trait ExternalBackend: Send + Sync {
    async fn active_account(&self) -> BackendResult<Option<ExternalAccount>>;
    /// Pair with an external wallet. `None` when the user closes the prompt.
    async fn request_permissions(&self) -> BackendResult<Option<PermissionResponse>>;
    async fn request_sign_payload(&self, payload: &str) -> BackendResult<SignPayloadResponse>;
    async fn request_operation(&self, operations: &[TransactionIntent]) -> BackendResult<OperationResponse>;
    async fn remove_all_accounts(&self) -> BackendResult<()>;
}

pub struct ExternalCapability {
    client: Arc<dyn ExternalBackend>,
}

impl ExternalCapability {
    pub fn new(client: Arc<dyn ExternalBackend>) -> Self { Self { client } }
}

#[async_trait]
impl WalletCapability for ExternalCapability {
    fn provider(&self) -> Provider { Provider::External }

    async fn sign(&self, payload: &str) -> BackendResult<String> {
        Ok(self.client.request_sign_payload(payload).await?.signature)
    }

    async fn send(&self, operations: &[TransactionIntent]) -> BackendResult<String> {
        Ok(self.client.request_operation(operations).await?.transaction_hash)
    }

    async fn logout(&self) -> BackendResult<()> {
        self.client.remove_all_accounts().await
    }
}
