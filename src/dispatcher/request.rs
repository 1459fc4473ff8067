//! Request and result shapes exposed to the presentation layer.

use crate::backend::TransactionIntent;
use crate::errors::FailureReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationRequest {
    Login,
    LoginWithParams,
    Logout,
    /// Opaque expression, e.g. a micheline-packed message.
    Sign { expression: String },
    SignWithParams { expression: String },
    Send { operations: Vec<TransactionIntent> },
}

impl OperationRequest {
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Login => "login",
            OperationRequest::LoginWithParams => "login_with_params",
            OperationRequest::Logout => "logout",
            OperationRequest::Sign { .. } => "sign",
            OperationRequest::SignWithParams { .. } => "sign_with_params",
            OperationRequest::Send { .. } => "send",
        }
    }
}

/// Normalized outcome. `value` is a signature, a transaction hash, or an
/// auth artifact; login and logout usually carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationResult {
    Success { value: Option<String> },
    NoOp,
    Failed { reason: FailureReason },
}

impl OperationResult {
    pub fn failed(reason: FailureReason) -> Self { OperationResult::Failed { reason } }

    pub fn is_success(&self) -> bool { matches!(self, OperationResult::Success { .. }) }

    pub fn value(&self) -> Option<&str> {
        match self {
            OperationResult::Success { value } => value.as_deref(),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            OperationResult::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
