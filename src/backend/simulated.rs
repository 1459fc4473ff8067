//! In-process backends for the demo CLI and tests.
//!
//! Both clients are scriptable per call and record every call they receive.
//! Sessions can be persisted to a shared JSON [`SessionFile`] so a restore
//! after restart sees the previous login, the way the real clients keep
//! their own session storage.

use super::{
    EmbeddedBackend, EmbeddedLoginResponse, EmbeddedUser, ExternalAccount, ExternalBackend, LoginOptions,
    OperationResponse, PermissionResponse, SignPayloadResponse, TransactionIntent, AuthResponse,
};
use crate::errors::{BackendError, BackendResult, WalletError, WalletResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const DEMO_ADDRESS: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";
pub const DEMO_EXTERNAL_ADDRESS: &str = "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6";

/// Entries kept per call log; older ones are dropped first.
pub const CALL_LOG_CAPACITY: usize = 256;

/// Shared call log; entries are `"<backend>.<call>"`, most recent
/// [`CALL_LOG_CAPACITY`] only.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<VecDeque<String>>>);

impl CallLog {
    fn record(&self, call: &str) {
        if let Ok(mut calls) = self.0.lock() {
            if calls.len() == CALL_LOG_CAPACITY {
                calls.pop_front();
            }
            calls.push_back(call.to_string());
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().map(|c| c.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionDoc {
    embedded: Option<EmbeddedUser>,
    external: Option<ExternalAccount>,
    updated_at: Option<DateTime<Utc>>,
}

/// JSON file holding both simulated backends' sessions.
#[derive(Debug)]
pub struct SessionFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SessionFile {
    pub fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self { path: path.into(), lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn err(&self, message: String) -> WalletError {
        WalletError::SessionFile { path: self.path.display().to_string(), message }
    }

    fn load(&self) -> WalletResult<SessionDoc> {
        if !self.path.exists() {
            return Ok(SessionDoc::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.err(format!("read: {e}")))?;
        serde_json::from_str(&raw).map_err(|e| self.err(format!("json: {e}")))
    }

    fn update(&self, f: impl FnOnce(&mut SessionDoc)) -> WalletResult<()> {
        let _guard = self.lock.lock().map_err(|_| self.err("lock poisoned".into()))?;
        let mut doc = self.load()?;
        f(&mut doc);
        doc.updated_at = Some(Utc::now());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.err(format!("mkdir: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(&doc).map_err(|e| self.err(format!("json: {e}")))?;
        std::fs::write(&self.path, raw).map_err(|e| self.err(format!("write: {e}")))
    }

    fn embedded(&self) -> BackendResult<Option<EmbeddedUser>> {
        self.load().map(|d| d.embedded).map_err(storage_error)
    }

    fn external(&self) -> BackendResult<Option<ExternalAccount>> {
        self.load().map(|d| d.external).map_err(storage_error)
    }
}

fn storage_error(e: WalletError) -> BackendError {
    BackendError::other(e.to_string()).with_error_id("SESSION_STORAGE")
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(&hasher.finalize().as_bytes()[..24])
}

/// Scripted outcome of the embedded login modal.
#[derive(Debug, Clone)]
pub enum LoginScript {
    Succeed { address: String, name: Option<String> },
    /// User picked "other wallets"; embedded client declines.
    OtherWallets,
    /// Reply carries no `pkh`.
    MissingKey,
    Fail(BackendError),
}

impl Default for LoginScript {
    fn default() -> Self {
        LoginScript::Succeed { address: DEMO_ADDRESS.into(), name: Some("alice".into()) }
    }
}

#[derive(Default)]
struct EmbeddedInner {
    user: Option<EmbeddedUser>,
    login: LoginScript,
    failures: HashMap<&'static str, BackendError>,
}

#[derive(Default)]
pub struct SimulatedEmbedded {
    inner: Mutex<EmbeddedInner>,
    calls: CallLog,
    store: Option<Arc<SessionFile>>,
}

impl SimulatedEmbedded {
    pub fn new() -> Self { Self::default() }

    pub fn with_calls(mut self, calls: CallLog) -> Self { self.calls = calls; self }
    pub fn with_store(mut self, store: Arc<SessionFile>) -> Self { self.store = Some(store); self }

    pub fn with_session(self, address: impl Into<String>, name: Option<&str>) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.user = Some(EmbeddedUser { pkh: address.into(), user_data: json!({ "name": name }) });
        }
        self
    }

    pub fn with_login(self, script: LoginScript) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.login = script;
        }
        self
    }

    /// Make `call` (`restore`, `login`, `sign_expr`, `send`, `logout`) fail.
    pub fn failing(self, call: &'static str, err: BackendError) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures.insert(call, err);
        }
        self
    }

    pub fn calls(&self) -> &CallLog { &self.calls }

    fn enter(&self, call: &'static str) -> BackendResult<std::sync::MutexGuard<'_, EmbeddedInner>> {
        self.calls.record(&format!("embedded.{call}"));
        let inner = self.inner.lock().map_err(|_| BackendError::other("embedded lock"))?;
        if let Some(err) = inner.failures.get(call).cloned() {
            return Err(err);
        }
        Ok(inner)
    }

    fn current_user(&self, inner: &EmbeddedInner) -> BackendResult<Option<EmbeddedUser>> {
        match &self.store {
            Some(store) => store.embedded(),
            None => Ok(inner.user.clone()),
        }
    }

    fn persist(&self, inner: &mut EmbeddedInner, user: Option<EmbeddedUser>) -> BackendResult<()> {
        inner.user = user.clone();
        if let Some(store) = &self.store {
            store.update(|doc| doc.embedded = user).map_err(storage_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddedBackend for SimulatedEmbedded {
    async fn restore(&self) -> BackendResult<Option<EmbeddedUser>> {
        let inner = self.enter("restore")?;
        self.current_user(&inner)
    }

    async fn login(&self, options: &LoginOptions) -> BackendResult<EmbeddedLoginResponse> {
        let mut inner = self.enter("login")?;
        match inner.login.clone() {
            LoginScript::Succeed { address, name } => {
                let user_data = json!({ "name": name, "template": options.template });
                let auth_response = options.auth_params.as_ref().map(|p| AuthResponse {
                    signature: format!("edsig{}", digest(&[&address, &p.id, &p.nonce])),
                    message: Some(format!("{} {}", p.id, p.nonce)),
                });
                self.persist(&mut inner, Some(EmbeddedUser { pkh: address.clone(), user_data: user_data.clone() }))?;
                Ok(EmbeddedLoginResponse { pkh: Some(address), user_data, auth_response })
            }
            LoginScript::OtherWallets => {
                Err(BackendError::unsupported("user selected other wallets").with_error_id("OTHER_WALLETS"))
            }
            LoginScript::MissingKey => Ok(EmbeddedLoginResponse { pkh: None, user_data: Value::Null, auth_response: None }),
            LoginScript::Fail(err) => Err(err),
        }
    }

    async fn sign_expr(&self, expression: &str) -> BackendResult<String> {
        let inner = self.enter("sign_expr")?;
        let user = self.current_user(&inner)?.ok_or_else(|| BackendError::rejected("not logged in"))?;
        Ok(format!("edsig{}", digest(&[&user.pkh, expression])))
    }

    async fn send(&self, operations: &[TransactionIntent]) -> BackendResult<Value> {
        let inner = self.enter("send")?;
        let user = self.current_user(&inner)?.ok_or_else(|| BackendError::rejected("not logged in"))?;
        let body = Value::Array(operations.to_vec()).to_string();
        Ok(Value::String(format!("oo{}", digest(&[&user.pkh, &body]))))
    }

    async fn logout(&self) -> BackendResult<()> {
        let mut inner = self.enter("logout")?;
        self.persist(&mut inner, None)
    }
}

/// Scripted outcome of the external wallet's permission prompt.
#[derive(Debug, Clone)]
pub enum PermissionScript {
    Grant(String),
    /// Prompt closed without an answer.
    Dismiss,
    Fail(BackendError),
}

impl Default for PermissionScript {
    fn default() -> Self { PermissionScript::Grant(DEMO_EXTERNAL_ADDRESS.into()) }
}

#[derive(Default)]
struct ExternalInner {
    account: Option<ExternalAccount>,
    permission: PermissionScript,
    failures: HashMap<&'static str, BackendError>,
}

pub struct SimulatedExternal {
    inner: Mutex<ExternalInner>,
    calls: CallLog,
    store: Option<Arc<SessionFile>>,
    events: broadcast::Sender<Option<ExternalAccount>>,
}

impl Default for SimulatedExternal {
    fn default() -> Self { Self::new() }
}

impl SimulatedExternal {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { inner: Mutex::new(ExternalInner::default()), calls: CallLog::default(), store: None, events }
    }

    pub fn with_calls(mut self, calls: CallLog) -> Self { self.calls = calls; self }
    pub fn with_store(mut self, store: Arc<SessionFile>) -> Self { self.store = Some(store); self }

    pub fn with_session(self, address: impl Into<String>) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.account = Some(ExternalAccount { address: address.into() });
        }
        self
    }

    pub fn with_permission(self, script: PermissionScript) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.permission = script;
        }
        self
    }

    /// Make `call` (`active_account`, `request_permissions`, `request_sign_payload`,
    /// `request_operation`, `remove_all_accounts`) fail.
    pub fn failing(self, call: &'static str, err: BackendError) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures.insert(call, err);
        }
        self
    }

    pub fn calls(&self) -> &CallLog { &self.calls }

    /// Active-account-set notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Option<ExternalAccount>> {
        self.events.subscribe()
    }

    fn enter(&self, call: &'static str) -> BackendResult<std::sync::MutexGuard<'_, ExternalInner>> {
        self.calls.record(&format!("external.{call}"));
        let inner = self.inner.lock().map_err(|_| BackendError::other("external lock"))?;
        if let Some(err) = inner.failures.get(call).cloned() {
            return Err(err);
        }
        Ok(inner)
    }

    fn current_account(&self, inner: &ExternalInner) -> BackendResult<Option<ExternalAccount>> {
        match &self.store {
            Some(store) => store.external(),
            None => Ok(inner.account.clone()),
        }
    }

    fn persist(&self, inner: &mut ExternalInner, account: Option<ExternalAccount>) -> BackendResult<()> {
        inner.account = account.clone();
        if let Some(store) = &self.store {
            let stored = account.clone();
            store.update(|doc| doc.external = stored).map_err(storage_error)?;
        }
        let _ = self.events.send(account);
        Ok(())
    }
}

#[async_trait]
impl ExternalBackend for SimulatedExternal {
    async fn active_account(&self) -> BackendResult<Option<ExternalAccount>> {
        let inner = self.enter("active_account")?;
        self.current_account(&inner)
    }

    async fn request_permissions(&self) -> BackendResult<Option<PermissionResponse>> {
        let mut inner = self.enter("request_permissions")?;
        match inner.permission.clone() {
            PermissionScript::Grant(address) => {
                self.persist(&mut inner, Some(ExternalAccount { address: address.clone() }))?;
                Ok(Some(PermissionResponse { address, scopes: vec!["sign".into(), "operation_request".into()] }))
            }
            PermissionScript::Dismiss => Ok(None),
            PermissionScript::Fail(err) => Err(err),
        }
    }

    async fn request_sign_payload(&self, payload: &str) -> BackendResult<SignPayloadResponse> {
        let inner = self.enter("request_sign_payload")?;
        let account = self.current_account(&inner)?.ok_or_else(|| BackendError::rejected("no active account"))?;
        Ok(SignPayloadResponse { signature: format!("edsig{}", digest(&[&account.address, payload])) })
    }

    async fn request_operation(&self, operations: &[TransactionIntent]) -> BackendResult<OperationResponse> {
        let inner = self.enter("request_operation")?;
        let account = self.current_account(&inner)?.ok_or_else(|| BackendError::rejected("no active account"))?;
        let body = Value::Array(operations.to_vec()).to_string();
        Ok(OperationResponse { transaction_hash: format!("oo{}", digest(&[&account.address, &body])) })
    }

    async fn remove_all_accounts(&self) -> BackendResult<()> {
        let mut inner = self.enter("remove_all_accounts")?;
        self.persist(&mut inner, None)
    }
}
