//! Dispatcher Tests: login fallback, routing, and failure policies
//!
//! These tests verify:
//! 1. Login fallback from embedded to external on "other wallets"
//! 2. Non-fallback failures never touch the external client
//! 3. Operations route only to the provider owning the identity
//! 4. Send errors are swallowed into Failed
//! 5. Logout always clears the session
//! 6. External account events wait for a successful reconcile

use duowallet::backend::simulated::{
    CallLog, LoginScript, PermissionScript, SimulatedEmbedded, SimulatedExternal, DEMO_ADDRESS, DEMO_EXTERNAL_ADDRESS,
};
use duowallet::backend::{EmbeddedBackend, EmbeddedLoginResponse, EmbeddedUser, LoginOptions, TransactionIntent};
use duowallet::{
    BackendError, BackendErrorKind, BackendResult, Backends, Dispatcher, FailureReason, OperationRequest, OperationResult,
    Provider, SessionState, WalletConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const EXPRESSION: &str = "0x05010000004254657a6f73205369676e6564204d657373616765";

fn payload() -> Vec<Value> {
    vec![json!({"kind": "transaction", "amount": "12345", "destination": "tz1arY7HNDq17nrZJ7f3sikxuHZgeopsU9xq"})]
}

async fn ready(embedded: SimulatedEmbedded, external: SimulatedExternal) -> (Dispatcher, CallLog) {
    let calls = CallLog::default();
    let backends = Backends::new(
        Arc::new(embedded.with_calls(calls.clone())),
        Arc::new(external.with_calls(calls.clone())),
    );
    let mut dispatcher = Dispatcher::new(backends, SessionState::new(), WalletConfig::new("test"));
    dispatcher.reconcile().await.expect("reconcile");
    (dispatcher, calls)
}

/// Test: Embedded login builds an embedded identity with its display name
#[tokio::test]
async fn login_embedded_success() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;

    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert_eq!(result, OperationResult::Success { value: None });

    let identity = dispatcher.identity().expect("identity");
    assert_eq!(identity.provider, Provider::Embedded);
    assert_eq!(identity.address, DEMO_ADDRESS);
    assert_eq!(identity.display_name.as_deref(), Some("alice"));
    assert_eq!(calls.count("external.request_permissions"), 0);
}

/// Test: "Other wallets" decline falls back to the external wallet
#[tokio::test]
async fn login_fallback_to_external() {
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new().with_permission(PermissionScript::Grant("tz1fallback".into())),
    )
    .await;

    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert!(result.is_success());
    assert_eq!(result.value(), None);

    let identity = dispatcher.identity().expect("identity");
    assert_eq!(identity.provider, Provider::External);
    assert_eq!(identity.address, "tz1fallback");
    assert_eq!(identity.display_name, None);
    assert_eq!(calls.count("embedded.login"), 1);
    assert_eq!(calls.count("external.request_permissions"), 1);
}

/// Test: Any other embedded error fails without fallback
#[tokio::test]
async fn login_other_error_does_not_fall_back() {
    for kind in [BackendErrorKind::Rejected, BackendErrorKind::Unreachable, BackendErrorKind::Other] {
        let (mut dispatcher, calls) = ready(
            SimulatedEmbedded::new().with_login(LoginScript::Fail(BackendError::new(kind, "boom"))),
            SimulatedExternal::new(),
        )
        .await;

        let result = dispatcher.dispatch(OperationRequest::Login).await;
        assert_eq!(
            result.failure(),
            Some(&FailureReason::Backend { provider: Provider::Embedded, kind, message: "boom".into() })
        );
        assert!(dispatcher.identity().is_none());
        assert_eq!(calls.count("external.request_permissions"), 0);
    }
}

/// Test: Response without pkh is a failure, not an identity
#[tokio::test]
async fn login_missing_key_fails() {
    let (mut dispatcher, _) = ready(SimulatedEmbedded::new().with_login(LoginScript::MissingKey), SimulatedExternal::new()).await;

    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert!(matches!(result.failure(), Some(FailureReason::MalformedResponse { provider: Provider::Embedded, .. })));
    assert!(dispatcher.identity().is_none());
}

/// Test: Fallback that yields no account, or errors, leaves identity absent
#[tokio::test]
async fn login_fallback_unavailable() {
    let (mut dispatcher, _) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new().with_permission(PermissionScript::Dismiss),
    )
    .await;
    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert_eq!(result.failure(), Some(&FailureReason::FallbackUnavailable));
    assert!(dispatcher.identity().is_none());

    let (mut dispatcher, _) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new().with_permission(PermissionScript::Fail(BackendError::rejected("aborted"))),
    )
    .await;
    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert!(matches!(result.failure(), Some(FailureReason::Backend { provider: Provider::External, .. })));
    assert!(dispatcher.identity().is_none());
}

/// Test: Login with params returns the auth signature and shows it
#[tokio::test]
async fn login_with_params_returns_artifact() {
    let (mut dispatcher, _) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;

    let result = dispatcher.dispatch(OperationRequest::LoginWithParams).await;
    let artifact = result.value().expect("artifact").to_string();
    assert!(artifact.starts_with("edsig"));
    assert_eq!(dispatcher.session().response(), Some(artifact));
}

/// Test: Login while a session is live does not switch identities
#[tokio::test]
async fn login_while_live_is_noop() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new().with_session("tz1live")).await;
    assert_eq!(dispatcher.identity().map(|i| i.provider), Some(Provider::External));

    assert_eq!(dispatcher.dispatch(OperationRequest::Login).await, OperationResult::NoOp);
    assert_eq!(dispatcher.identity().map(|i| i.address), Some("tz1live".to_string()));
    assert_eq!(calls.count("embedded.login"), 0);
}

/// Test: After embedded login, sign only reaches the embedded client
#[tokio::test]
async fn sign_routes_to_embedded_only() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;

    let result = dispatcher.dispatch(OperationRequest::Sign { expression: EXPRESSION.into() }).await;
    assert!(result.value().expect("signature").starts_with("edsig"));
    assert_eq!(dispatcher.identity().map(|i| i.provider), Some(Provider::Embedded));
    assert_eq!(calls.count("embedded.login"), 1);
    assert_eq!(calls.count("embedded.sign_expr"), 1);
    assert_eq!(calls.count("external.request_sign_payload"), 0);
    assert_eq!(calls.count("external.request_permissions"), 0);

    // Live identity: no second login
    dispatcher.dispatch(OperationRequest::Sign { expression: EXPRESSION.into() }).await;
    assert_eq!(calls.count("embedded.login"), 1);
    assert_eq!(calls.count("embedded.sign_expr"), 2);
    assert_eq!(calls.count("external."), 1); // startup active_account only
}

/// Test: Sign after fallback goes to the external wallet
#[tokio::test]
async fn sign_after_fallback_routes_external() {
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new(),
    )
    .await;

    let result = dispatcher.dispatch(OperationRequest::Sign { expression: EXPRESSION.into() }).await;
    assert!(result.is_success());
    assert_eq!(calls.count("external.request_sign_payload"), 1);
    assert_eq!(calls.count("embedded.sign_expr"), 0);
    assert_eq!(dispatcher.session().response().as_deref(), result.value());
}

/// Test: Sign fails cleanly when its implicit login fails
#[tokio::test]
async fn sign_without_login_fails() {
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::Fail(BackendError::unreachable("offline"))),
        SimulatedExternal::new(),
    )
    .await;

    let result = dispatcher.dispatch(OperationRequest::Sign { expression: EXPRESSION.into() }).await;
    assert!(result.failure().is_some());
    assert!(dispatcher.identity().is_none());
    assert_eq!(calls.count("embedded.sign_expr"), 0);
}

/// Test: SignWithParams only signs through the external wallet
#[tokio::test]
async fn sign_with_params_requires_external() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;
    let result = dispatcher.dispatch(OperationRequest::SignWithParams { expression: EXPRESSION.into() }).await;
    assert_eq!(result, OperationResult::NoOp);
    assert_eq!(dispatcher.identity().map(|i| i.provider), Some(Provider::Embedded));
    assert_eq!(calls.count("embedded.sign_expr"), 0);
    // The embedded auth artifact stays visible
    assert!(dispatcher.session().response().is_some());

    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new(),
    )
    .await;
    let result = dispatcher.dispatch(OperationRequest::SignWithParams { expression: EXPRESSION.into() }).await;
    assert!(result.value().expect("signature").starts_with("edsig"));
    assert_eq!(calls.count("external.request_sign_payload"), 1);
}

/// Test: Send returns the owning backend's transaction hash
#[tokio::test]
async fn send_routes_to_owner() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new().with_session(DEMO_ADDRESS, Some("alice")), SimulatedExternal::new()).await;
    let result = dispatcher.dispatch(OperationRequest::Send { operations: payload() }).await;
    assert!(result.value().expect("hash").starts_with("oo"));
    assert_eq!(calls.count("embedded.send"), 1);
    assert_eq!(calls.count("external.request_operation"), 0);

    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new().with_session(DEMO_EXTERNAL_ADDRESS)).await;
    let result = dispatcher.dispatch(OperationRequest::Send { operations: payload() }).await;
    assert!(result.value().expect("hash").starts_with("oo"));
    assert_eq!(calls.count("external.request_operation"), 1);
    assert_eq!(calls.count("embedded.send"), 0);
}

/// Test: Send needs a live identity and never logs in
#[tokio::test]
async fn send_without_identity() {
    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;
    let result = dispatcher.dispatch(OperationRequest::Send { operations: payload() }).await;
    assert_eq!(result.failure(), Some(&FailureReason::NoIdentity));
    assert_eq!(calls.count("embedded.login"), 0);
}

/// Test: Backend send errors come back as Failed; identity unchanged
#[tokio::test]
async fn send_failure_is_swallowed() {
    let err = BackendError::rejected("user aborted").with_error_id("ABORTED_ERROR");
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_session(DEMO_ADDRESS, None).failing("send", err),
        SimulatedExternal::new(),
    )
    .await;
    let before = dispatcher.identity();

    let result = dispatcher.dispatch(OperationRequest::Send { operations: payload() }).await;
    assert!(matches!(result.failure(), Some(FailureReason::Backend { provider: Provider::Embedded, kind: BackendErrorKind::Rejected, .. })));
    assert_eq!(dispatcher.identity(), before);
    assert_eq!(dispatcher.session().response(), None);
    assert_eq!(calls.count("embedded.send"), 1);
}

/// Test: External-owned send failure is reported once, identity kept
#[tokio::test]
async fn external_send_failure_is_swallowed() {
    let err = BackendError::rejected("operation aborted").with_error_id("ABORTED_ERROR");
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_login(LoginScript::OtherWallets),
        SimulatedExternal::new().failing("request_operation", err),
    )
    .await;
    assert!(dispatcher.dispatch(OperationRequest::Login).await.is_success());
    let before = dispatcher.identity();
    assert_eq!(before.as_ref().map(|i| i.provider), Some(Provider::External));

    let result = dispatcher.dispatch(OperationRequest::Send { operations: payload() }).await;
    assert!(matches!(result.failure(), Some(FailureReason::Backend { provider: Provider::External, kind: BackendErrorKind::Rejected, .. })));
    assert_eq!(dispatcher.identity(), before);
    assert_eq!(calls.count("external.request_operation"), 1);
    assert_eq!(calls.count("embedded.send"), 0);
}

/// Test: Logout clears identity even when the backend call fails
#[tokio::test]
async fn logout_always_clears() {
    let (mut dispatcher, calls) = ready(
        SimulatedEmbedded::new().with_session(DEMO_ADDRESS, None).failing("logout", BackendError::unreachable("offline")),
        SimulatedExternal::new(),
    )
    .await;
    assert!(dispatcher.identity().is_some());

    let result = dispatcher.dispatch(OperationRequest::Logout).await;
    assert!(result.is_success());
    assert!(dispatcher.identity().is_none());
    assert_eq!(dispatcher.session().response(), None);
    assert_eq!(calls.count("embedded.logout"), 1);

    let (mut dispatcher, calls) = ready(SimulatedEmbedded::new(), SimulatedExternal::new().with_session("tz1ext")).await;
    dispatcher.dispatch(OperationRequest::Logout).await;
    assert!(dispatcher.identity().is_none());
    assert_eq!(calls.count("external.remove_all_accounts"), 1);
    assert_eq!(calls.count("embedded.logout"), 0);

    // Nothing to log out of
    assert_eq!(dispatcher.dispatch(OperationRequest::Logout).await, OperationResult::NoOp);
}

/// Test: Nothing dispatches before reconcile marks the session ready
#[tokio::test]
async fn dispatch_before_reconcile_not_ready() {
    let backends = Backends::new(Arc::new(SimulatedEmbedded::new()), Arc::new(SimulatedExternal::new()));
    let mut dispatcher = Dispatcher::new(backends, SessionState::new(), WalletConfig::new("test"));
    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert_eq!(result.failure(), Some(&FailureReason::NotReady));
}

/// Test: External account events follow the external session only
#[tokio::test]
async fn external_account_events() {
    let (mut dispatcher, _) = ready(SimulatedEmbedded::new(), SimulatedExternal::new()).await;

    dispatcher.on_external_account(Some(duowallet::backend::ExternalAccount { address: "tz1evt".into() }));
    assert_eq!(dispatcher.identity().map(|i| i.provider), Some(Provider::External));
    dispatcher.on_external_account(None);
    assert!(dispatcher.identity().is_none());

    dispatcher.dispatch(OperationRequest::Login).await;
    dispatcher.on_external_account(Some(duowallet::backend::ExternalAccount { address: "tz1evt".into() }));
    assert_eq!(dispatcher.identity().map(|i| i.provider), Some(Provider::Embedded));
    dispatcher.on_external_account(None);
    assert!(dispatcher.identity().is_some());
}

/// Test: Account events before a successful reconcile leave the session alone
#[tokio::test]
async fn external_account_event_while_loading_is_ignored() {
    let backends = Backends::new(
        Arc::new(SimulatedEmbedded::new().failing("restore", BackendError::unreachable("offline"))),
        Arc::new(SimulatedExternal::new()),
    );
    let mut dispatcher = Dispatcher::new(backends, SessionState::new(), WalletConfig::new("test"));
    assert!(dispatcher.reconcile().await.is_err());

    dispatcher.on_external_account(Some(duowallet::backend::ExternalAccount { address: "tz1evt".into() }));
    assert!(dispatcher.identity().is_none());
    assert_eq!(dispatcher.session().snapshot().status_line(), "Loading");
}

struct HangingEmbedded;

#[async_trait::async_trait]
impl EmbeddedBackend for HangingEmbedded {
    async fn restore(&self) -> BackendResult<Option<EmbeddedUser>> { Ok(None) }
    async fn login(&self, _: &LoginOptions) -> BackendResult<EmbeddedLoginResponse> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(EmbeddedLoginResponse::default())
    }
    async fn sign_expr(&self, _: &str) -> BackendResult<String> { Err(BackendError::other("unused")) }
    async fn send(&self, _: &[TransactionIntent]) -> BackendResult<Value> { Err(BackendError::other("unused")) }
    async fn logout(&self) -> BackendResult<()> { Ok(()) }
}

/// Test: Configured call timeout turns a hung login into a non-fallback failure
#[tokio::test]
async fn login_timeout_fails_without_fallback() {
    let external = Arc::new(SimulatedExternal::new());
    let backends = Backends::new(Arc::new(HangingEmbedded), external.clone());
    let config = WalletConfig::new("test").with_call_timeout(Duration::from_millis(20));
    let mut dispatcher = Dispatcher::new(backends, SessionState::new(), config);
    dispatcher.reconcile().await.expect("reconcile");

    let result = dispatcher.dispatch(OperationRequest::Login).await;
    assert!(matches!(result.failure(), Some(FailureReason::Backend { kind: BackendErrorKind::Timeout, .. })));
    assert!(dispatcher.identity().is_none());
    assert_eq!(external.calls().count("external.request_permissions"), 0);
}
