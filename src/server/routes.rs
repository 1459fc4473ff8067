//! HTTP routes for the presentation layer

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatcher::{Dispatcher, OperationRequest, OperationResult};
use crate::identity::Identity;
use crate::session::{SessionSnapshot, SessionState};

/// The mutex serializes dispatch calls; session reads bypass it.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Mutex<Dispatcher>>,
    pub session: SessionState,
    pub app_name: String,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, app_name: impl Into<String>) -> Self {
        let session = dispatcher.session().clone();
        Self { dispatcher: Arc::new(Mutex::new(dispatcher)), session, app_name: app_name.into() }
    }
}

#[derive(Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub status_line: String,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub identity: Option<Identity>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session))
        .route("/dispatch", post(dispatch))
        .route("/reconcile", post(reconcile))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health(State(s): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": s.app_name,
        "ready": s.session.is_ready(),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn session(State(s): State<AppState>) -> Json<SessionResponse> {
    let snapshot = s.session.snapshot();
    Json(SessionResponse { status_line: snapshot.status_line(), snapshot })
}

pub async fn dispatch(State(s): State<AppState>, Json(request): Json<OperationRequest>) -> Json<OperationResult> {
    let mut dispatcher = s.dispatcher.lock().await;
    Json(dispatcher.dispatch(request).await)
}

pub async fn reconcile(State(s): State<AppState>) -> Result<Json<ReconcileResponse>, (StatusCode, String)> {
    let mut dispatcher = s.dispatcher.lock().await;
    match dispatcher.reconcile().await {
        Ok(identity) => Ok(Json(ReconcileResponse { identity })),
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}
