//! Session state - the live identity plus what the presentation layer shows.
//!
//! Single writer (reconciler at startup, dispatcher afterwards), many
//! readers. Readers hold a cheap clone or a `watch` receiver.

use crate::identity::Identity;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    #[default]
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SessionSnapshot {
    pub status: AppStatus,
    pub identity: Option<Identity>,
    /// Last displayed result value (signature, hash, auth artifact).
    pub response: Option<String>,
}

impl SessionSnapshot {
    pub fn status_line(&self) -> String {
        match (&self.status, &self.identity) {
            (AppStatus::Loading, _) => "Loading".into(),
            (AppStatus::Ready, None) => "No User".into(),
            (AppStatus::Ready, Some(identity)) => identity.label(),
        }
    }
}

#[derive(Clone)]
pub struct SessionState {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self { Self::new() }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn get(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    pub(crate) fn set(&self, identity: Option<Identity>) {
        self.tx.send_modify(|s| s.identity = identity);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().status == AppStatus::Ready
    }

    pub(crate) fn mark_ready(&self) {
        self.tx.send_modify(|s| s.status = AppStatus::Ready);
    }

    pub fn response(&self) -> Option<String> {
        self.tx.borrow().response.clone()
    }

    pub(crate) fn set_response(&self, response: Option<String>) {
        self.tx.send_modify(|s| s.response = response);
    }
}
