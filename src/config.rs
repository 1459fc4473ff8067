//! Configuration - passed from higher layers, optionally overlaid from env.

use crate::backend::{AuthParams, LoginOptions};
use crate::errors::{WalletError, WalletResult};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_ROOT: &str = "DUOWALLET_ROOT";
pub const ENV_TEMPLATE: &str = "DUOWALLET_TEMPLATE";
pub const ENV_CALL_TIMEOUT_MS: &str = "DUOWALLET_CALL_TIMEOUT_MS";

pub const DEFAULT_TEMPLATE: &str = "objkt";

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub app: String,
    /// Embedded login template.
    pub template: String,
    /// Sent with `LoginWithParams`.
    pub auth_params: AuthParams,
    /// Per backend call. `None` waits forever.
    pub call_timeout: Option<Duration>,
    pub root: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app: "duowallet".into(),
            template: DEFAULT_TEMPLATE.into(),
            auth_params: AuthParams::default(),
            call_timeout: None,
            root: None,
        }
    }
}

impl WalletConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_template(mut self, t: impl Into<String>) -> Self { self.template = t.into(); self }
    pub fn with_auth_params(mut self, p: AuthParams) -> Self { self.auth_params = p; self }
    pub fn with_call_timeout(mut self, d: Duration) -> Self { self.call_timeout = Some(d); self }
    pub fn with_root(mut self, path: impl Into<PathBuf>) -> Self { self.root = Some(path.into()); self }

    /// Defaults overlaid with `DUOWALLET_*` environment variables.
    pub fn from_env(app: impl Into<String>) -> WalletResult<Self> {
        let mut config = Self::new(app);
        if let Ok(root) = std::env::var(ENV_ROOT) {
            config.root = Some(PathBuf::from(root));
        }
        if let Ok(template) = std::env::var(ENV_TEMPLATE) {
            if !template.trim().is_empty() {
                config.template = template;
            }
        }
        if let Ok(raw) = std::env::var(ENV_CALL_TIMEOUT_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|e| WalletError::Config(format!("{ENV_CALL_TIMEOUT_MS}={raw}: {e}")))?;
            config.call_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(config)
    }

    pub fn login_options(&self, with_params: bool) -> LoginOptions {
        LoginOptions {
            template: self.template.clone(),
            auth_params: with_params.then(|| self.auth_params.clone()),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
        root.join(&self.app)
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_dir().join("sessions.json")
    }
}
