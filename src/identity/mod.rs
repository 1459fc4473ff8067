//! Identity - who is authenticated, independent of which backend did it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend that owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Embedded custodial-style wallet.
    Embedded,
    /// Wallet-connect protocol client paired with an external wallet app.
    External,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Embedded => "embedded",
            Provider::External => "external",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "embedded" | "kukai" => Some(Provider::Embedded),
            "external" | "beacon" => Some(Provider::External),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Unified, provider-tagged user record. At most one is live at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub display_name: Option<String>,
    pub provider: Provider,
}

impl Identity {
    /// Returns `None` for an empty address; an identity always carries one.
    pub fn new(address: impl Into<String>, display_name: Option<String>, provider: Provider) -> Option<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return None;
        }
        let display_name = display_name.filter(|n| !n.trim().is_empty());
        Some(Self { address, display_name, provider })
    }

    pub fn embedded(address: impl Into<String>, display_name: Option<String>) -> Option<Self> {
        Self::new(address, display_name, Provider::Embedded)
    }

    pub fn external(address: impl Into<String>) -> Option<Self> {
        Self::new(address, None, Provider::External)
    }

    /// Display name if present, otherwise the shortened address.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => format_address(&self.address),
        }
    }
}

/// `tz1arY7H...U9xq` style: first four and last four characters.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
