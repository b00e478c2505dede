//! Authorization Types
//!
//! Options appended to the provider's consent URL.

use serde::{Deserialize, Serialize};

/// Prompt behavior for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Do not display any authentication or consent UI.
    None,
    /// Force re-authentication.
    Login,
    /// Force consent screen.
    Consent,
    /// Force account selection.
    SelectAccount,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

/// Extra query parameter for the authorization URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthCodeOption {
    /// `access_type=offline`: ask the provider to issue a refresh token.
    AccessTypeOffline,
    /// `access_type=online`.
    AccessTypeOnline,
    /// `prompt=...`.
    Prompt(Prompt),
    /// `login_hint=...`.
    LoginHint(String),
    /// Arbitrary `key=value` pair.
    Param { key: String, value: String },
}

impl AuthCodeOption {
    /// Arbitrary parameter.
    pub fn param(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Param {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Query parameter name.
    pub fn key(&self) -> &str {
        match self {
            Self::AccessTypeOffline | Self::AccessTypeOnline => "access_type",
            Self::Prompt(_) => "prompt",
            Self::LoginHint(_) => "login_hint",
            Self::Param { key, .. } => key,
        }
    }

    /// Query parameter value.
    pub fn value(&self) -> &str {
        match self {
            Self::AccessTypeOffline => "offline",
            Self::AccessTypeOnline => "online",
            Self::Prompt(prompt) => prompt.as_str(),
            Self::LoginHint(hint) => hint,
            Self::Param { value, .. } => value,
        }
    }
}

/// Resolve the options sent with every consent URL.
///
/// Offline access is always requested; a conflicting `access_type` option is
/// replaced.
pub fn with_offline_access(options: &[AuthCodeOption]) -> Vec<AuthCodeOption> {
    let mut resolved: Vec<AuthCodeOption> = options
        .iter()
        .filter(|opt| opt.key() != "access_type")
        .cloned()
        .collect();
    resolved.insert(0, AuthCodeOption::AccessTypeOffline);
    resolved
}
