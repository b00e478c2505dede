//! Configuration Types
//!
//! Provider endpoints/credentials and the local flow settings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::types::AuthCodeOption;

/// How long to wait for the browser callback.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Local path that redirects to the consent page.
pub const DEFAULT_START_PATH: &str = "/auth";

/// HTTP timeout for token endpoint requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page served after a successful callback.
pub const DEFAULT_SUCCESS_PAGE: &str = include_str!("../../assets/success.html");

/// Configuration of the standard HTTP provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Consent page URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Redirect URL registered with the provider.
    pub redirect_url: String,
    /// Requested scopes, in order.
    pub scopes: Vec<String>,
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// HTTP timeout.
    pub timeout: Duration,
}

/// Client credentials for OAuth2 authentication.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret. Installed apps usually get a non-confidential one.
    pub client_secret: Option<SecretString>,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_method: ClientAuthMethod::ClientSecretPost,
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    #[default]
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    ClientSecretBasic,
    /// No client authentication (public client).
    None,
}

/// Settings of the cache and the interactive flow.
#[derive(Clone, Debug)]
pub struct LocalFlowConfig {
    /// Service name used to namespace the cache. Empty disables caching.
    pub service_name: String,
    /// Directory under which per-service token files live.
    pub cache_root: PathBuf,
    /// How long to wait for the callback.
    pub callback_timeout: Duration,
    /// Local path redirecting to the consent page.
    pub start_path: String,
    /// Listening port; inferred from the redirect URL when unset.
    pub port: Option<u16>,
    /// HTML body served after a successful callback.
    pub success_page: Arc<str>,
    /// Extra consent URL options. Offline access is always added.
    pub auth_options: Vec<AuthCodeOption>,
}

impl Default for LocalFlowConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            cache_root: std::env::temp_dir(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            start_path: DEFAULT_START_PATH.to_string(),
            port: None,
            success_page: Arc::from(DEFAULT_SUCCESS_PAGE),
            auth_options: vec![AuthCodeOption::AccessTypeOffline],
        }
    }
}

impl LocalFlowConfig {
    /// Default settings for a service.
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_flow_defaults() {
        let config = LocalFlowConfig::for_service("drive");
        assert_eq!(config.service_name, "drive");
        assert_eq!(config.callback_timeout, Duration::from_secs(300));
        assert_eq!(config.start_path, "/auth");
        assert_eq!(config.cache_root, std::env::temp_dir());
        assert!(config.port.is_none());
        assert!(config.success_page.contains("<html"));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = ClientCredentials {
            client_id: "client".to_string(),
            client_secret: Some(SecretString::new("hunter2".to_string())),
            auth_method: ClientAuthMethod::ClientSecretBasic,
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("client"));
        assert!(!debug.contains("hunter2"));
    }
}
