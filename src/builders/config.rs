//! Configuration Builders
//!
//! Fluent builders for provider and local flow configuration.

use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, LocalAuthResult};
use crate::types::{
    AuthCodeOption, ClientAuthMethod, ClientCredentials, LocalFlowConfig, ProviderConfig,
    DEFAULT_HTTP_TIMEOUT,
};

fn missing(field: &str) -> ConfigurationError {
    ConfigurationError::MissingRequired {
        field: field.to_string(),
    }
}

fn validate_url(url: &str) -> Result<(), ConfigurationError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigurationError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
}

/// Provider configuration builder.
#[derive(Default)]
pub struct ProviderConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    auth_method: Option<ClientAuthMethod>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    timeout: Option<Duration>,
}

impl ProviderConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set redirect URL, e.g. `http://localhost:8080/callback`.
    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    /// Set scopes. Order matters for the cache location.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a scope.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Set token endpoint request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the provider configuration.
    pub fn build(self) -> LocalAuthResult<ProviderConfig> {
        let client_id = self.client_id.ok_or_else(|| missing("client_id"))?;
        let authorization_endpoint = self
            .authorization_endpoint
            .ok_or_else(|| missing("authorization_endpoint"))?;
        let token_endpoint = self
            .token_endpoint
            .ok_or_else(|| missing("token_endpoint"))?;
        let redirect_url = self.redirect_url.ok_or_else(|| missing("redirect_url"))?;

        validate_url(&authorization_endpoint)?;
        validate_url(&token_endpoint)?;
        validate_url(&redirect_url)?;

        let auth_method = self.auth_method.unwrap_or(if self.client_secret.is_some() {
            ClientAuthMethod::ClientSecretPost
        } else {
            ClientAuthMethod::None
        });

        if auth_method != ClientAuthMethod::None && self.client_secret.is_none() {
            return Err(missing("client_secret").into());
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "timeout must be positive".to_string(),
            }
            .into());
        }

        Ok(ProviderConfig {
            authorization_endpoint,
            token_endpoint,
            redirect_url,
            scopes: self.scopes,
            credentials: ClientCredentials {
                client_id,
                client_secret: self.client_secret,
                auth_method,
            },
            timeout,
        })
    }
}

/// Create a new provider configuration builder.
pub fn provider_config() -> ProviderConfigBuilder {
    ProviderConfigBuilder::new()
}

/// Local flow configuration builder.
pub struct LocalFlowConfigBuilder {
    config: LocalFlowConfig,
}

impl LocalFlowConfigBuilder {
    /// Start from defaults for `service_name`. An empty name disables caching.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            config: LocalFlowConfig::for_service(service_name),
        }
    }

    /// Set the directory under which token files live.
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = root.into();
        self
    }

    /// Set how long to wait for the browser callback.
    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.config.callback_timeout = timeout;
        self
    }

    /// Set the local path that redirects to the consent page.
    pub fn start_path(mut self, path: impl Into<String>) -> Self {
        self.config.start_path = path.into();
        self
    }

    /// Listen on `port` instead of inferring it from the redirect URL.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Set the HTML served after a successful callback.
    pub fn success_page(mut self, html: impl Into<String>) -> Self {
        self.config.success_page = Arc::from(html.into());
        self
    }

    /// Add a consent URL option.
    pub fn auth_option(mut self, option: AuthCodeOption) -> Self {
        self.config.auth_options.push(option);
        self
    }

    /// Build the local flow configuration.
    pub fn build(self) -> LocalAuthResult<LocalFlowConfig> {
        if self.config.callback_timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "callback timeout must be positive".to_string(),
            }
            .into());
        }

        if !self.config.start_path.starts_with('/') {
            return Err(ConfigurationError::InvalidConfig {
                message: format!(
                    "start path {:?} must begin with '/'",
                    self.config.start_path
                ),
            }
            .into());
        }

        if self.config.service_name.contains(['/', '\\']) || self.config.service_name == ".." {
            return Err(ConfigurationError::InvalidConfig {
                message: format!(
                    "service name {:?} must be a single path segment",
                    self.config.service_name
                ),
            }
            .into());
        }

        Ok(self.config)
    }
}

/// Create a new local flow configuration builder.
pub fn local_flow_config(service_name: impl Into<String>) -> LocalFlowConfigBuilder {
    LocalFlowConfigBuilder::new(service_name)
}
