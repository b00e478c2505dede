//! Standard Provider
//!
//! RFC 6749 authorization code and refresh grants against a token endpoint,
//! sent through an [`HttpTransport`].

use async_trait::async_trait;
use base64::Engine;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::core::{HttpMethod, HttpRequest, HttpTransport, ReqwestHttpTransport};
use crate::error::{create_error_from_response, ConfigurationError, LocalAuthResult, ProtocolError};
use crate::provider::OAuth2Provider;
use crate::types::{AuthCodeOption, ClientAuthMethod, ProviderConfig, Token, TokenResponse};

/// Provider speaking the standard token endpoint protocol.
pub struct StandardProvider<T: HttpTransport = ReqwestHttpTransport> {
    config: ProviderConfig,
    authorization_endpoint: Url,
    transport: Arc<T>,
}

impl StandardProvider<ReqwestHttpTransport> {
    /// Create a provider using the reqwest transport.
    pub fn new(config: ProviderConfig) -> LocalAuthResult<Self> {
        let transport = ReqwestHttpTransport::with_options(
            config.timeout,
            crate::core::MAX_RESPONSE_SIZE,
        )?;
        Self::with_transport(config, Arc::new(transport))
    }
}

impl<T: HttpTransport> StandardProvider<T> {
    /// Create a provider with a custom transport.
    pub fn with_transport(config: ProviderConfig, transport: Arc<T>) -> LocalAuthResult<Self> {
        let authorization_endpoint = Url::parse(&config.authorization_endpoint).map_err(|e| {
            ConfigurationError::InvalidUrl {
                url: config.authorization_endpoint.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            config,
            authorization_endpoint,
            transport,
        })
    }

    /// Provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_token_request_body(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> LocalAuthResult<String> {
        let credentials = &self.config.credentials;
        match credentials.auth_method {
            ClientAuthMethod::ClientSecretPost => {
                params.push(("client_id", credentials.client_id.clone()));
                if let Some(secret) = &credentials.client_secret {
                    params.push(("client_secret", secret.expose_secret().to_string()));
                }
            }
            ClientAuthMethod::None => {
                params.push(("client_id", credentials.client_id.clone()));
            }
            ClientAuthMethod::ClientSecretBasic => {}
        }

        serde_urlencoded::to_string(&params).map_err(|e| {
            ProtocolError::InvalidResponse {
                message: format!("encoding token request: {}", e),
            }
            .into()
        })
    }

    fn build_token_request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        let credentials = &self.config.credentials;
        if credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
            let secret = credentials
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().as_str())
                .unwrap_or_default();
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", credentials.client_id, secret));
            headers.insert("authorization".to_string(), format!("Basic {}", encoded));
        }

        headers
    }

    async fn request_token(
        &self,
        grant: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> LocalAuthResult<Token> {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.config.token_endpoint.clone(),
            headers: self.build_token_request_headers(),
            body: Some(self.build_token_request_body(params)?),
            timeout: Some(self.config.timeout),
        };

        let response = self.transport.send(request).await?;
        debug!(status = response.status, grant, "token endpoint responded");

        if response.status != 200 {
            return Err(create_error_from_response(response.status, &response.body));
        }

        let token_response: TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| ProtocolError::InvalidJson {
                message: e.to_string(),
            })?;

        Ok(Token::from_response(token_response))
    }
}

#[async_trait]
impl<T: HttpTransport> OAuth2Provider for StandardProvider<T> {
    fn redirect_url(&self) -> &str {
        &self.config.redirect_url
    }

    fn scopes(&self) -> &[String] {
        &self.config.scopes
    }

    fn authorization_url(&self, state: &str, options: &[AuthCodeOption]) -> String {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.credentials.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_url);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            query.append_pair("state", state);
            for option in options {
                query.append_pair(option.key(), option.value());
            }
        }
        url.to_string()
    }

    async fn exchange(&self, code: &str) -> LocalAuthResult<Token> {
        self.request_token(
            "authorization_code",
            vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.to_string()),
                ("redirect_uri", self.config.redirect_url.clone()),
            ],
        )
        .await
    }

    async fn refresh(&self, token: &Token) -> LocalAuthResult<Token> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();

        let mut refreshed = self
            .request_token(
                "refresh_token",
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("refresh_token", refresh_token.clone()),
                ],
            )
            .await?;

        // Providers may omit the refresh token when it is unchanged.
        if !refreshed.has_refresh_token() {
            refreshed.refresh_token = Some(refresh_token);
        }

        Ok(refreshed)
    }
}
