//! Local OAuth2 Client
//!
//! Entry points for tools that need a token for one service: cached when
//! possible, refreshed when expired, granted in the browser otherwise.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{IntoUrl, Method, RequestBuilder, Response};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::{BrowserOpener, SystemBrowser};
use crate::error::{ConfigurationError, LocalAuthResult, NetworkError};
use crate::flows::BrowserFlow;
use crate::provider::{OAuth2Provider, StandardProvider};
use crate::token::{CacheLocation, TokenAcquirer, TokenCache};
use crate::types::{LocalFlowConfig, ProviderConfig, Token};

/// Token source for one (service, scopes) identity.
pub struct LocalOAuth2Client<
    P: OAuth2Provider = StandardProvider,
    B: BrowserOpener = SystemBrowser,
> {
    acquirer: TokenAcquirer<P, BrowserFlow<P, B>>,
}

impl LocalOAuth2Client<StandardProvider, SystemBrowser> {
    /// Create a client talking to a standard OAuth2 provider.
    pub fn new(
        provider_config: ProviderConfig,
        flow_config: &LocalFlowConfig,
    ) -> LocalAuthResult<Self> {
        let provider = Arc::new(StandardProvider::new(provider_config)?);
        Self::with_components(provider, Arc::new(SystemBrowser), flow_config)
    }
}

impl<P: OAuth2Provider, B: BrowserOpener> LocalOAuth2Client<P, B> {
    /// Create a client with custom components.
    pub fn with_components(
        provider: Arc<P>,
        browser: Arc<B>,
        flow_config: &LocalFlowConfig,
    ) -> LocalAuthResult<Self> {
        let flow = Arc::new(BrowserFlow::with_browser(
            provider.clone(),
            browser,
            flow_config,
        )?);
        let cache = TokenCache::new(flow_config.cache_root.clone());

        Ok(Self {
            acquirer: TokenAcquirer::new(provider, flow, cache, &flow_config.service_name),
        })
    }

    /// Where the token is cached.
    pub fn cache_location(&self) -> &CacheLocation {
        self.acquirer.location()
    }

    /// Get a usable token.
    pub async fn get_token(&self) -> LocalAuthResult<Token> {
        self.get_token_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Get a usable token, giving up when `cancel` fires.
    pub async fn get_token_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> LocalAuthResult<Token> {
        self.acquirer.acquire(cancel).await
    }

    /// Attach a usable token to `request`.
    pub async fn authorize(&self, request: RequestBuilder) -> LocalAuthResult<RequestBuilder> {
        let token = self.get_token().await?;
        Ok(request.header(AUTHORIZATION, authorization_value(&token)?))
    }

    /// Turn this token source into an HTTP client that authorizes every
    /// request.
    pub fn into_authorized_client(self) -> LocalAuthResult<AuthorizedClient<P, B>> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| NetworkError::ConnectionFailed {
                message: format!("building HTTP client: {}", e),
            })?;

        Ok(AuthorizedClient {
            source: self,
            http,
            current: Mutex::new(None),
        })
    }

    /// Delete the cached token so the next call grants a new one.
    pub async fn forget_token(&self) -> LocalAuthResult<()> {
        if let CacheLocation::File(path) = self.acquirer.location() {
            self.acquirer.cache().remove(path).await?;
            info!(path = %path.display(), "forgot cached token");
        }
        Ok(())
    }
}

fn authorization_value(token: &Token) -> LocalAuthResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&token.authorization_header()).map_err(|e| {
        ConfigurationError::InvalidConfig {
            message: format!("token is not a valid header value: {}", e),
        }
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// HTTP client sending a usable token with every request.
///
/// The token is held in memory and acquired again through the owning
/// client, refreshing or re-granting it, once it expires.
pub struct AuthorizedClient<
    P: OAuth2Provider = StandardProvider,
    B: BrowserOpener = SystemBrowser,
> {
    source: LocalOAuth2Client<P, B>,
    http: reqwest::Client,
    current: Mutex<Option<Token>>,
}

impl<P: OAuth2Provider, B: BrowserOpener> AuthorizedClient<P, B> {
    /// Token source backing this client.
    pub fn token_source(&self) -> &LocalOAuth2Client<P, B> {
        &self.source
    }

    /// Start a request. Send it with [`AuthorizedClient::send`].
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Start a GET request.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start a POST request.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Current token, acquired again when missing or expired.
    pub async fn token(&self) -> LocalAuthResult<Token> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.clone());
        }

        debug!("acquiring token for authorized client");
        let token = self.source.get_token().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Authorize and send `request`.
    pub async fn send(&self, request: RequestBuilder) -> LocalAuthResult<Response> {
        let token = self.token().await?;
        let response = request
            .header(AUTHORIZATION, authorization_value(&token)?)
            .send()
            .await
            .map_err(|e| NetworkError::ConnectionFailed {
                message: format!("sending request: {}", e),
            })?;
        Ok(response)
    }
}

/// Get a token for `service` with default settings: temp-dir cache, 5 minute
/// callback timeout, offline access, system browser.
pub async fn get_token<P: OAuth2Provider>(
    provider: Arc<P>,
    service: &str,
) -> LocalAuthResult<Token> {
    LocalOAuth2Client::with_components(
        provider,
        Arc::new(SystemBrowser),
        &LocalFlowConfig::for_service(service),
    )?
    .get_token()
    .await
}

/// Get an HTTP client authorized for `service` with default settings.
///
/// A token is acquired before returning.
pub async fn get_client<P: OAuth2Provider>(
    provider: Arc<P>,
    service: &str,
) -> LocalAuthResult<AuthorizedClient<P, SystemBrowser>> {
    let client = LocalOAuth2Client::with_components(
        provider,
        Arc::new(SystemBrowser),
        &LocalFlowConfig::for_service(service),
    )?
    .into_authorized_client()?;
    client.token().await?;
    Ok(client)
}
