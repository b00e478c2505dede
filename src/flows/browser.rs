//! Browser Flow
//!
//! One interactive authorization: consent in the user's browser, code
//! received on the local callback server, then exchanged for a token.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::{lock, AuthorizationState, BrowserOpener, SystemBrowser};
use crate::error::{FlowError, LocalAuthResult};
use crate::flows::{CallbackEndpoint, LocalCallbackServer};
use crate::provider::OAuth2Provider;
use crate::types::{with_offline_access, AuthCodeOption, LocalFlowConfig, Token};

/// Interactive grant producing a fresh token.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Run the grant once.
    async fn run(&self, cancel: &CancellationToken) -> LocalAuthResult<Token>;
}

/// Installed-application authorization code flow.
pub struct BrowserFlow<P: OAuth2Provider, B: BrowserOpener = SystemBrowser> {
    provider: Arc<P>,
    browser: Arc<B>,
    server: LocalCallbackServer,
    callback_timeout: Duration,
    auth_options: Vec<AuthCodeOption>,
}

impl<P: OAuth2Provider> BrowserFlow<P, SystemBrowser> {
    /// Create a flow that opens the system browser.
    pub fn new(provider: Arc<P>, config: &LocalFlowConfig) -> LocalAuthResult<Self> {
        Self::with_browser(provider, Arc::new(SystemBrowser), config)
    }
}

impl<P: OAuth2Provider, B: BrowserOpener> BrowserFlow<P, B> {
    /// Create a flow with a custom browser opener.
    ///
    /// Fails when the listening port can't be resolved from the provider's
    /// redirect URL.
    pub fn with_browser(
        provider: Arc<P>,
        browser: Arc<B>,
        config: &LocalFlowConfig,
    ) -> LocalAuthResult<Self> {
        let endpoint = CallbackEndpoint::from_redirect_url(provider.redirect_url(), config.port)?;
        let server =
            LocalCallbackServer::new(endpoint, &config.start_path, config.success_page.clone())?;

        Ok(Self {
            provider,
            browser,
            server,
            callback_timeout: config.callback_timeout,
            auth_options: with_offline_access(&config.auth_options),
        })
    }

    /// Local callback server configuration.
    pub fn server(&self) -> &LocalCallbackServer {
        &self.server
    }
}

#[async_trait]
impl<P: OAuth2Provider, B: BrowserOpener> AuthorizationFlow for BrowserFlow<P, B> {
    async fn run(&self, cancel: &CancellationToken) -> LocalAuthResult<Token> {
        let state = AuthorizationState::generate();
        let consent_url = self
            .provider
            .authorization_url(state.as_str(), &self.auth_options);

        let mut server = self.server.start(state, consent_url, cancel).await?;

        println!(
            "Starting server, please visit {:?} to be redirected to the OAuth 2.0 provider's consent page.",
            server.start_url()
        );
        println!(
            "Please make sure {} is an allowed callback URL.",
            self.provider.redirect_url()
        );

        if let Err(e) = self.browser.open(server.start_url()) {
            warn!(error = %e, url = %server.start_url(), "could not open browser");
        }

        let code = server.wait_for_code(self.callback_timeout, cancel).await;
        server.shutdown().await;
        let code = code?;

        info!("exchanging authorization code");
        tokio::select! {
            result = self.provider.exchange(&code) => {
                result.map_err(|e| FlowError::Exchange { source: Box::new(e) }.into())
            }
            _ = cancel.cancelled() => Err(FlowError::Cancelled.into()),
        }
    }
}

/// Mock authorization flow for testing.
#[derive(Default)]
pub struct MockAuthorizationFlow {
    runs: Mutex<usize>,
    next_result: Mutex<Option<LocalAuthResult<Token>>>,
}

impl MockAuthorizationFlow {
    /// Create new mock flow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result of the next run.
    pub fn set_next_result(&self, result: LocalAuthResult<Token>) -> &Self {
        *lock(&self.next_result) = Some(result);
        self
    }

    /// Number of runs.
    pub fn get_run_count(&self) -> usize {
        *lock(&self.runs)
    }
}

#[async_trait]
impl AuthorizationFlow for MockAuthorizationFlow {
    async fn run(&self, cancel: &CancellationToken) -> LocalAuthResult<Token> {
        *lock(&self.runs) += 1;

        if cancel.is_cancelled() {
            return Err(FlowError::Cancelled.into());
        }

        if let Some(result) = lock(&self.next_result).take() {
            return result;
        }

        Ok(Token::new("mock-granted-token", "Bearer").with_refresh_token("mock-granted-refresh"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockBrowserOpener;
    use crate::error::{ConfigurationError, LocalAuthError, ProviderError};
    use crate::provider::MockOAuth2Provider;

    fn test_config() -> LocalFlowConfig {
        LocalFlowConfig {
            callback_timeout: Duration::from_secs(5),
            port: Some(0),
            ..LocalFlowConfig::for_service("drive")
        }
    }

    fn provider() -> Arc<MockOAuth2Provider> {
        Arc::new(MockOAuth2Provider::new(
            "http://localhost:8080/callback",
            vec!["a".to_string(), "b".to_string()],
        ))
    }

    #[tokio::test]
    async fn test_flow_exchanges_received_code() {
        let provider = provider();
        provider.set_next_exchange(Ok(Token::new("AT1", "Bearer").with_refresh_token("RT1")));
        let browser = Arc::new(MockBrowserOpener::approving("XYZ"));

        let flow = BrowserFlow::with_browser(provider.clone(), browser.clone(), &test_config())
            .unwrap();
        let token = flow.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(token.access_token, "AT1");
        assert_eq!(token.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(provider.get_exchange_history(), vec!["XYZ"]);
        assert_eq!(browser.get_opened().len(), 1);
        assert!(browser.get_opened()[0].ends_with("/auth"));
    }

    #[tokio::test]
    async fn test_flow_forces_offline_access_and_fresh_state() {
        let provider = provider();
        let config = LocalFlowConfig {
            auth_options: vec![AuthCodeOption::AccessTypeOnline],
            ..test_config()
        };
        let flow = BrowserFlow::with_browser(
            provider.clone(),
            Arc::new(MockBrowserOpener::approving("XYZ")),
            &config,
        )
        .unwrap();

        flow.run(&CancellationToken::new()).await.unwrap();
        flow.run(&CancellationToken::new()).await.unwrap();

        let history = provider.get_authorization_history();
        assert_eq!(history.len(), 2);
        assert_ne!(history[0].0, history[1].0);
        assert_eq!(history[0].1, vec![AuthCodeOption::AccessTypeOffline]);
    }

    #[tokio::test]
    async fn test_browser_failure_is_not_fatal() {
        let provider = provider();
        let config = LocalFlowConfig {
            callback_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let flow = BrowserFlow::with_browser(
            provider.clone(),
            Arc::new(MockBrowserOpener::failing()),
            &config,
        )
        .unwrap();

        let result = flow.run(&CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(LocalAuthError::Flow(FlowError::Timeout { .. }))
        ));
        assert!(provider.get_exchange_history().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_failure() {
        let provider = provider();
        provider.set_next_exchange(Err(ProviderError::InvalidGrant {
            message: "code reused".to_string(),
        }
        .into()));
        let flow = BrowserFlow::with_browser(
            provider,
            Arc::new(MockBrowserOpener::approving("XYZ")),
            &test_config(),
        )
        .unwrap();

        let err = flow.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LocalAuthError::Flow(FlowError::Exchange { .. })));
        assert!(err.needs_reauth());
    }

    #[tokio::test]
    async fn test_cancelled_before_callback() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let flow = BrowserFlow::with_browser(
            provider(),
            Arc::new(MockBrowserOpener::new()),
            &test_config(),
        )
        .unwrap();

        let result = flow.run(&cancel).await;
        assert!(matches!(result, Err(LocalAuthError::Flow(FlowError::Cancelled))));
    }

    #[test]
    fn test_unresolvable_port_fails_before_listening() {
        let provider = Arc::new(MockOAuth2Provider::new(
            "https://example.com/callback",
            Vec::new(),
        ));
        let result = BrowserFlow::new(provider, &LocalFlowConfig::for_service("drive"));
        assert!(matches!(
            result,
            Err(LocalAuthError::Configuration(
                ConfigurationError::PortNotInferable { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_mock_flow() {
        let flow = MockAuthorizationFlow::new();
        flow.set_next_result(Ok(Token::new("AT1", "Bearer")));

        let token = flow.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(token.access_token, "AT1");
        assert_eq!(flow.get_run_count(), 1);
    }
}
