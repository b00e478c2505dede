//! OAuth2 Provider
//!
//! The authorization server capability the flows depend on: build the consent
//! URL, exchange a code, refresh a token.

pub mod standard;

pub use standard::StandardProvider;

use async_trait::async_trait;
use std::sync::Mutex;

use crate::core::lock;
use crate::error::{LocalAuthResult, ProviderError};
use crate::types::{AuthCodeOption, Token};

/// Authorization server capability.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    /// Redirect URL registered with the provider.
    fn redirect_url(&self) -> &str;

    /// Requested scopes, in order.
    fn scopes(&self) -> &[String];

    /// Consent page URL carrying `state` and the given options.
    fn authorization_url(&self, state: &str, options: &[AuthCodeOption]) -> String;

    /// Exchange an authorization code for a token.
    async fn exchange(&self, code: &str) -> LocalAuthResult<Token>;

    /// Obtain a new token from the refresh token of `token`.
    async fn refresh(&self, token: &Token) -> LocalAuthResult<Token>;
}

/// Mock provider for testing.
pub struct MockOAuth2Provider {
    redirect_url: String,
    scopes: Vec<String>,
    authorization_history: Mutex<Vec<(String, Vec<AuthCodeOption>)>>,
    exchange_history: Mutex<Vec<String>>,
    refresh_history: Mutex<Vec<Token>>,
    next_exchange: Mutex<Option<LocalAuthResult<Token>>>,
    next_refresh: Mutex<Option<LocalAuthResult<Token>>>,
}

impl MockOAuth2Provider {
    /// Create new mock provider.
    pub fn new(redirect_url: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            redirect_url: redirect_url.into(),
            scopes,
            authorization_history: Mutex::new(Vec::new()),
            exchange_history: Mutex::new(Vec::new()),
            refresh_history: Mutex::new(Vec::new()),
            next_exchange: Mutex::new(None),
            next_refresh: Mutex::new(None),
        }
    }

    /// Set the result of the next exchange.
    pub fn set_next_exchange(&self, result: LocalAuthResult<Token>) -> &Self {
        *lock(&self.next_exchange) = Some(result);
        self
    }

    /// Set the result of the next refresh.
    pub fn set_next_refresh(&self, result: LocalAuthResult<Token>) -> &Self {
        *lock(&self.next_refresh) = Some(result);
        self
    }

    /// Get (state, options) of every consent URL built.
    pub fn get_authorization_history(&self) -> Vec<(String, Vec<AuthCodeOption>)> {
        lock(&self.authorization_history).clone()
    }

    /// Get codes passed to `exchange`.
    pub fn get_exchange_history(&self) -> Vec<String> {
        lock(&self.exchange_history).clone()
    }

    /// Get tokens passed to `refresh`.
    pub fn get_refresh_history(&self) -> Vec<Token> {
        lock(&self.refresh_history).clone()
    }

    /// Total exchange and refresh calls.
    pub fn network_calls(&self) -> usize {
        lock(&self.exchange_history).len() + lock(&self.refresh_history).len()
    }
}

#[async_trait]
impl OAuth2Provider for MockOAuth2Provider {
    fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn authorization_url(&self, state: &str, options: &[AuthCodeOption]) -> String {
        lock(&self.authorization_history).push((state.to_string(), options.to_vec()));

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("redirect_uri", &self.redirect_url);
        query.append_pair("state", state);
        for option in options {
            query.append_pair(option.key(), option.value());
        }
        format!("https://mock.example.com/authorize?{}", query.finish())
    }

    async fn exchange(&self, code: &str) -> LocalAuthResult<Token> {
        lock(&self.exchange_history).push(code.to_string());

        if let Some(result) = lock(&self.next_exchange).take() {
            return result;
        }

        Ok(Token::new("mock-access-token", "Bearer").with_refresh_token("mock-refresh-token"))
    }

    async fn refresh(&self, token: &Token) -> LocalAuthResult<Token> {
        lock(&self.refresh_history).push(token.clone());

        if let Some(result) = lock(&self.next_refresh).take() {
            return result;
        }

        match &token.refresh_token {
            Some(refresh_token) => Ok(Token::new("mock-refreshed-token", "Bearer")
                .with_refresh_token(refresh_token.clone())),
            None => Err(ProviderError::InvalidGrant {
                message: "no refresh token".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_mock_authorization_url() {
        let provider = MockOAuth2Provider::new("http://localhost:8080/callback", Vec::new());
        let url = provider.authorization_url("s1", &[AuthCodeOption::AccessTypeOffline]);

        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_string(), "s1".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert_eq!(provider.get_authorization_history().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_exchange_and_refresh() {
        let provider = MockOAuth2Provider::new("http://localhost:8080/callback", Vec::new());
        provider.set_next_exchange(Ok(Token::new("AT1", "Bearer")));

        let token = provider.exchange("XYZ").await.unwrap();
        assert_eq!(token.access_token, "AT1");
        assert_eq!(provider.get_exchange_history(), vec!["XYZ"]);

        let refreshed = provider
            .refresh(&Token::new("old", "Bearer").with_refresh_token("rt"))
            .await
            .unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("rt"));
        assert_eq!(provider.network_calls(), 2);
    }
}
