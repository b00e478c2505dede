//! Token Acquisition
//!
//! Reuse, refresh or interactively re-grant the token for one (service,
//! scopes) identity.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FlowError, LocalAuthResult};
use crate::flows::AuthorizationFlow;
use crate::provider::OAuth2Provider;
use crate::token::{CacheLocation, TokenCache};
use crate::types::Token;

/// Decides how a usable token is obtained.
pub struct TokenAcquirer<P: OAuth2Provider, F: AuthorizationFlow> {
    provider: Arc<P>,
    flow: Arc<F>,
    cache: TokenCache,
    location: CacheLocation,
}

impl<P: OAuth2Provider, F: AuthorizationFlow> TokenAcquirer<P, F> {
    /// Create an acquirer for `service_name` and the provider's scopes.
    ///
    /// An empty service name disables caching.
    pub fn new(provider: Arc<P>, flow: Arc<F>, cache: TokenCache, service_name: &str) -> Self {
        let location = cache.locate(service_name, provider.scopes());
        Self {
            provider,
            flow,
            cache,
            location,
        }
    }

    /// Where the token is cached.
    pub fn location(&self) -> &CacheLocation {
        &self.location
    }

    /// Token cache.
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a usable token, running the browser flow only when needed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> LocalAuthResult<Token> {
        let path = match &self.location {
            CacheLocation::NoCache => {
                debug!("token caching disabled");
                return self.flow.run(cancel).await;
            }
            CacheLocation::File(path) => path,
        };

        let cached = match self.cache.read(path).await {
            Ok(token) => token,
            Err(e) if e.is_cache_miss() => {
                info!(path = %path.display(), "no cached token");
                return self.grant_and_store(path, cancel).await;
            }
            Err(e) => return Err(e),
        };

        if cached.is_valid() {
            debug!(path = %path.display(), "using cached token");
            return Ok(cached);
        }

        if !cached.has_refresh_token() {
            info!(path = %path.display(), "cached token expired without refresh token");
            return self.grant_and_store(path, cancel).await;
        }

        let refreshed = tokio::select! {
            result = self.provider.refresh(&cached) => result,
            _ = cancel.cancelled() => return Err(FlowError::Cancelled.into()),
        };

        match refreshed {
            Ok(token) => {
                debug!(path = %path.display(), "refreshed cached token");
                self.cache.write(path, &token).await?;
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "refreshing token failed, requesting a new grant");
                self.grant_and_store(path, cancel).await
            }
        }
    }

    async fn grant_and_store(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> LocalAuthResult<Token> {
        let token = self.flow.run(cancel).await?;
        self.cache.write(path, &token).await?;
        Ok(token)
    }
}
