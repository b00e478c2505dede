//! Local OAuth2 Token Acquisition
//!
//! OAuth2 for installed applications: obtains and persists an access/refresh
//! token pair for a command-line tool by briefly running a loopback callback
//! listener and sending the user's browser to the provider's consent page.
//!
//! # Features
//!
//! - Per-service on-disk token cache keyed by the ordered scope list
//! - Refresh of expired tokens, falling back to a new grant on failure
//! - Single-use loopback listener with anti-forgery state, timeout and
//!   cancellation
//! - Standard token endpoint provider (RFC 6749 Section 4.1 and Section 6)
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth2_local::{local_flow_config, provider_config, LocalOAuth2Client};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = provider_config()
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .authorization_endpoint("https://accounts.google.com/o/oauth2/auth")
//!         .token_endpoint("https://oauth2.googleapis.com/token")
//!         .redirect_url("http://localhost:8080/callback")
//!         .add_scope("https://www.googleapis.com/auth/drive.readonly")
//!         .build()?;
//!
//!     let client = LocalOAuth2Client::new(provider, &local_flow_config("drive").build()?)?;
//!     let http = client.into_authorized_client()?;
//!
//!     let files = http
//!         .send(http.get("https://www.googleapis.com/drive/v3/files"))
//!         .await?;
//!     println!("{}", files.status());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: token, configuration and callback data structures
//! - `error`: error hierarchy with provider error mapping
//! - `core`: HTTP transport, state generation, browser launch
//! - `provider`: the authorization server capability and its standard implementation
//! - `flows`: loopback callback server and the interactive browser flow
//! - `token`: token cache and the reuse/refresh/re-grant policy
//! - `builders`: fluent builders for configuration
//! - `client`: high-level client and one-call entry points

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod flows;
pub mod provider;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{get_client, get_token, AuthorizedClient, LocalOAuth2Client};

// Re-export builders
pub use builders::{
    local_flow_config, provider_config, LocalFlowConfigBuilder, ProviderConfigBuilder,
};

// Re-export errors
pub use error::{
    create_error_from_response, get_user_message, map_token_error, parse_error_response,
    CacheError, CacheOperation, ConfigurationError, FlowError, LocalAuthError, LocalAuthResult,
    NetworkError, OAuth2ErrorResponse, ProtocolError, ProviderError,
};

// Re-export types
pub use types::{
    // Config
    ClientAuthMethod, ClientCredentials, LocalFlowConfig, ProviderConfig,
    DEFAULT_CALLBACK_TIMEOUT, DEFAULT_START_PATH,
    // Token
    Token, TokenResponse,
    // Auth
    with_offline_access, AuthCodeOption, Prompt,
    // Callback
    CallbackParams,
};

// Re-export core components
pub use crate::core::{
    // Transport
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport,
    // State
    AuthorizationState,
    // Browser
    BrowserOpener, MockBrowserOpener, SystemBrowser,
};

// Re-export provider, flows and token components
pub use flows::{
    AuthorizationFlow, BrowserFlow, CallbackEndpoint, LocalCallbackServer, MockAuthorizationFlow,
    RunningCallbackServer,
};
pub use provider::{MockOAuth2Provider, OAuth2Provider, StandardProvider};
pub use token::{CacheLocation, TokenAcquirer, TokenCache};

// Cancellation handle accepted by the acquisition entry points.
pub use tokio_util::sync::CancellationToken;
