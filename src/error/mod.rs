//! Error Types
//!
//! Error hierarchy for local token acquisition.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Root error type for local token acquisition.
#[derive(Error, Debug)]
pub enum LocalAuthError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Token cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Browser flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl LocalAuthError {
    /// Stable error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OAUTH2_LOCAL_CONFIG",
            Self::Cache(_) => "OAUTH2_LOCAL_CACHE",
            Self::Flow(_) => "OAUTH2_LOCAL_FLOW",
            Self::Network(_) => "OAUTH2_LOCAL_NETWORK",
            Self::Protocol(_) => "OAUTH2_LOCAL_PROTOCOL",
            Self::Provider(_) => "OAUTH2_LOCAL_PROVIDER",
        }
    }

    /// Check if the error means the user has to grant access again.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Provider(ProviderError::InvalidGrant { .. }) => true,
            Self::Flow(FlowError::Denied { .. }) => true,
            Self::Flow(FlowError::Exchange { source }) => source.needs_reauth(),
            _ => false,
        }
    }

    /// Check if this is a cache miss rather than a real failure.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::Cache(CacheError::NotFound { .. }))
    }
}

/// Configuration error. Always raised before any network activity.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("port not provided, can't infer from redirect URL {redirect_url:?}")]
    PortNotInferable { redirect_url: String },

    #[error("Invalid URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Cache operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOperation {
    Read,
    Write,
    CreateDir,
    Remove,
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "reading token"),
            Self::Write => write!(f, "writing token"),
            Self::CreateDir => write!(f, "creating token cache directory"),
            Self::Remove => write!(f, "removing token"),
        }
    }
}

/// Token cache error.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cached token at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("unmarshaling token from {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("{operation} at {}: {source}", path.display())]
    Io {
        operation: CacheOperation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("marshaling token: {message}")]
    Serialize { message: String },
}

/// Interactive browser flow error.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("token exchange timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("token acquisition cancelled")]
    Cancelled,

    #[error("binding callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("callback listener failed: {message}")]
    Server { message: String },

    #[error("authorization denied: {error}")]
    Denied {
        error: String,
        error_description: Option<String>,
    },

    #[error("exchanging token: {source}")]
    Exchange {
        #[source]
        source: Box<LocalAuthError>,
    },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Provider (OAuth2 server) error.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid scope: {scope}")]
    InvalidScope { scope: String },

    #[error("Unauthorized client for this grant type")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable,
}

/// Result type for local token acquisition.
pub type LocalAuthResult<T> = Result<T, LocalAuthError>;

/// OAuth2 error response from provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Map token endpoint error response to error type.
pub fn map_token_error(response: &OAuth2ErrorResponse) -> ProviderError {
    let description = response.error_description.clone();
    match response.error.as_str() {
        "invalid_client" => ProviderError::InvalidClient {
            error_description: description,
        },
        "invalid_grant" => ProviderError::InvalidGrant {
            message: description.unwrap_or_else(|| "Invalid grant".to_string()),
        },
        "invalid_scope" => ProviderError::InvalidScope {
            scope: description.unwrap_or_default(),
        },
        "unauthorized_client" => ProviderError::UnauthorizedClient {
            error_description: description,
        },
        "server_error" => ProviderError::ServerError {
            message: description.unwrap_or_else(|| "Server error".to_string()),
        },
        "temporarily_unavailable" => ProviderError::TemporarilyUnavailable,
        _ => ProviderError::InvalidRequest {
            message: description.unwrap_or_else(|| response.error.clone()),
        },
    }
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create error from a non-success token endpoint response.
pub fn create_error_from_response(status: u16, body: &str) -> LocalAuthError {
    if let Some(response) = parse_error_response(body) {
        return LocalAuthError::Provider(map_token_error(&response));
    }

    let error = match status {
        400 => ProviderError::InvalidRequest {
            message: "Bad request".to_string(),
        },
        401 => ProviderError::InvalidClient {
            error_description: Some("Unauthorized".to_string()),
        },
        403 => ProviderError::UnauthorizedClient {
            error_description: Some("Forbidden".to_string()),
        },
        429 | 503 => ProviderError::TemporarilyUnavailable,
        _ => ProviderError::ServerError {
            message: format!("HTTP {}", status),
        },
    };

    LocalAuthError::Provider(error)
}

/// Get user-friendly error message.
pub fn get_user_message(error: &LocalAuthError) -> String {
    match error {
        LocalAuthError::Configuration(ConfigurationError::PortNotInferable { .. }) => {
            "The redirect URL must look like http://localhost:<port>/<path>.".to_string()
        }
        LocalAuthError::Flow(FlowError::Timeout { .. }) => {
            "Timed out waiting for the browser sign-in to complete. Please try again.".to_string()
        }
        LocalAuthError::Flow(FlowError::Cancelled) => "Sign-in was cancelled.".to_string(),
        LocalAuthError::Flow(FlowError::Bind { port, .. }) => format!(
            "Could not listen on local port {}. Make sure no other process is using it.",
            port
        ),
        LocalAuthError::Flow(FlowError::Denied { .. }) => {
            "Access was denied. Please try signing in again and grant the requested permissions."
                .to_string()
        }
        LocalAuthError::Cache(CacheError::Corrupt { path, .. }) => format!(
            "The cached token at {} is unreadable. Delete it and sign in again.",
            path.display()
        ),
        LocalAuthError::Cache(_) => "The token cache could not be accessed.".to_string(),
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}
