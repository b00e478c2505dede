//! Token Types
//!
//! The persisted token record and the token endpoint response it is built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token response from authorization server.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An access/refresh token pair as stored in the token cache.
///
/// A token without an expiry never expires. Tokens are replaced on refresh or
/// re-grant, never edited in place.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token.
    #[serde(default)]
    pub access_token: String,
    /// Token type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a token without refresh token or expiry.
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set an absolute expiry.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Build from a token endpoint response received now.
    ///
    /// A lifetime too large to represent is treated as no expiry.
    pub fn from_response(response: TokenResponse) -> Self {
        let expiry = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expiry,
        }
    }

    /// Check if the expiry has passed. Tokens without expiry never expire.
    pub fn is_expired(&self) -> bool {
        self.expiry.map(|exp| exp <= Utc::now()).unwrap_or(false)
    }

    /// Check if the token can be used as-is.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Check if a non-empty refresh token is present.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    /// Token type to send, defaulting to "Bearer" when unset.
    pub fn effective_token_type(&self) -> &str {
        if self.token_type.is_empty() {
            "Bearer"
        } else {
            &self.token_type
        }
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.effective_token_type(), self.access_token)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_parsing() {
        let json = r#"{
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "test-refresh",
            "scope": "openid profile email"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = Token::from_response(response);
        assert_eq!(token.access_token, "test-token");
        assert_eq!(token.refresh_token.as_deref(), Some("test-refresh"));
        assert!(token.expiry.is_some());
        assert!(token.is_valid());
    }

    #[test]
    fn test_oversized_expires_in_means_no_expiry() {
        for expires_in in ["100000000000000000", "18446744073709551615"] {
            let json = format!(r#"{{"access_token": "a", "expires_in": {}}}"#, expires_in);
            let response: TokenResponse = serde_json::from_str(&json).unwrap();
            let token = Token::from_response(response);

            assert!(token.expiry.is_none(), "expires_in {}", expires_in);
            assert!(token.is_valid());
        }
    }

    #[test]
    fn test_validity() {
        assert!(!Token::default().is_valid());
        assert!(Token::new("at", "Bearer").is_valid());

        let expired = Token::new("at", "Bearer").with_expiry(Utc::now() - Duration::seconds(1));
        assert!(expired.is_expired());
        assert!(!expired.is_valid());

        let live = Token::new("at", "Bearer").with_expiry(Utc::now() + Duration::minutes(10));
        assert!(live.is_valid());
    }

    #[test]
    fn test_empty_refresh_token_is_absent() {
        let token = Token::new("at", "Bearer").with_refresh_token("");
        assert!(!token.has_refresh_token());
    }

    #[test]
    fn test_serialized_field_names() {
        let token = Token::new("at", "Bearer").with_refresh_token("rt");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["access_token"], "at");
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["refresh_token"], "rt");
        assert!(json.get("expiry").is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = Token::new("secret-at", "Bearer").with_refresh_token("secret-rt");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret-at"));
        assert!(!debug.contains("secret-rt"));
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(Token::new("abc", "").authorization_header(), "Bearer abc");
        assert_eq!(Token::new("abc", "MAC").authorization_header(), "MAC abc");
    }
}
