//! Callback Types
//!
//! Query parameters delivered to the local callback path.

use serde::Deserialize;

/// Callback parameters from authorization redirect.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code (if success).
    #[serde(default)]
    pub code: Option<String>,
    /// State parameter.
    #[serde(default)]
    pub state: Option<String>,
    /// Error code (if authorization failed).
    #[serde(default)]
    pub error: Option<String>,
    /// Error description.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Received state, empty when absent.
    pub fn state_or_empty(&self) -> &str {
        self.state.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_params_from_query() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc123&state=xyz789&scope=drive").unwrap();

        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state_or_empty(), "xyz789");
        assert!(params.error.is_none());
    }

    #[test]
    fn test_callback_params_error() {
        let params: CallbackParams =
            serde_urlencoded::from_str("error=access_denied&error_description=User%20denied")
                .unwrap();

        assert!(params.code.is_none());
        assert_eq!(params.state_or_empty(), "");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User denied"));
    }
}
