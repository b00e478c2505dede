//! Authorization State
//!
//! Anti-forgery `state` parameter for one browser flow.

use base64::Engine;
use rand::Rng;

/// Single-use random state bound to one callback listener run.
///
/// Never reused across flows; compared with the callback value by exact
/// string equality.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationState(String);

impl AuthorizationState {
    /// Generate a fresh state from 32 random bytes.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 32] = rng.gen();
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// State value as sent to the provider.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a received value against this state.
    pub fn matches(&self, received: &str) -> bool {
        self.0 == received
    }
}

impl std::fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "AuthorizationState({}…)", prefix)
    }
}
