//! Flows
//!
//! The interactive installed-application grant and the loopback listener it
//! runs on.

pub mod browser;
pub mod callback_server;

pub use browser::{AuthorizationFlow, BrowserFlow, MockAuthorizationFlow};
pub use callback_server::{CallbackEndpoint, LocalCallbackServer, RunningCallbackServer};
