//! Token
//!
//! Token cache and the acquisition policy built on it.

pub mod acquisition;
pub mod cache;

pub use acquisition::TokenAcquirer;
pub use cache::{CacheLocation, TokenCache, DEFAULT_TOKEN_FILE};
