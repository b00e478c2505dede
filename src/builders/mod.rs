//! Builders
//!
//! Fluent builder patterns for provider and local flow configuration.

pub mod config;

pub use config::{local_flow_config, provider_config, LocalFlowConfigBuilder, ProviderConfigBuilder};
