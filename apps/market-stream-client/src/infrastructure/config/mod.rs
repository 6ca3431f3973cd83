//! Configuration Module
//!
//! Environment-driven configuration for the streaming client.

mod settings;

pub use settings::{ClientConfig, ConfigError, Credentials, StreamSettings};
