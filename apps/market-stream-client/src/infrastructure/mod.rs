//! Infrastructure layer.
//!
//! Adapters for the outside world: the vendor feed connection and the
//! environment-driven configuration.

/// Configuration loading.
pub mod config;

/// Vendor feed: session handshake, wire codec, transport, reconnect
/// supervision, subscription management.
pub mod feed;
