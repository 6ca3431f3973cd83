//! Application layer.
//!
//! Port definitions (the transport seam the coordinator is generic over)
//! and consumer-facing services built on top of the feed stack.

/// Port interfaces for the physical feed connection.
pub mod ports;

/// Consumer-facing services.
pub mod services;
