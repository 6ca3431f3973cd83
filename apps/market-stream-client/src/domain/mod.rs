//! Domain layer.
//!
//! Core types for the streaming client: canonical market-data payloads,
//! subscription bookkeeping, and snapshot merging. These modules hold the
//! logic that must survive any transport or codec swap.

/// Snapshot baselines and partial-update merging.
pub mod snapshot;

/// Canonical wire/data types: tick payloads, feed messages, requests.
pub mod streaming;

/// Detail tiers, subscription state, and listener reference counting.
pub mod subscription;
