#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Stream Client - Live Tick Multiplexer
//!
//! A long-lived WebSocket client that maintains a single connection to the
//! vendor market-data feed and multiplexes many logical subscriptions (by
//! instrument and detail tier) to independent in-process consumers,
//! surviving disconnects without losing subscription state.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Connection-agnostic types and logic
//!   - `streaming`: tick payloads, feed messages, wire requests
//!   - `subscription`: detail tiers, durable subscription state, listener refcounting
//!   - `snapshot`: snapshot baselines and partial-update merging
//!
//! - **Application**: Ports and consumer-facing services
//!   - `ports`: the `Feeder` contract the reconnect machinery is generic over
//!   - `services`: the live snapshot feed consumed by watchlists and charts
//!
//! - **Infrastructure**: Adapters for the outside world
//!   - `feed`: session handshake, MessagePack codec, transport, reconnect
//!     coordination, subscription management
//!   - `config`: environment-driven configuration
//!
//! # Data Flow
//!
//! ```text
//! set_interest ──► LiveSnapshotFeed ──► FeedManager ──► ReconnectingFeed ──► FeedTransport ──► vendor WS
//!                        ▲                   ▲                 ▲                  │
//!                        └───── merged ──────┴── events ───────┴──── decoded ─────┘
//!                             snapshots          (1:1)               ticks
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Application layer - Ports and consumer-facing services.
pub mod application;

/// Domain layer - Connection-agnostic types and logic.
pub mod domain;

/// Infrastructure layer - Adapters for the vendor feed and configuration.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::snapshot::{PartialUpdate, SymbolSnapshot, percent_change_today};
pub use domain::streaming::{
    Candle, DerivedTick, FeedMessage, FullTick, InstrumentKey, LightTick, TickPayload, WireMethod,
    WireRequest,
};
pub use domain::subscription::{
    DetailTier, ListenerId, ListenerRegistry, SubscriptionState, SubscriptionStats,
};

// Ports
pub use application::ports::{ConnectError, Feeder, TransportEvent};

// Consumer-facing services
pub use application::services::{LiveSnapshotFeed, SnapshotUpdate};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, Credentials, StreamSettings};

// Feed stack
pub use infrastructure::feed::codec::{CodecError, MsgPackCodec};
pub use infrastructure::feed::messages::{AckFrame, ErrorFrame, FeedFrame};
pub use infrastructure::feed::{
    ConnectionState, FeedEvent, FeedManager, FeedTransport, ReconnectConfig, ReconnectPolicy,
    ReconnectingFeed, SessionClient, SessionError, SessionGrant, StopReason,
};
