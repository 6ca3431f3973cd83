//! Vendor Feed Stack
//!
//! Everything that touches the physical connection, from the bottom up:
//!
//! - [`session`]: handshake against the control endpoint, yielding a
//!   time-limited connection URL
//! - [`messages`] / [`codec`]: the MessagePack tagged-record wire format
//! - [`transport`]: the one socket, its pending send queue, and raw
//!   lifecycle events
//! - [`reconnect`] / [`coordinator`]: bounded interval-based reconnection
//!   over any [`crate::application::ports::Feeder`]
//! - [`manager`]: durable logical subscriptions replayed onto the wire on
//!   every (re)connect

pub mod codec;
pub mod coordinator;
pub mod manager;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use coordinator::{ConnectionState, FeedEvent, ReconnectingFeed, StopReason};
pub use manager::FeedManager;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{SessionClient, SessionError, SessionGrant};
pub use transport::FeedTransport;
