//! Port Interfaces
//!
//! The contract between the reconnect/subscription machinery and whatever
//! owns the physical connection. The production implementation is
//! `infrastructure::feed::FeedTransport`; tests drive the same machinery
//! through recording fakes.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::streaming::{FeedMessage, WireRequest};

/// Error from an explicit connection attempt.
///
/// Only `connect` surfaces errors synchronously to its caller; everything
/// after a successful open is reported through [`TransportEvent`]s.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The handshake was rejected by the control endpoint. A later attempt
    /// may succeed once the session provider refreshes the credential.
    #[error("handshake rejected: {0}")]
    Auth(String),

    /// Transport-level failure: the socket could not be opened, or either
    /// await timed out.
    #[error("socket failure: {0}")]
    Socket(String),
}

/// Raw lifecycle events emitted by a [`Feeder`].
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket transitioned to open.
    Open,
    /// One decoded inbound data frame.
    Message(FeedMessage),
    /// The socket closed. `user_initiated` distinguishes an explicit
    /// `disconnect` from an unexpected drop.
    Closed {
        /// Whether the closure was requested by the caller.
        user_initiated: bool,
    },
    /// A transport-level error that did not necessarily close the socket.
    Error(String),
}

/// A physical feed connection.
///
/// Implementations own exactly one socket and the wire protocol on it. All
/// methods other than `connect` are non-blocking; outcomes surface later as
/// [`TransportEvent`]s.
#[async_trait]
pub trait Feeder: Send + Sync + 'static {
    /// Open the connection: authenticated handshake, then socket open.
    ///
    /// Idempotent: a call while a connection is open or in progress is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`ConnectError::Auth`] when the handshake is rejected,
    /// [`ConnectError::Socket`] when the socket cannot be opened or either
    /// await times out.
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Serialize and transmit a request if the socket is open; otherwise
    /// append it to the pending queue. Never drops a request silently.
    fn send(&self, request: WireRequest);

    /// Drain the pending queue, transmitting every request in FIFO append
    /// order. Called exactly once per open, after subscription replay, so
    /// the server's view of subscriptions is never behind queued requests
    /// that reference them.
    fn flush_pending(&self);

    /// Close the connection with a normal-closure frame, clear the pending
    /// queue, and mark the transport user-closed so it is not resurrected.
    fn disconnect(&self);

    /// Whether the socket is currently open.
    fn is_open(&self) -> bool;

    /// Whether a supervisor should attempt to re-establish the connection:
    /// the socket is not open and the closure was not user-initiated.
    fn should_reconnect(&self) -> bool;

    /// Subscribe to this transport's lifecycle events. Each receiver is an
    /// independent listener; dropping it removes the listener.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
