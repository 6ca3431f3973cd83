//! Reconnect Coordinator
//!
//! Keeps a [`Feeder`] alive across transient failures without
//! consumer-visible interruption. Transport events are re-exposed 1:1 on a
//! stable public surface, alongside the coordinator's own `Reconnecting`
//! and `AutoReconnectStopped` events.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Open -> (closed by user) -> Disconnected
//!                                    -> (closed unexpectedly) -> Reconnecting -> Connecting -> ...
//! ```
//!
//! Terminal failure state: `AutoReconnectStopped`, entered when the bounded
//! retry budget is exhausted or the caller disables automatic reconnection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{ConnectError, Feeder, TransportEvent};
use crate::domain::streaming::FeedMessage;

// =============================================================================
// Public Types
// =============================================================================

/// Connection state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no retry in progress.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open.
    Open,
    /// Waiting out the interval before the next automatic attempt.
    Reconnecting,
    /// Automatic reconnection stopped; a fresh explicit `connect` is needed.
    AutoReconnectStopped,
}

/// Why automatic reconnection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The bounded retry budget was exhausted.
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The caller disabled automatic reconnection.
    DisabledByClient,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {attempts} reconnect attempts")
            }
            Self::DisabledByClient => f.write_str("stopped by client"),
        }
    }
}

/// Events on the coordinator's public surface.
///
/// `Open`, `Close`, `Error` and `Message` are the transport's events
/// re-emitted 1:1; `Message` payloads pass through untransformed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The socket transitioned to open.
    Open,
    /// The socket closed.
    Close,
    /// A transport or reconnect error.
    Error(String),
    /// One decoded inbound data frame, unmodified.
    Message(FeedMessage),
    /// An automatic reconnect attempt is starting.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Configured attempt budget (0 = unlimited).
        max_attempts: u32,
    },
    /// Automatic reconnection stopped.
    AutoReconnectStopped {
        /// Why it stopped.
        reason: StopReason,
    },
}

// =============================================================================
// Coordinator
// =============================================================================

struct Shared<F: Feeder> {
    feed: Arc<F>,
    config: ReconnectConfig,
    state: RwLock<ConnectionState>,
    auto_reconnect: AtomicBool,
    retry_cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<FeedEvent>,
}

impl<F: Feeder> Shared<F> {
    /// Cancel a pending retry timer, if any.
    fn cancel_retry_timer(&self) {
        if let Some(token) = self.retry_cancel.lock().take() {
            token.cancel();
        }
    }

    fn start_retry_timer(self: &Arc<Self>) {
        let mut slot = self.retry_cancel.lock();
        if slot.is_some() {
            // A timer is already running; keep it.
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        *self.state.write() = ConnectionState::Reconnecting;
        tokio::spawn(retry_loop(Arc::clone(self), token));
    }

    fn stop_auto_reconnect(&self, reason: StopReason) {
        self.cancel_retry_timer();
        *self.state.write() = ConnectionState::AutoReconnectStopped;
        tracing::warn!(%reason, "automatic reconnection stopped");
        let _ = self
            .events
            .send(FeedEvent::AutoReconnectStopped { reason });
    }
}

/// Supervises a [`Feeder`], reconnecting it on unexpected closes.
pub struct ReconnectingFeed<F: Feeder> {
    shared: Arc<Shared<F>>,
    supervisor_cancel: CancellationToken,
}

impl<F: Feeder> ReconnectingFeed<F> {
    /// Wrap `feed` with reconnect supervision.
    #[must_use]
    pub fn new(feed: Arc<F>, config: ReconnectConfig, event_capacity: usize) -> Self {
        let transport_events = feed.events();
        let (events, _) = broadcast::channel(event_capacity);

        let shared = Arc::new(Shared {
            feed,
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            auto_reconnect: AtomicBool::new(true),
            retry_cancel: Mutex::new(None),
            events,
        });

        let supervisor_cancel = CancellationToken::new();
        tokio::spawn(supervise(
            Arc::clone(&shared),
            transport_events,
            supervisor_cancel.clone(),
        ));

        Self {
            shared,
            supervisor_cancel,
        }
    }

    /// Explicitly open the connection.
    ///
    /// # Errors
    ///
    /// Propagates the transport's [`ConnectError`]; automatic retry attempts
    /// handle their own errors and surface them only as events.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        *self.shared.state.write() = ConnectionState::Connecting;
        let result = self.shared.feed.connect().await;
        if result.is_err() {
            let mut state = self.shared.state.write();
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Disconnected;
            }
        }
        result
    }

    /// Close the connection for good; no automatic resurrection.
    pub fn disconnect(&self) {
        self.shared.cancel_retry_timer();
        self.shared.feed.disconnect();
    }

    /// Enable or disable automatic reconnection.
    ///
    /// Disabling cancels any pending retry timer immediately and emits
    /// `AutoReconnectStopped`; an already-open connection is left alone.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.shared.auto_reconnect.store(enabled, Ordering::SeqCst);
        if !enabled {
            let had_timer = self.shared.retry_cancel.lock().is_some();
            self.shared.cancel_retry_timer();
            if had_timer {
                *self.shared.state.write() = ConnectionState::AutoReconnectStopped;
            }
            let _ = self.shared.events.send(FeedEvent::AutoReconnectStopped {
                reason: StopReason::DisabledByClient,
            });
        }
    }

    /// Whether automatic reconnection is currently enabled.
    #[must_use]
    pub fn auto_reconnect_enabled(&self) -> bool {
        self.shared.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Whether the socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.feed.is_open()
    }

    /// Subscribe to the coordinator's event surface. Each receiver is an
    /// independent listener; dropping it removes the listener.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.shared.events.subscribe()
    }

    /// The supervised transport.
    #[must_use]
    pub fn feed(&self) -> &Arc<F> {
        &self.shared.feed
    }
}

impl<F: Feeder> Drop for ReconnectingFeed<F> {
    fn drop(&mut self) {
        self.supervisor_cancel.cancel();
        self.shared.cancel_retry_timer();
    }
}

// =============================================================================
// Supervision Tasks
// =============================================================================

async fn supervise<F: Feeder>(
    shared: Arc<Shared<F>>,
    mut transport_events: broadcast::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = transport_events.recv() => event,
        };

        match event {
            Ok(TransportEvent::Open) => {
                shared.cancel_retry_timer();
                *shared.state.write() = ConnectionState::Open;
                let _ = shared.events.send(FeedEvent::Open);
            }
            Ok(TransportEvent::Message(message)) => {
                let _ = shared.events.send(FeedEvent::Message(message));
            }
            Ok(TransportEvent::Error(error)) => {
                let _ = shared.events.send(FeedEvent::Error(error));
            }
            Ok(TransportEvent::Closed { user_initiated }) => {
                *shared.state.write() = ConnectionState::Disconnected;
                let _ = shared.events.send(FeedEvent::Close);

                if !user_initiated
                    && shared.auto_reconnect.load(Ordering::SeqCst)
                    && shared.feed.should_reconnect()
                {
                    shared.start_retry_timer();
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "transport event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn retry_loop<F: Feeder>(shared: Arc<Shared<F>>, token: CancellationToken) {
    let mut policy = ReconnectPolicy::new(shared.config.clone());

    loop {
        let Some(delay) = policy.next_delay() else {
            shared.stop_auto_reconnect(StopReason::RetriesExhausted {
                attempts: policy.attempt_count(),
            });
            return;
        };

        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        if token.is_cancelled() {
            // Cancellation raced the tick; a newer timer may own the slot now.
            return;
        }

        if !shared.feed.should_reconnect() {
            // The connection came back (or was user-closed) while we slept.
            shared.cancel_retry_timer();
            return;
        }

        let attempt = policy.attempt_count();
        *shared.state.write() = ConnectionState::Connecting;
        let _ = shared.events.send(FeedEvent::Reconnecting {
            attempt,
            max_attempts: policy.max_attempts(),
        });
        tracing::info!(attempt, max_attempts = policy.max_attempts(), "attempting reconnect");

        match shared.feed.connect().await {
            Ok(()) => {
                // The transport emitted Open before returning; the
                // supervisor resets state and clears the timer slot.
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "reconnect attempt failed");
                let _ = shared.events.send(FeedEvent::Error(e.to_string()));

                if policy.should_retry() {
                    *shared.state.write() = ConnectionState::Reconnecting;
                } else {
                    shared.stop_auto_reconnect(StopReason::RetriesExhausted {
                        attempts: policy.attempt_count(),
                    });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_messages() {
        let exhausted = StopReason::RetriesExhausted { attempts: 5 };
        assert_eq!(exhausted.to_string(), "gave up after 5 reconnect attempts");

        assert_eq!(StopReason::DisabledByClient.to_string(), "stopped by client");
    }
}
