//! Subscription Manager
//!
//! Makes logical subscription state durable across reconnects: which
//! instruments are subscribed, at which detail tier, is recorded here and
//! replayed onto the transport on every successful open. The server only
//! ever sees "subscribe to my current full interest", never a diff. That is
//! is what turns a dropped socket into a non-event for callers.
//!
//! Subscription state is mutated only by explicit `subscribe` /
//! `unsubscribe` / `change_tier` calls. Network events never alter it; they
//! only cause it to be replayed.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::coordinator::{FeedEvent, ReconnectingFeed, StopReason};
use super::reconnect::ReconnectConfig;
use crate::application::ports::{ConnectError, Feeder};
use crate::domain::streaming::{InstrumentKey, WireRequest};
use crate::domain::subscription::{
    DetailTier, ListenerId, ListenerRegistry, SubscriptionState, SubscriptionStats,
};

/// Durable subscription management over a reconnecting feed.
pub struct FeedManager<F: Feeder> {
    coordinator: ReconnectingFeed<F>,
    subscriptions: Arc<RwLock<SubscriptionState>>,
    listeners: Mutex<ListenerRegistry>,
    pump_cancel: CancellationToken,
}

impl<F: Feeder> FeedManager<F> {
    /// Create a manager supervising `feed`.
    #[must_use]
    pub fn new(feed: Arc<F>, reconnect: ReconnectConfig, event_capacity: usize) -> Self {
        let coordinator = ReconnectingFeed::new(feed, reconnect, event_capacity);
        let subscriptions = Arc::new(RwLock::new(SubscriptionState::new()));

        let pump_cancel = CancellationToken::new();
        tokio::spawn(pump(
            Arc::clone(coordinator.feed()),
            Arc::clone(&subscriptions),
            coordinator.events(),
            pump_cancel.clone(),
        ));

        Self {
            coordinator,
            subscriptions,
            listeners: Mutex::new(ListenerRegistry::new()),
            pump_cancel,
        }
    }

    // =========================================================================
    // Connection lifecycle (delegated)
    // =========================================================================

    /// Explicitly open the connection.
    ///
    /// # Errors
    ///
    /// Propagates the transport's [`ConnectError`].
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.coordinator.connect().await
    }

    /// Close the connection for good.
    pub fn disconnect(&self) {
        self.coordinator.disconnect();
    }

    /// Enable or disable automatic reconnection.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.coordinator.set_auto_reconnect(enabled);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> super::coordinator::ConnectionState {
        self.coordinator.state()
    }

    /// Whether the socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.coordinator.is_connected()
    }

    /// Subscribe to the event surface. Events pass through from the
    /// coordinator unchanged.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.coordinator.events()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe `keys` at `tier`.
    ///
    /// The logical record is updated regardless of connectivity; if the
    /// socket is closed the wire request is queued, not discarded.
    pub fn subscribe(&self, keys: &[InstrumentKey], tier: DetailTier) {
        if keys.is_empty() {
            return;
        }
        self.subscriptions.write().insert(keys, tier);
        self.coordinator
            .feed()
            .send(WireRequest::subscribe(keys.to_vec(), tier));
        tracing::debug!(count = keys.len(), %tier, "subscribed instruments");
    }

    /// Unsubscribe `keys` from whatever tier holds them.
    ///
    /// A wire unsubscribe goes out only for keys that were actually
    /// present; otherwise this is a no-op.
    pub fn unsubscribe(&self, keys: &[InstrumentKey]) {
        let removed = self.subscriptions.write().remove(keys);
        if removed.is_empty() {
            return;
        }
        tracing::debug!(count = removed.len(), "unsubscribed instruments");
        self.coordinator.feed().send(WireRequest::unsubscribe(removed));
    }

    /// Move `keys` to `new_tier`.
    ///
    /// Sends a single change-mode request (a re-subscribe at the new tier)
    /// rather than unsubscribe + subscribe, so live data never gaps.
    pub fn change_tier(&self, keys: &[InstrumentKey], new_tier: DetailTier) {
        if keys.is_empty() {
            return;
        }
        self.subscriptions.write().insert(keys, new_tier);
        self.coordinator
            .feed()
            .send(WireRequest::change_mode(keys.to_vec(), new_tier));
        tracing::debug!(count = keys.len(), tier = %new_tier, "changed instrument tier");
    }

    /// Empty all tier sets without sending unsubscribe requests.
    ///
    /// Used when the server-side session is known to be gone.
    pub fn clear_subscriptions(&self) {
        self.subscriptions.write().clear();
    }

    /// Per-tier subscription counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.subscriptions.read().stats()
    }

    /// A copy of the current logical subscription state.
    #[must_use]
    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscriptions.read().clone()
    }

    // =========================================================================
    // Listener registrations
    // =========================================================================

    /// Register one consumer's interest in `keys` at `tier`.
    ///
    /// Registrations for the same key are deduplicated at the wire level:
    /// only keys no other registration references trigger a wire subscribe.
    pub fn register_listener(&self, keys: &[InstrumentKey], tier: DetailTier) -> ListenerId {
        let (id, newly_referenced) = self.listeners.lock().add(keys, tier);
        if !newly_referenced.is_empty() {
            self.subscribe(&newly_referenced, tier);
        }
        id
    }

    /// Drop a registration.
    ///
    /// A wire unsubscribe goes out only for keys no remaining registration
    /// references.
    pub fn drop_listener(&self, id: ListenerId) {
        if let Some((_, released)) = self.listeners.lock().remove(id)
            && !released.is_empty()
        {
            self.unsubscribe(&released);
        }
    }
}

impl<F: Feeder> Drop for FeedManager<F> {
    fn drop(&mut self) {
        self.pump_cancel.cancel();
    }
}

/// React to connection events: replay subscriptions on open (before the
/// pending queue is flushed), and discard them when the retry budget runs
/// out and the server-side session is unrecoverable.
async fn pump<F: Feeder>(
    feed: Arc<F>,
    subscriptions: Arc<RwLock<SubscriptionState>>,
    mut events: broadcast::Receiver<FeedEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(FeedEvent::Open) => {
                let to_replay = subscriptions.read().non_empty();
                for (tier, keys) in to_replay {
                    tracing::info!(count = keys.len(), %tier, "replaying subscriptions");
                    feed.send(WireRequest::subscribe(keys, tier));
                }
                // Replay goes out first so the server's view of
                // subscriptions is never behind queued requests.
                feed.flush_pending();
            }
            Ok(FeedEvent::AutoReconnectStopped {
                reason: StopReason::RetriesExhausted { .. },
            }) => {
                tracing::warn!("retry budget exhausted, discarding logical subscriptions");
                subscriptions.write().clear();
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "manager event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
