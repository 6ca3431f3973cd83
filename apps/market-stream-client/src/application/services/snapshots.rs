//! Live Snapshot Feed
//!
//! Bridges a changing "set of instruments the UI currently cares about" to
//! the subscription manager and turns raw feed messages into merged,
//! UI-consumable snapshots.
//!
//! Callers hand over baseline [`SymbolSnapshot`]s via [`LiveSnapshotFeed::set_interest`];
//! the feed diffs the keys against the previous interest set, adjusts
//! subscriptions, and from then on publishes one [`SnapshotUpdate`] per
//! delivery cycle: the complete merged set plus the subset actually touched
//! by that cycle's message. While the connection is down, consumers simply
//! stop receiving updates; prior snapshots stay visible rather than
//! blanking out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Feeder;
use crate::domain::snapshot::{PartialUpdate, SymbolSnapshot};
use crate::domain::streaming::{FeedMessage, InstrumentKey};
use crate::domain::subscription::DetailTier;
use crate::infrastructure::feed::{FeedEvent, FeedManager};

/// One delivery cycle's output.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    /// The complete merged set, most entries unchanged.
    pub all: Vec<SymbolSnapshot>,
    /// Only the snapshots touched by this cycle's message.
    pub updated: Vec<SymbolSnapshot>,
}

struct Board {
    tracked: RwLock<BTreeMap<InstrumentKey, SymbolSnapshot>>,
    connected: AtomicBool,
    updates: broadcast::Sender<SnapshotUpdate>,
}

impl Board {
    fn apply_message(&self, message: &FeedMessage) {
        let mut tracked = self.tracked.write();
        let mut updated = Vec::new();

        for (key, payload) in &message.ticks {
            // Late-arriving data for an instrument we just dropped.
            let Some(baseline) = tracked.get(key) else {
                continue;
            };

            let partial = PartialUpdate::from_payload(payload, baseline.prev_close);
            let merged = baseline.merged(&partial);
            tracked.insert(key.clone(), merged.clone());
            updated.push(merged);
        }

        if updated.is_empty() {
            return;
        }

        let all = tracked.values().cloned().collect();
        drop(tracked);

        let _ = self.updates.send(SnapshotUpdate { all, updated });
    }
}

/// Merges live ticks onto caller-supplied snapshot baselines.
pub struct LiveSnapshotFeed<F: Feeder> {
    manager: Arc<FeedManager<F>>,
    tier: DetailTier,
    board: Arc<Board>,
    pump_cancel: CancellationToken,
}

impl<F: Feeder> LiveSnapshotFeed<F> {
    /// Create a snapshot feed subscribing interest at `tier`.
    #[must_use]
    pub fn new(manager: Arc<FeedManager<F>>, tier: DetailTier, update_capacity: usize) -> Self {
        let events = manager.events();
        let (updates, _) = broadcast::channel(update_capacity);

        let board = Arc::new(Board {
            tracked: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(manager.is_connected()),
            updates,
        });

        let pump_cancel = CancellationToken::new();
        tokio::spawn(pump(Arc::clone(&board), events, pump_cancel.clone()));

        Self {
            manager,
            tier,
            board,
            pump_cancel,
        }
    }

    /// Declare the instruments of interest, with their baseline snapshots.
    ///
    /// Newly-appearing keys are subscribed, vanished keys unsubscribed, and
    /// the internal baseline map is replaced wholesale, so no stale entries
    /// survive for removed instruments. Cheap to call repeatedly as the
    /// UI's interest churns.
    pub fn set_interest(&self, symbols: Vec<SymbolSnapshot>) {
        let next: BTreeMap<InstrumentKey, SymbolSnapshot> = symbols
            .into_iter()
            .map(|snapshot| (snapshot.key.clone(), snapshot))
            .collect();

        let (to_subscribe, to_unsubscribe) = {
            let mut tracked = self.board.tracked.write();

            let to_subscribe: Vec<InstrumentKey> = next
                .keys()
                .filter(|key| !tracked.contains_key(*key))
                .cloned()
                .collect();
            let to_unsubscribe: Vec<InstrumentKey> = tracked
                .keys()
                .filter(|key| !next.contains_key(*key))
                .cloned()
                .collect();

            *tracked = next;
            (to_subscribe, to_unsubscribe)
        };

        if !to_subscribe.is_empty() {
            self.manager.subscribe(&to_subscribe, self.tier);
        }
        if !to_unsubscribe.is_empty() {
            self.manager.unsubscribe(&to_unsubscribe);
        }
    }

    /// Subscribe to per-cycle snapshot updates.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.board.updates.subscribe()
    }

    /// The current merged snapshots for every tracked instrument.
    #[must_use]
    pub fn current(&self) -> Vec<SymbolSnapshot> {
        self.board.tracked.read().values().cloned().collect()
    }

    /// Connection state as of the last lifecycle event.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.board.connected.load(Ordering::SeqCst)
    }

    /// The manager this feed drives.
    #[must_use]
    pub fn manager(&self) -> &Arc<FeedManager<F>> {
        &self.manager
    }
}

impl<F: Feeder> Drop for LiveSnapshotFeed<F> {
    fn drop(&mut self) {
        self.pump_cancel.cancel();
    }
}

async fn pump(
    board: Arc<Board>,
    mut events: broadcast::Receiver<FeedEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(FeedEvent::Message(message)) => board.apply_message(&message),
            Ok(FeedEvent::Open) => board.connected.store(true, Ordering::SeqCst),
            Ok(FeedEvent::Close | FeedEvent::AutoReconnectStopped { .. }) => {
                board.connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "snapshot event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
