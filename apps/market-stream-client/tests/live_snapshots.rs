//! Live Snapshot Feed Integration Tests
//!
//! End-to-end behavior of the snapshot merger over the manager stack:
//! interest diffing, partial-update merging, unknown-key hygiene, and the
//! derived connection flag.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::timeout;

use common::{MockFeeder, init_tracing, wait_until};
use market_stream_client::{
    DetailTier, FeedManager, FeedMessage, FullTick, InstrumentKey, LiveSnapshotFeed,
    ReconnectConfig, SymbolSnapshot, TickPayload, WireMethod,
};

fn keys<const N: usize>(names: [&str; N]) -> Vec<InstrumentKey> {
    names.iter().map(ToString::to_string).collect()
}

fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

fn full_tick(last: i64, prev: Option<i64>) -> TickPayload {
    TickPayload::Full(FullTick {
        last_price: dec(last),
        prev_close: prev.map(dec),
        candles: BTreeMap::new(),
        volume: None,
        timestamp: Utc::now(),
    })
}

fn message(entries: &[(&str, TickPayload)]) -> FeedMessage {
    FeedMessage {
        ticks: entries
            .iter()
            .map(|(key, payload)| ((*key).to_string(), payload.clone()))
            .collect(),
    }
}

fn baseline(key: &str, prev_close: Option<i64>) -> SymbolSnapshot {
    let mut snapshot = SymbolSnapshot::new(key);
    snapshot.prev_close = prev_close.map(dec);
    snapshot
}

fn setup() -> (Arc<MockFeeder>, LiveSnapshotFeed<MockFeeder>) {
    init_tracing();
    let feeder = Arc::new(MockFeeder::new());
    let manager = Arc::new(FeedManager::new(
        Arc::clone(&feeder),
        ReconnectConfig {
            interval: Duration::from_millis(5),
            jitter_factor: 0.0,
            max_attempts: 5,
        },
        256,
    ));
    let board = LiveSnapshotFeed::new(manager, DetailTier::Full, 64);
    (feeder, board)
}

// =============================================================================
// End-to-end Scenario
// =============================================================================

#[tokio::test(start_paused = true)]
async fn interest_to_merged_output_end_to_end() {
    let (feeder, board) = setup();

    board.set_interest(vec![baseline("A", Some(100)), baseline("B", Some(200))]);

    feeder.emit_open();
    wait_until(|| feeder.sent_count() >= 2).await;

    // One subscribe for both instruments at the full tier.
    let sent = feeder.sent();
    assert_eq!(sent[0].method, WireMethod::Sub);
    assert_eq!(sent[0].data.instrument_keys, keys(["A", "B"]));
    assert_eq!(sent[0].data.mode, Some(DetailTier::Full));

    let mut updates = board.updates();
    feeder.emit_message(message(&[("A", full_tick(105, None))]));

    let update = timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("no snapshot update")
        .unwrap();

    // The updated subset carries only A, merged with the new price and the
    // percent change derived from the baseline's previous close.
    assert_eq!(update.updated.len(), 1);
    let a = &update.updated[0];
    assert_eq!(a.key, "A");
    assert_eq!(a.last_price, Some(dec(105)));
    assert_eq!(a.day_close, Some(dec(105)));
    assert_eq!(a.change_today_pct, Some(dec(5)));
    assert_eq!(a.prev_close, Some(dec(100)));

    // The full set carries both: A merged, B untouched.
    assert_eq!(update.all.len(), 2);
    let b = update.all.iter().find(|s| s.key == "B").unwrap();
    assert_eq!(b.prev_close, Some(dec(200)));
    assert_eq!(b.last_price, None);

    assert!(board.is_connected());
}

// =============================================================================
// Unknown Keys
// =============================================================================

#[tokio::test(start_paused = true)]
async fn untracked_instruments_are_ignored() {
    let (feeder, board) = setup();

    board.set_interest(vec![baseline("A", Some(100))]);
    feeder.emit_open();
    wait_until(|| feeder.sent_count() >= 2).await;

    let mut updates = board.updates();

    // Late-arriving data for an instrument that was never tracked.
    feeder.emit_message(message(&[("Z", full_tick(50, None))]));

    // No update cycle, no baseline change.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(updates.try_recv().is_err());
    let current = board.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].last_price, None);

    // The pump is still alive: a tracked instrument still comes through.
    feeder.emit_message(message(&[("A", full_tick(101, None))]));
    let update = timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("no snapshot update")
        .unwrap();
    assert_eq!(update.updated.len(), 1);
    assert_eq!(update.updated[0].key, "A");
}

// =============================================================================
// Percent Change Guards
// =============================================================================

#[tokio::test(start_paused = true)]
async fn zero_or_missing_previous_close_omits_percent_change() {
    let (feeder, board) = setup();

    board.set_interest(vec![baseline("ZERO", Some(0)), baseline("NONE", None)]);
    feeder.emit_open();
    wait_until(|| feeder.sent_count() >= 2).await;

    let mut updates = board.updates();
    feeder.emit_message(message(&[
        ("ZERO", full_tick(110, None)),
        ("NONE", full_tick(110, None)),
    ]));

    let update = timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("no snapshot update")
        .unwrap();

    assert_eq!(update.updated.len(), 2);
    for snapshot in &update.updated {
        assert_eq!(snapshot.last_price, Some(dec(110)));
        // Omitted rather than infinity or NaN.
        assert_eq!(snapshot.change_today_pct, None);
    }
}

// =============================================================================
// Interest Churn
// =============================================================================

#[tokio::test(start_paused = true)]
async fn interest_churn_subscribes_and_unsubscribes_the_difference() {
    let (feeder, board) = setup();
    feeder.emit_open();

    board.set_interest(vec![baseline("A", None), baseline("B", None)]);
    let sent = feeder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data.instrument_keys, keys(["A", "B"]));

    board.set_interest(vec![baseline("B", None), baseline("C", None)]);
    let sent = feeder.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].method, WireMethod::Sub);
    assert_eq!(sent[1].data.instrument_keys, keys(["C"]));
    assert_eq!(sent[2].method, WireMethod::Unsub);
    assert_eq!(sent[2].data.instrument_keys, keys(["A"]));

    // No stale entry survives for the removed instrument.
    let tracked: Vec<_> = board.current().into_iter().map(|s| s.key).collect();
    assert_eq!(tracked, keys(["B", "C"]));

    // Re-declaring the same interest is wire-silent.
    board.set_interest(vec![baseline("B", None), baseline("C", None)]);
    assert_eq!(feeder.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn set_interest_replaces_baselines_wholesale() {
    let (feeder, board) = setup();

    board.set_interest(vec![baseline("A", Some(100))]);
    feeder.emit_open();
    wait_until(|| feeder.sent_count() >= 2).await;

    let mut updates = board.updates();
    feeder.emit_message(message(&[("A", full_tick(105, None))]));
    let _ = timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("no snapshot update")
        .unwrap();

    // A fresh baseline for the same key discards the merged live state.
    board.set_interest(vec![baseline("A", Some(110))]);
    let current = board.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].prev_close, Some(dec(110)));
    assert_eq!(current[0].last_price, None);
}

// =============================================================================
// Connection Flag
// =============================================================================

#[tokio::test(start_paused = true)]
async fn is_connected_follows_lifecycle_events() {
    let (feeder, board) = setup();
    assert!(!board.is_connected());

    feeder.emit_open();
    wait_until(|| board.is_connected()).await;

    // A user-initiated disconnect stays down; prior snapshots remain.
    board.set_interest(vec![baseline("A", Some(100))]);
    board.manager().disconnect();
    wait_until(|| !board.is_connected()).await;

    assert_eq!(board.current().len(), 1);
}
