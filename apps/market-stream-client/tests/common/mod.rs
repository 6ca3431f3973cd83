//! Shared test double: a recording in-memory feeder.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use market_stream_client::{
    ConnectError, FeedMessage, Feeder, TransportEvent, WireRequest,
};

/// An in-memory [`Feeder`] that records every transmitted request and lets
/// tests drive lifecycle events by hand.
pub struct MockFeeder {
    open: AtomicBool,
    user_closed: AtomicBool,
    connect_calls: AtomicU32,
    connect_ok: AtomicBool,
    sent: Mutex<Vec<WireRequest>>,
    pending: Mutex<VecDeque<WireRequest>>,
    events: broadcast::Sender<TransportEvent>,
}

impl MockFeeder {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            open: AtomicBool::new(false),
            user_closed: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            connect_ok: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            events,
        }
    }

    /// Make every subsequent `connect` fail with a socket error.
    pub fn fail_connects(&self) {
        self.connect_ok.store(false, Ordering::SeqCst);
    }

    /// Let `connect` succeed again.
    pub fn connect_ok_again(&self) {
        self.connect_ok.store(true, Ordering::SeqCst);
    }

    /// Simulate the socket transitioning to open.
    pub fn emit_open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.user_closed.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Open);
    }

    /// Simulate an unexpected server-side close.
    pub fn emit_server_close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed {
            user_initiated: false,
        });
    }

    /// Simulate one inbound data frame.
    pub fn emit_message(&self, message: FeedMessage) {
        let _ = self.events.send(TransportEvent::Message(message));
    }

    /// Everything transmitted so far, in order.
    pub fn sent(&self) -> Vec<WireRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Feeder for MockFeeder {
    async fn connect(&self) -> Result<(), ConnectError> {
        if self.open.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.connect_ok.load(Ordering::SeqCst) {
            self.emit_open();
            Ok(())
        } else {
            Err(ConnectError::Socket("connection refused".to_string()))
        }
    }

    fn send(&self, request: WireRequest) {
        if self.open.load(Ordering::SeqCst) {
            self.sent.lock().push(request);
        } else {
            self.pending.lock().push_back(request);
        }
    }

    fn flush_pending(&self) {
        let drained: Vec<WireRequest> = self.pending.lock().drain(..).collect();
        for request in drained {
            self.send(request);
        }
    }

    fn disconnect(&self) {
        self.user_closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Closed {
                user_initiated: true,
            });
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn should_reconnect(&self) -> bool {
        !self.is_open() && !self.user_closed.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Install a test-writer tracing subscriber, once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not met in time");
}
