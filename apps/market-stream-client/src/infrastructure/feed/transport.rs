//! Feed Transport
//!
//! Owns the one physical WebSocket to the vendor feed. Connecting performs
//! the control-endpoint handshake (which yields a time-limited connection
//! URL) and then opens the socket; both awaits run under explicit timeouts.
//!
//! Requests sent while the socket is not open land in a FIFO pending queue
//! and are transmitted exactly once, in order, after the next open; the
//! resynchronization step calls [`Feeder::flush_pending`] once subscription
//! replay has gone out first.
//!
//! A frame that fails to decode is logged and dropped; it never terminates
//! the connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::MsgPackCodec;
use super::messages::FeedFrame;
use super::session::SessionClient;
use crate::application::ports::{ConnectError, Feeder, TransportEvent};
use crate::domain::streaming::WireRequest;
use crate::infrastructure::config::{ClientConfig, Credentials, StreamSettings};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Conn {
    Idle,
    Connecting,
    Open {
        writer: mpsc::UnboundedSender<Message>,
        cancel: CancellationToken,
    },
}

struct Inner {
    settings: StreamSettings,
    session: SessionClient,
    codec: MsgPackCodec,
    conn: Mutex<Conn>,
    pending: Mutex<VecDeque<WireRequest>>,
    user_closed: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
}

impl Inner {
    /// Tear down connection state after the socket dropped out from under us.
    fn on_socket_closed(&self) {
        let prev = std::mem::replace(&mut *self.conn.lock(), Conn::Idle);
        if let Conn::Open { cancel, .. } = prev {
            cancel.cancel();
        }
        let user_initiated = self.user_closed.load(Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed { user_initiated });
    }
}

/// The physical connection to the vendor feed.
///
/// Cheap to share: the transport is used behind an `Arc` and all methods
/// take `&self`. The socket itself is exclusively owned here; subscription
/// and snapshot layers only ever reach it through [`Feeder`] methods.
pub struct FeedTransport {
    inner: Arc<Inner>,
}

impl FeedTransport {
    /// Create a transport from a full client configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_session(
            config.stream.clone(),
            SessionClient::new(config.control_url.clone(), config.credentials.clone()),
        )
    }

    /// Create a transport with explicit settings and session client.
    #[must_use]
    pub fn with_session(settings: StreamSettings, session: SessionClient) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity);
        Self {
            inner: Arc::new(Inner {
                settings,
                session,
                codec: MsgPackCodec::new(),
                conn: Mutex::new(Conn::Idle),
                pending: Mutex::new(VecDeque::new()),
                user_closed: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Create a transport pointed at `control_url` with `credentials`.
    #[must_use]
    pub fn connect_to(
        control_url: impl Into<String>,
        credentials: Credentials,
        settings: StreamSettings,
    ) -> Self {
        let session = SessionClient::new(control_url, credentials);
        Self::with_session(settings, session)
    }

    /// Number of requests currently waiting for an open socket.
    #[must_use]
    pub fn queued_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    async fn establish(&self) -> Result<(), ConnectError> {
        let inner = &self.inner;

        let grant = timeout(inner.settings.handshake_timeout, inner.session.open_session())
            .await
            .map_err(|_| ConnectError::Socket("handshake timed out".to_string()))?
            .map_err(ConnectError::from)?;

        tracing::info!(expires_at = ?grant.expires_at, "feed session granted");

        let (ws, _response) = timeout(
            inner.settings.connect_timeout,
            tokio_tungstenite::connect_async(&grant.url),
        )
        .await
        .map_err(|_| ConnectError::Socket("socket open timed out".to_string()))?
        .map_err(|e| ConnectError::Socket(e.to_string()))?;

        let (write, read) = ws.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(write, writer_rx, cancel.clone()));
        tokio::spawn(read_loop(
            Arc::clone(inner),
            read,
            writer_tx.clone(),
            cancel.clone(),
        ));

        {
            let mut conn = inner.conn.lock();
            if !matches!(*conn, Conn::Connecting) {
                // disconnect() won the race while we were connecting
                cancel.cancel();
                return Err(ConnectError::Socket("connection aborted".to_string()));
            }
            *conn = Conn::Open {
                writer: writer_tx,
                cancel,
            };
        }

        let _ = inner.events.send(TransportEvent::Open);
        Ok(())
    }
}

#[async_trait]
impl Feeder for FeedTransport {
    async fn connect(&self) -> Result<(), ConnectError> {
        {
            let mut conn = self.inner.conn.lock();
            if !matches!(*conn, Conn::Idle) {
                return Ok(());
            }
            *conn = Conn::Connecting;
        }
        self.inner.user_closed.store(false, Ordering::SeqCst);

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut conn = self.inner.conn.lock();
                if matches!(*conn, Conn::Connecting) {
                    *conn = Conn::Idle;
                }
                Err(e)
            }
        }
    }

    fn send(&self, request: WireRequest) {
        let conn = self.inner.conn.lock();
        if let Conn::Open { writer, .. } = &*conn {
            match self.inner.codec.encode_request(&request) {
                Ok(bytes) => {
                    let _ = writer.send(Message::Binary(bytes.into()));
                }
                Err(e) => {
                    tracing::error!(error = %e, request_id = %request.request_id, "failed to encode wire request");
                }
            }
        } else {
            drop(conn);
            tracing::debug!(request_id = %request.request_id, "socket not open, queueing request");
            self.inner.pending.lock().push_back(request);
        }
    }

    fn flush_pending(&self) {
        let drained: Vec<WireRequest> = {
            let mut pending = self.inner.pending.lock();
            pending.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }

        tracing::debug!(count = drained.len(), "flushing queued requests");
        for request in drained {
            self.send(request);
        }
    }

    fn disconnect(&self) {
        self.inner.user_closed.store(true, Ordering::SeqCst);
        self.inner.pending.lock().clear();

        let prev = std::mem::replace(&mut *self.inner.conn.lock(), Conn::Idle);
        match prev {
            Conn::Open { cancel, .. } => {
                // The write loop sends the close frame on cancellation.
                cancel.cancel();
                let _ = self.inner.events.send(TransportEvent::Closed {
                    user_initiated: true,
                });
            }
            Conn::Connecting => {
                tracing::debug!("disconnect during connect, aborting attempt");
            }
            Conn::Idle => {}
        }
    }

    fn is_open(&self) -> bool {
        matches!(*self.inner.conn.lock(), Conn::Open { .. })
    }

    fn should_reconnect(&self) -> bool {
        !self.is_open() && !self.inner.user_closed.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(e) = write.send(message).await {
                            tracing::debug!(error = %e, "socket write failed");
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

async fn read_loop(
    inner: Arc<Inner>,
    mut read: SplitStream<WsStream>,
    writer: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            // User-initiated teardown; disconnect() emits the close event.
            () = cancel.cancelled() => return,
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Binary(data))) => match inner.codec.decode_frame(&data) {
                Ok(FeedFrame::Tick(message)) => {
                    let _ = inner.events.send(TransportEvent::Message(message));
                }
                Ok(FeedFrame::Ack(ack)) => {
                    tracing::debug!(request_id = %ack.request_id, "request acknowledged");
                }
                Ok(FeedFrame::Error(error)) => {
                    tracing::warn!(code = error.code, msg = %error.msg, "feed error frame");
                    let _ = inner.events.send(TransportEvent::Error(error.to_string()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable frame");
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = writer.send(Message::Pong(data));
            }
            Some(Ok(Message::Close(_))) => {
                tracing::info!("server sent close frame");
                inner.on_socket_closed();
                return;
            }
            Some(Ok(_)) => {
                // Text/pong frames are not part of the feed protocol
            }
            Some(Err(e)) => {
                let _ = inner.events.send(TransportEvent::Error(e.to_string()));
                inner.on_socket_closed();
                return;
            }
            None => {
                tracing::info!("socket stream ended");
                inner.on_socket_closed();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::DetailTier;

    fn transport() -> FeedTransport {
        let credentials = Credentials::new("test-token").unwrap();
        FeedTransport::connect_to(
            "http://127.0.0.1:1/session",
            credentials,
            StreamSettings::default(),
        )
    }

    #[test]
    fn send_while_idle_queues_in_order() {
        let transport = transport();

        transport.send(WireRequest::subscribe(
            vec!["A".to_string()],
            DetailTier::Light,
        ));
        transport.send(WireRequest::unsubscribe(vec!["B".to_string()]));

        assert_eq!(transport.queued_requests(), 2);
    }

    #[test]
    fn disconnect_clears_pending_queue() {
        let transport = transport();
        transport.send(WireRequest::unsubscribe(vec!["A".to_string()]));

        transport.disconnect();

        assert_eq!(transport.queued_requests(), 0);
        assert!(!transport.should_reconnect());
    }

    #[test]
    fn fresh_transport_wants_to_connect() {
        let transport = transport();
        assert!(!transport.is_open());
        assert!(transport.should_reconnect());
    }

    #[tokio::test]
    async fn connect_failure_surfaces_socket_error() {
        let transport = transport();

        // Nothing listens on port 1; the handshake must fail fast.
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::Socket(_)));

        // A failed attempt leaves the transport reconnectable.
        assert!(transport.should_reconnect());
    }

    #[tokio::test]
    async fn connect_resets_user_closed() {
        let transport = transport();
        transport.disconnect();
        assert!(!transport.should_reconnect());

        // Even a failing connect clears the user-closed latch.
        let _ = transport.connect().await;
        assert!(transport.should_reconnect());
    }
}
