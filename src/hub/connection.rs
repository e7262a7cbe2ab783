//! A single live WebSocket client.
//!
//! A [`Connection`] owns a bounded outbound queue. Its socket is split in two
//! halves that are driven separately:
//!
//! ```text
//!  Registry::broadcast ──try_send──▶ outbound queue ──▶ write loop ──▶ socket sink
//!                                                                   │
//!  socket stream ──▶ read pump ── close/error ──┐        write error ┘
//!                                               ▼
//!                                     disconnect event (at most once)
//! ```
//!
//! Both halves stop as soon as the connection is closed by the event loop.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use super::event_loop::EventSender;

/// Shared handle to a connection.
///
/// Exclusion during broadcast compares these by pointer, not by value.
pub type ConnectionRef = Arc<Connection>;

/// Consumer end of a connection's outbound queue, owned by its write loop.
pub type Outbox = mpsc::Receiver<Arc<str>>;

/// Identity of a connection, derived from the peer address at connect time.
///
/// Unique among live connections; an address may be reused once the
/// previous holder has disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ConnectionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of handing one payload to one connection's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Payload is waiting in the outbound queue.
    Queued,
    /// Queue was full; payload dropped.
    DroppedFull,
    /// Connection already closed; payload dropped.
    DroppedClosed,
}

/// One accepted WebSocket client.
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Arc<str>>,
    closed: watch::Sender<bool>,
    disconnect_requested: AtomicBool,
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection for `remote_addr` with an outbound queue of
    /// `capacity` messages.
    ///
    /// Returns the shared handle and the queue's consumer end, which must be
    /// handed to [`Connection::write_loop`].
    pub fn new(remote_addr: SocketAddr, capacity: usize) -> (ConnectionRef, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let connection = Arc::new(Self {
            id: ConnectionId::from(remote_addr),
            remote_addr,
            outbound: tx,
            closed,
            disconnect_requested: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        (connection, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Number of payloads dropped because the outbound queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark the connection closed.
    ///
    /// The write loop sends a close frame and stops, the read pump stops, and
    /// every later enqueue is dropped. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Non-blocking enqueue used by broadcast.
    ///
    /// Called under the registry read guard: must not log or block.
    pub(crate) fn enqueue(&self, payload: Arc<str>) -> Delivery {
        if self.is_closed() {
            return Delivery::DroppedClosed;
        }

        match self.outbound.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::DroppedFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::DroppedClosed,
        }
    }

    /// Resolves once the connection has been closed.
    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Submit this connection's disconnect event, at most once.
    ///
    /// Nothing is submitted if the event loop already closed the connection.
    async fn request_disconnect(self: &Arc<Self>, events: &EventSender) {
        if self.is_closed() || self.disconnect_requested.swap(true, Ordering::AcqRel) {
            return;
        }

        if events.disconnect(Arc::clone(self)).await.is_err() {
            // No event loop left to tear us down.
            self.close();
        }
    }

    /// Drain the outbound queue into `sink` in FIFO order.
    ///
    /// Stops on the first failed write (submitting a disconnect event) or
    /// when the connection is closed (sending a close frame first). Queued
    /// payloads left behind are discarded.
    pub async fn write_loop<S>(
        self: Arc<Self>,
        mut sink: S,
        mut outbox: Outbox,
        events: EventSender,
    )
    where
        S: Sink<Message> + Unpin,
        S::Error: fmt::Display,
    {
        tracing::trace!(connection_id = %self.id, "Write loop started");

        loop {
            tokio::select! {
                biased;

                _ = self.closed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
                next = outbox.recv() => {
                    let Some(payload) = next else { break };
                    if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                        tracing::debug!(
                            connection_id = %self.id,
                            "Write failed, disconnecting: {}",
                            e
                        );
                        self.request_disconnect(&events).await;
                        break;
                    }
                }
            }
        }

        outbox.close();
        tracing::trace!(connection_id = %self.id, "Write loop stopped");
    }

    /// Drain inbound frames until the peer goes away.
    ///
    /// Clients do not send application messages; text frames are ignored.
    /// A close frame, end of stream or read error submits a disconnect event.
    pub async fn read_pump<S, E>(self: Arc<Self>, mut stream: S, events: EventSender)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            tokio::select! {
                biased;

                _ = self.closed() => break,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(
                            connection_id = %self.id,
                            len = text.len(),
                            "Ignoring inbound text frame"
                        );
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(
                            connection_id = %self.id,
                            "Received unsupported binary message"
                        );
                    }
                    // Protocol ping/pong is answered by the socket itself
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %self.id, "Peer closed connection");
                        self.request_disconnect(&events).await;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %self.id, "Receive error: {}", e);
                        self.request_disconnect(&events).await;
                        break;
                    }
                },
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::event_loop::{event_channel, HubEvent};
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn text(s: &str) -> Message {
        Message::Text(s.to_string())
    }

    #[test]
    fn id_is_derived_from_remote_address() {
        let (conn, _outbox) = Connection::new(addr(4100), 4);
        assert_eq!(conn.id().as_str(), "127.0.0.1:4100");
        assert_eq!(conn.remote_addr(), addr(4100));
    }

    #[tokio::test]
    async fn write_loop_preserves_fifo_order() {
        let (conn, outbox) = Connection::new(addr(4101), 8);
        let (events, _event_rx) = event_channel(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();

        for msg in ["m1", "m2", "m3"] {
            assert_eq!(conn.enqueue(Arc::from(msg)), Delivery::Queued);
        }
        tokio::spawn(conn.clone().write_loop(sink, outbox, events));

        for expected in ["m1", "m2", "m3"] {
            let got = timeout(WAIT, written.next()).await.unwrap().unwrap();
            assert_eq!(got, text(expected));
        }
    }

    #[tokio::test]
    async fn write_failure_submits_single_disconnect() {
        let (conn, outbox) = Connection::new(addr(4102), 8);
        let (events, mut event_rx) = event_channel(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);

        conn.enqueue(Arc::from("first"));
        conn.enqueue(Arc::from("second"));
        timeout(WAIT, conn.clone().write_loop(sink, outbox, events.clone()))
            .await
            .unwrap();

        // Peer also looks gone to the read side; must not produce a second event.
        let inbound = futures::stream::empty::<Result<Message, std::io::Error>>();
        timeout(WAIT, conn.clone().read_pump(inbound, events))
            .await
            .unwrap();

        match event_rx.try_recv() {
            Ok(HubEvent::Disconnect(c)) => assert!(Arc::ptr_eq(&c, &conn)),
            other => panic!("expected disconnect event, got {:?}", other),
        }
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_stops_write_loop_with_close_frame() {
        let (conn, outbox) = Connection::new(addr(4103), 8);
        let (events, mut event_rx) = event_channel(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();

        let handle = tokio::spawn(conn.clone().write_loop(sink, outbox, events));
        conn.close();
        timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(written.next().await, Some(Message::Close(None)));
        assert_eq!(conn.enqueue(Arc::from("late")), Delivery::DroppedClosed);
        // Closed by the event loop: no self-initiated disconnect.
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let (conn, _outbox) = Connection::new(addr(4104), 2);

        assert_eq!(conn.enqueue(Arc::from("a")), Delivery::Queued);
        assert_eq!(conn.enqueue(Arc::from("b")), Delivery::Queued);
        assert_eq!(conn.enqueue(Arc::from("c")), Delivery::DroppedFull);
        assert_eq!(conn.enqueue(Arc::from("d")), Delivery::DroppedFull);
        assert_eq!(conn.dropped_count(), 2);
    }

    #[tokio::test]
    async fn enqueue_after_outbox_dropped_is_silent() {
        let (conn, outbox) = Connection::new(addr(4105), 2);
        drop(outbox);
        assert_eq!(conn.enqueue(Arc::from("a")), Delivery::DroppedClosed);
    }

    #[tokio::test]
    async fn read_pump_ignores_text_and_disconnects_on_close_frame() {
        let (conn, _outbox) = Connection::new(addr(4106), 2);
        let (events, mut event_rx) = event_channel(8);
        let frames: Vec<Result<Message, std::io::Error>> = vec![
            Ok(text("hello")),
            Ok(Message::Ping(vec![1])),
            Ok(Message::Close(None)),
            Ok(text("never read")),
        ];

        timeout(WAIT, conn.clone().read_pump(futures::stream::iter(frames), events))
            .await
            .unwrap();

        assert!(matches!(event_rx.try_recv(), Ok(HubEvent::Disconnect(_))));
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_pump_stops_when_closed() {
        let (conn, _outbox) = Connection::new(addr(4107), 2);
        let (events, mut event_rx) = event_channel(8);
        let handle = tokio::spawn(
            conn.clone()
                .read_pump(futures::stream::pending::<Result<Message, std::io::Error>>(), events),
        );

        conn.close();
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(event_rx.try_recv().is_err());
    }
}
