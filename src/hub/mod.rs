//! Connection hub: live WebSocket clients and broadcast fan-out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  connect   ┌──────────────────────────────┐
//! │  GET /ws (upgrade)   │───────────▶│          EventLoop           │
//! └──────────────────────┘            │  single consumer, applies    │
//!            │ spawns                 │  connect/disconnect in order │
//!            ▼                        └──────────────────────────────┘
//! ┌──────────────────────┐ disconnect               │ insert/remove
//! │ Connection           │─────────────────────────▶│
//! │  write loop          │                          ▼
//! │  read pump           │            ┌──────────────────────────────┐
//! └──────────────────────┘◀──queue────│           Registry           │
//!                                     │  RwLock<HashMap<Id, Conn>>   │
//!                                     └──────────────────────────────┘
//!                                                   ▲ broadcast
//!                                     ┌──────────────────────────────┐
//!                                     │  PostNotifier / any caller   │
//!                                     └──────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`connection`] - one client: outbound queue, write loop, read pump
//! - [`registry`] - guarded set of live connections, fan-out
//! - [`event_loop`] - serialized connect/disconnect processing
//! - [`messages`] - outbound payload types
//!
//! One [`Hub`] is built at startup and cloned into whatever needs it.

pub mod connection;
pub mod error;
pub mod event_loop;
pub mod messages;
pub mod registry;

pub use connection::{Connection, ConnectionId, ConnectionRef, Delivery, Outbox};
pub use error::HubError;
pub use event_loop::{EventLoop, EventSender, HubEvent};
pub use messages::PostEvent;
pub use registry::{BroadcastReport, Registration, Registry};

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, Stream};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::ports::Broadcaster;

/// Handle to the process-wide connection hub.
///
/// Cheap to clone; every clone talks to the same registry and event loop.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    events: EventSender,
    outbound_capacity: usize,
}

impl Hub {
    /// Build a hub and the event loop that must be run for it.
    pub fn new(config: &HubConfig) -> (Self, EventLoop) {
        let registry = Arc::new(Registry::new());
        let (events, rx) = event_loop::event_channel(config.event_queue_capacity);
        let hub = Self {
            registry: Arc::clone(&registry),
            events,
            outbound_capacity: config.outbound_queue_capacity,
        };
        (hub, EventLoop::new(rx, registry))
    }

    /// Build a hub and spawn its event loop.
    ///
    /// The returned task finishes once every hub clone and every connection
    /// task has been dropped.
    pub fn start(config: &HubConfig) -> (Self, JoinHandle<()>) {
        let (hub, event_loop) = Self::new(config);
        (hub, tokio::spawn(event_loop.run()))
    }

    /// Create a connection for `remote_addr`; it is not live until its
    /// connect event has been processed.
    pub fn open(&self, remote_addr: SocketAddr) -> (ConnectionRef, Outbox) {
        Connection::new(remote_addr, self.outbound_capacity)
    }

    /// Run one upgraded socket for its whole lifetime.
    ///
    /// Submits the connect event, spawns the write loop, then drives the read
    /// pump on the calling task until the peer leaves or the hub closes the
    /// connection.
    pub async fn serve<Si, St, E>(
        &self,
        remote_addr: SocketAddr,
        sink: Si,
        stream: St,
    ) -> Result<(), HubError>
    where
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: fmt::Display + Send,
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let (connection, outbox) = self.open(remote_addr);
        self.events.connect(Arc::clone(&connection)).await?;

        tokio::spawn(Arc::clone(&connection).write_loop(sink, outbox, self.events.clone()));
        connection.read_pump(stream, self.events.clone()).await;
        Ok(())
    }

    /// Serialize `message` once and queue it for every live connection
    /// except `exclude`.
    ///
    /// Fire-and-forget: the report says what was queued, not what was
    /// written. A serialization failure abandons this broadcast only.
    pub async fn broadcast<T>(
        &self,
        message: &T,
        exclude: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError>
    where
        T: Serialize + ?Sized,
    {
        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!("Broadcast payload failed to serialize: {}", e);
                return Err(HubError::Serialization(e));
            }
        };

        let report = self.registry.fan_out(&payload, exclude).await;
        if report.dropped > 0 {
            tracing::warn!(
                queued = report.queued,
                dropped = report.dropped,
                msg_len = payload.len(),
                "Broadcast dropped for full or closed connections"
            );
        }
        Ok(report)
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn connection(&self, id: &ConnectionId) -> Option<ConnectionRef> {
        self.registry.get(id).await
    }

    pub async fn is_registered(&self, connection: &ConnectionRef) -> bool {
        self.registry.contains(connection).await
    }

    /// Tear down every live connection through the event loop.
    ///
    /// Connect events processed afterwards are refused, so no connection
    /// outlives this call for longer than its own teardown.
    pub async fn shutdown(&self) {
        let live = self.registry.seal().await;
        tracing::info!(live_connections = live.len(), "Closing all connections");

        for connection in live {
            if self.events.disconnect(Arc::clone(&connection)).await.is_err() {
                connection.close();
            }
        }
    }
}

#[async_trait]
impl Broadcaster for Hub {
    async fn broadcast_event(
        &self,
        event: &PostEvent,
        exclude: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError> {
        self.broadcast(event, exclude).await
    }
}
