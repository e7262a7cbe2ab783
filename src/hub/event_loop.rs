//! The single serialized point of mutation for registry membership.
//!
//! Connect and disconnect events travel on one bounded channel and are
//! applied one at a time, so the registry never observes two structural
//! changes at once and per-source submission order is kept.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::connection::ConnectionRef;
use super::error::HubError;
use super::registry::{Registration, Registry};

/// A structural change to the set of live connections.
#[derive(Debug)]
pub enum HubEvent {
    Connect(ConnectionRef),
    Disconnect(ConnectionRef),
}

/// Submission side of the event queue.
///
/// Sends wait while the queue is full; they never deadlock against the
/// event loop, which does no blocking work between receives.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<HubEvent>,
}

impl EventSender {
    pub async fn connect(&self, connection: ConnectionRef) -> Result<(), HubError> {
        self.submit(HubEvent::Connect(connection)).await
    }

    pub async fn disconnect(&self, connection: ConnectionRef) -> Result<(), HubError> {
        self.submit(HubEvent::Disconnect(connection)).await
    }

    async fn submit(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| HubError::EventLoopClosed)
    }
}

/// Bounded event queue; the receiver belongs to exactly one [`EventLoop`].
pub(crate) fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<HubEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, rx)
}

/// Consumer of the event queue.
///
/// Runs until every [`EventSender`] has been dropped.
pub struct EventLoop {
    events: mpsc::Receiver<HubEvent>,
    registry: Arc<Registry>,
}

impl EventLoop {
    pub(crate) fn new(events: mpsc::Receiver<HubEvent>, registry: Arc<Registry>) -> Self {
        Self { events, registry }
    }

    pub async fn run(mut self) {
        tracing::debug!("Hub event loop started");

        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }

        tracing::debug!("Hub event loop stopped");
    }

    pub(crate) async fn handle(&self, event: HubEvent) {
        match event {
            HubEvent::Connect(connection) => self.on_connect(connection).await,
            HubEvent::Disconnect(connection) => self.on_disconnect(connection).await,
        }
    }

    async fn on_connect(&self, connection: ConnectionRef) {
        if connection.is_closed() {
            tracing::debug!(
                connection_id = %connection.id(),
                "Connection closed before registration, ignoring"
            );
            return;
        }

        match self.registry.insert(Arc::clone(&connection)).await {
            Registration::Added { live } => {
                tracing::info!(
                    connection_id = %connection.id(),
                    remote_addr = %connection.remote_addr(),
                    live_connections = live,
                    "Client connected"
                );
            }
            Registration::AlreadyRegistered => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    "Duplicate connect event ignored"
                );
            }
            Registration::IdentityTaken => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    "Identity held by another live connection, refusing"
                );
                connection.close();
            }
            Registration::Sealed => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    "Hub shutting down, refusing connection"
                );
                connection.close();
            }
        }
    }

    async fn on_disconnect(&self, connection: ConnectionRef) {
        connection.close();

        match self.registry.remove(&connection).await {
            Some(live) => {
                tracing::info!(
                    connection_id = %connection.id(),
                    remote_addr = %connection.remote_addr(),
                    live_connections = live,
                    "Client disconnected"
                );
            }
            None => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    "Disconnect for unregistered connection ignored"
                );
            }
        }
    }
}
