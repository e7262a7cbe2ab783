//! The set of live connections and broadcast fan-out.
//!
//! Membership is only changed by the event loop. Broadcasts take the read
//! side of the lock, so they run concurrently with each other but never
//! with an add or remove. No I/O happens while the lock is held: enqueueing
//! is a non-blocking `try_send`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::{ConnectionId, ConnectionRef, Delivery};

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Newly tracked; `live` is the count after insertion.
    Added { live: usize },
    /// This exact connection was already tracked.
    AlreadyRegistered,
    /// A different live connection holds the same identity.
    IdentityTaken,
    /// The registry was sealed for shutdown.
    Sealed,
}

/// Per-call broadcast tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Payload placed on a connection's outbound queue.
    pub queued: usize,
    /// Target's queue was full or already closed.
    pub dropped: usize,
    /// Skipped because it was the excluded connection.
    pub excluded: usize,
}

/// Live connections keyed by identity.
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, ConnectionRef>>,
    // Only flipped while the write guard is held.
    sealed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, connection: ConnectionRef) -> Registration {
        let mut connections = self.connections.write().await;
        if self.sealed.load(Ordering::Acquire) {
            return Registration::Sealed;
        }

        match connections.entry(connection.id().clone()) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), &connection) => {
                Registration::AlreadyRegistered
            }
            Entry::Occupied(_) => Registration::IdentityTaken,
            Entry::Vacant(entry) => {
                entry.insert(connection);
                Registration::Added {
                    live: connections.len(),
                }
            }
        }
    }

    /// Remove `connection` if it is the tracked holder of its identity.
    ///
    /// Returns the remaining live count, or `None` when nothing was removed.
    pub(crate) async fn remove(&self, connection: &ConnectionRef) -> Option<usize> {
        let mut connections = self.connections.write().await;

        match connections.entry(connection.id().clone()) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), connection) => {
                entry.remove();
                Some(connections.len())
            }
            _ => None,
        }
    }

    /// Enqueue `payload` on every live connection except `exclude`.
    pub(crate) async fn fan_out(
        &self,
        payload: &Arc<str>,
        exclude: Option<&ConnectionRef>,
    ) -> BroadcastReport {
        let connections = self.connections.read().await;
        let mut report = BroadcastReport::default();

        for connection in connections.values() {
            if exclude.is_some_and(|excluded| Arc::ptr_eq(excluded, connection)) {
                report.excluded += 1;
                continue;
            }

            match connection.enqueue(Arc::clone(payload)) {
                Delivery::Queued => report.queued += 1,
                Delivery::DroppedFull | Delivery::DroppedClosed => report.dropped += 1,
            }
        }

        report
    }

    pub async fn get(&self, id: &ConnectionId) -> Option<ConnectionRef> {
        self.connections.read().await.get(id).cloned()
    }

    pub async fn contains(&self, connection: &ConnectionRef) -> bool {
        self.connections
            .read()
            .await
            .get(connection.id())
            .is_some_and(|tracked| Arc::ptr_eq(tracked, connection))
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Refuse every later insert and return the connections live now.
    ///
    /// Anything inserted before the seal is in the returned list; anything
    /// after is refused, so the list is final.
    pub(crate) async fn seal(&self) -> Vec<ConnectionRef> {
        let connections = self.connections.write().await;
        self.sealed.store(true, Ordering::Release);
        connections.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::connection::{Connection, Outbox};
    use std::net::SocketAddr;

    fn connection(port: u16) -> (ConnectionRef, Outbox) {
        Connection::new(SocketAddr::from(([192, 168, 0, 5], port)), 4)
    }

    fn drain(outbox: &mut Outbox) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(payload) = outbox.try_recv() {
            out.push(payload.to_string());
        }
        out
    }

    #[tokio::test]
    async fn insert_reports_live_count() {
        let registry = Registry::new();
        let (a, _oa) = connection(1);
        let (b, _ob) = connection(2);

        assert_eq!(registry.insert(a).await, Registration::Added { live: 1 });
        assert_eq!(registry.insert(b).await, Registration::Added { live: 2 });
    }

    #[tokio::test]
    async fn remove_requires_same_connection() {
        let registry = Registry::new();
        let (tracked, _o1) = connection(1);
        let (lookalike, _o2) = connection(1);

        registry.insert(tracked.clone()).await;
        assert_eq!(registry.remove(&lookalike).await, None);
        assert_eq!(registry.remove(&tracked).await, Some(0));
        assert_eq!(registry.remove(&tracked).await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn fan_out_skips_excluded_connection() {
        let registry = Registry::new();
        let (a, mut oa) = connection(1);
        let (b, mut ob) = connection(2);
        let (c, mut oc) = connection(3);
        for conn in [&a, &b, &c] {
            registry.insert(conn.clone()).await;
        }

        let payload: Arc<str> = Arc::from(r#"{"event":"post_created","id":"1"}"#);
        let report = registry.fan_out(&payload, Some(&b)).await;

        assert_eq!(
            report,
            BroadcastReport {
                queued: 2,
                dropped: 0,
                excluded: 1
            }
        );
        assert_eq!(drain(&mut oa), vec![payload.to_string()]);
        assert!(drain(&mut ob).is_empty());
        assert_eq!(drain(&mut oc), vec![payload.to_string()]);
    }

    #[tokio::test]
    async fn exclusion_is_by_reference_not_identity() {
        let registry = Registry::new();
        let (tracked, mut outbox) = connection(1);
        let (lookalike, _o2) = connection(1);
        registry.insert(tracked).await;

        let payload: Arc<str> = Arc::from("x");
        let report = registry.fan_out(&payload, Some(&lookalike)).await;

        assert_eq!(report.queued, 1);
        assert_eq!(report.excluded, 0);
        assert_eq!(drain(&mut outbox), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn fan_out_counts_closed_targets_as_dropped() {
        let registry = Registry::new();
        let (a, _oa) = connection(1);
        let (b, _ob) = connection(2);
        registry.insert(a.clone()).await;
        registry.insert(b).await;
        a.close();

        let report = registry.fan_out(&Arc::from("x"), None).await;
        assert_eq!(report.queued, 1);
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test]
    async fn get_and_contains_follow_membership() {
        let registry = Registry::new();
        let (a, _oa) = connection(1);
        registry.insert(a.clone()).await;

        let found = registry.get(a.id()).await.unwrap();
        assert!(Arc::ptr_eq(&found, &a));
        assert!(registry.contains(&a).await);
    }

    #[tokio::test]
    async fn sealed_registry_refuses_new_connections() {
        let registry = Registry::new();
        let (a, _oa) = connection(1);
        let (b, _ob) = connection(2);
        registry.insert(a.clone()).await;

        let live = registry.seal().await;
        assert_eq!(live.len(), 1);
        assert!(Arc::ptr_eq(&live[0], &a));

        assert_eq!(registry.insert(b.clone()).await, Registration::Sealed);
        assert!(!registry.contains(&b).await);
        assert_eq!(registry.remove(&a).await, Some(0));
    }
}
