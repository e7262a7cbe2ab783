//! Broadcaster port - Interface for pushing notifications to live clients.
//!
//! Post handlers depend on this trait rather than on the hub itself, so they
//! can be exercised against a recording double.

use async_trait::async_trait;

use crate::hub::{BroadcastReport, ConnectionRef, HubError, PostEvent};

/// Port for fan-out of post notifications.
///
/// Implementations must:
/// - Encode the event once and deliver it to every live client except `exclude`
/// - Never block on a slow client (best-effort, fire-and-forget)
/// - Compare `exclude` by reference, not by identity value
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Broadcast `event`, skipping `exclude` (the connection that caused it).
    async fn broadcast_event(
        &self,
        event: &PostEvent,
        exclude: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn Broadcaster) {}

    #[test]
    fn hub_implements_broadcaster() {
        fn check<T: Broadcaster>() {}
        check::<crate::hub::Hub>();
    }
}
