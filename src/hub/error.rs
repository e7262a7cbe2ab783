//! Hub error types.

use thiserror::Error;

/// Errors surfaced by the connection hub.
///
/// None of these are fatal to the process. Write failures never appear here:
/// they stay local to the affected connection's write loop.
#[derive(Debug, Error)]
pub enum HubError {
    /// Broadcast payload could not be encoded to its wire form.
    #[error("Failed to serialize broadcast payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event loop is gone and no longer accepts connect/disconnect events.
    #[error("Hub event loop is not running")]
    EventLoopClosed,
}
