//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! application code and the outside world. Adapters implement these ports.
//!
//! ## Notification Ports
//!
//! - `Broadcaster` - Fan-out of post notifications to connected clients

mod broadcaster;

pub use broadcaster::Broadcaster;
