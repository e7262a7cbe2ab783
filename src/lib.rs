//! Post Hub - push notifications for the posts API over WebSocket.
//!
//! The core is the connection [`hub`]: it accepts upgraded sockets, tracks
//! the live set, and fans serialized messages out to all or all-but-one of
//! them while clients come and go.

pub mod adapters;
pub mod application;
pub mod config;
pub mod hub;
pub mod ports;
pub mod telemetry;
