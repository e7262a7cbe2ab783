//! Adapters - Implementations at the system boundary.
//!
//! - `http` - axum router, REST banner/health, WebSocket upgrade

pub mod http;
