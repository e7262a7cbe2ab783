//! HTTP adapters - axum routes and the WebSocket upgrade endpoint.

pub mod routes;
pub mod ws_handler;

pub use routes::{app_router, websocket_router, AppState, HealthResponse, HomeResponse};
pub use ws_handler::ws_handler;
