//! Axum router configuration.
//!
//! # Routes
//!
//! - `GET /` - Service banner
//! - `GET /health` - Liveness plus live connection count
//! - `GET /ws` - WebSocket upgrade for push notifications

use axum::{extract::State, routing::get, Json, Router};
use http::{HeaderValue, Method};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::hub::Hub;

use super::ws_handler::ws_handler;

/// State shared by every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
}

impl AppState {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub message: String,
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

async fn home_handler() -> Json<HomeResponse> {
    Json(HomeResponse {
        message: "Welcome to Post Hub".to_string(),
        status: true,
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.hub.connection_count().await,
    })
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// Assemble the full application router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`;
/// the upgrade endpoint derives connection identity from the peer address.
pub fn app_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .merge(websocket_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(server))
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins = server.cors_origins_list();
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
