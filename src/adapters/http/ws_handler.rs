//! WebSocket upgrade endpoint.
//!
//! Handles the HTTP → WebSocket upgrade and hands the socket to the hub:
//! 1. Reject requests that are not a valid upgrade (4xx, nothing created)
//! 2. Upgrade to WebSocket
//! 3. Submit the connect event and start the write loop
//! 4. Drain inbound frames until the peer leaves or the hub closes us

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use crate::hub::Hub;

use super::routes::AppState;

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
///
/// No sub-protocol negotiation and no credential check; an auth layer, if
/// any, runs before this handler.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(
                remote_addr = %remote_addr,
                "WebSocket handshake rejected: {}",
                rejection
            );
            return rejection.into_response();
        }
    };

    let hub = state.hub.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(remote_addr = %remote_addr, "WebSocket upgrade failed: {}", e);
    })
    .on_upgrade(move |socket| handle_socket(socket, remote_addr, hub))
}

/// Run an established WebSocket connection until it is torn down.
async fn handle_socket(socket: WebSocket, remote_addr: SocketAddr, hub: Hub) {
    let (sender, receiver) = socket.split();

    if let Err(e) = hub.serve(remote_addr, sender, receiver).await {
        tracing::warn!(
            remote_addr = %remote_addr,
            "Could not register connection: {}",
            e
        );
    }
}
