use std::net::SocketAddr;
use std::time::Duration;

use post_hub::adapters::http::{app_router, AppState};
use post_hub::config::AppConfig;
use post_hub::hub::Hub;
use post_hub::telemetry;

/// How long to wait for connection tasks to wind down after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load()?;
    config.validate()?;
    telemetry::init(&config.server)?;

    let (hub, event_loop) = Hub::start(&config.hub);
    let app = app_router(AppState::new(hub.clone()), &config.server);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Post Hub listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    hub.shutdown().await;
    drop(hub);

    if tokio::time::timeout(DRAIN_TIMEOUT, event_loop).await.is_err() {
        tracing::warn!("Connections still draining at exit");
    }
    tracing::info!("Post Hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
