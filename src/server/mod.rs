//! Server module
//!
//! HTTP surface for opening, reading and closing polls.

pub mod http;

pub use http::{build_router, AppState};

use crate::polls::PollEngine;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Serve `engine` on `address` until SIGINT or SIGTERM
pub async fn run(address: &str, engine: Arc<PollEngine>) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(engine));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "chatpoll listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chatpoll shutdown complete");
    Ok(())
}

/// Resolves when a shutdown signal (SIGTERM, SIGINT) arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown"),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
