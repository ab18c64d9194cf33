//! HTTP surface: discovery ingestion and the metrics endpoint

pub mod metrics;
pub mod routes;

use std::future::Future;
use std::io;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use routes::{AppState, router};

/// Serve `app` on `listener` until `shutdown` completes
pub async fn run<F>(listener: TcpListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(address) = listener.local_addr() {
        info!("Listening on {}", address);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
