//! HTTP surface for wxhub: snapshot queries, on-demand ingestion and the
//! WebSocket forecast feed.

pub mod error;
pub mod hub;
pub mod snapshot;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ApiError;
pub use hub::{BroadcastHub, DeliveryError, SubscriberId, SubscriberSink};
pub use snapshot::SnapshotResponse;
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(snapshot::read_latest))
        .route("/fetch", post(snapshot::fetch_by_location))
        .route("/fetch/{city}/{country}", get(snapshot::ingest_location))
        .route("/forecast/cached", get(snapshot::cached_forecast))
        .route("/health", get(snapshot::health))
        .route("/ws/forecast", get(ws::forecast_socket))
        .with_state(state)
}

/// Serve the router on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, state: AppState, cancel: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on {}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
