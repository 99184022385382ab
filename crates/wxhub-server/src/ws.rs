//! WebSocket subscribers for `/ws/forecast`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio_util::sync::CancellationToken;

use crate::hub::{BroadcastHub, DeliveryError, SubscriberSink};
use crate::state::AppState;

/// Write half of an upgraded socket.
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl SubscriberSink for WsSink {
    async fn deliver(&mut self, payload: &str) -> Result<(), DeliveryError> {
        self.sender
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sender.close().await {
            tracing::debug!("Error closing subscriber socket: {}", e);
        }
    }
}

pub async fn forecast_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.hub.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| serve_subscriber(socket, hub, shutdown))
}

/// Register the socket with the hub, then drain its read half until the peer
/// goes away or the hub drops it. Inbound payloads are ignored.
async fn serve_subscriber(socket: WebSocket, hub: Arc<BroadcastHub>, shutdown: CancellationToken) {
    let (sender, mut receiver) = socket.split();
    let (id, removed) = hub.connect_watched(Box::new(WsSink { sender })).await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = removed.cancelled() => {
                tracing::debug!("Subscriber {} removed by hub, ending read loop", id);
                return;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("Subscriber {} read error: {}", id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    hub.disconnect(id).await;
}
