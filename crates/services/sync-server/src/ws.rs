//! WebSocket endpoint
//!
//! Each socket gets a reader loop that feeds text frames into the engine
//! queue and a writer task that drains the connection's bounded outbound
//! queue into the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::AppState;
use crate::registry::ConnectionId;

/// Upgrade handler
///
/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::next();
    let capacity = state.config.sync.outbound_queue_capacity.max(1);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

    if state.engine.connect(connection_id, outbound_tx).await.is_err() {
        tracing::warn!(connection_id = %connection_id, "Engine stopped, refusing connection");
        return;
    }
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let (sink, mut stream) = socket.split();

    // Ends when the engine drops the sender or the socket errors.
    let writer = tokio::spawn(async move {
        let mut sink = sink;
        let result = ReceiverStream::new(outbound_rx)
            .map(|text| Ok::<_, axum::Error>(Message::Text(text)))
            .forward(&mut sink)
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "WebSocket write failed");
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if state.engine.inbound(connection_id, text).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket read failed"
                );
                break;
            }
        }
    }

    let _ = state.engine.disconnect(connection_id).await;
    writer.abort();
    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}
