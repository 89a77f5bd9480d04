//! Bidirectional client channel over WebSocket: outbound events stream
//! from the broadcast bus; inbound frames dispatch to the orchestrator.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::channel::ClientMessage;
use crate::server::state::ServeState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServeState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.orchestrator.channel().subscribe();

    // Outbound: forward everything the sessions broadcast.
    let forward = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(payload) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // Lagged listeners skip ahead; a closed bus ends the task.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "client channel listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Inbound: every frame is a JSON client message. Long-running work
    // (task traversal) spawns so the read loop keeps servicing stop and
    // confirmation frames.
    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(raw) = message else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(&raw) {
            Ok(parsed) => {
                let orchestrator = Arc::clone(&state.orchestrator);
                tokio::spawn(async move {
                    orchestrator.handle_message(parsed).await;
                });
            }
            Err(err) => {
                warn!(%err, "unparseable client message");
                state
                    .orchestrator
                    .channel()
                    .error(format!("unparseable message: {err}"));
            }
        }
    }

    forward.abort();
}
