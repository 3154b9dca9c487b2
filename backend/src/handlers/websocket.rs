//! WebSocket endpoint for the server -> client event stream.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.notifier.subscribe();
    let total = state.notifier.client_connected();
    tracing::info!("WebSocket client connected ({} total)", total);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(message) => {
                        if socket.send(Message::Text(message)).await.is_err() {
                            break;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, skipped {} event(s)", skipped);
                    },
                    Err(RecvError::Closed) => break,
                }
            },
            incoming = socket.recv() => {
                // Clients may send pings to keep the connection alive; any
                // close or transport error ends the session.
                match incoming {
                    Some(Ok(_)) => {},
                    _ => break,
                }
            },
        }
    }

    let remaining = state.notifier.client_disconnected();
    tracing::info!("WebSocket client disconnected ({} remaining)", remaining);
}
