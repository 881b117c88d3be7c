use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use dtsfix_events::HubEvent;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::commands;

/// Interval between server pings on an idle connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the hub and queues the initial state.
///   2. Spawns a writer task that forwards hub frames and sends pings.
///   3. Dispatches inbound commands on the current task.
///   4. Unregisters on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = state.hub.register(conn_id.clone()).await;

    match state.service.initial_state().await {
        Ok(initial) => {
            state
                .hub
                .send_to(&conn_id, &HubEvent::InitialState(initial))
                .await;
        }
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Failed to build initial state");
        }
    }

    let (mut sink, mut stream) = socket.split();

    let writer_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        // Hub dropped us (shutdown or replaced registration).
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        tracing::debug!(conn_id = %writer_conn_id, "WebSocket sink closed");
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Default::default())).await.is_err() {
                        tracing::debug!(conn_id = %writer_conn_id, "WebSocket ping failed");
                        break;
                    }
                }
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                commands::handle_text(&state, &conn_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.hub.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
