//! WebSocket fan-out of task events.
//!
//! Clients connect to `/ws`, send `{"event": "join_task", "task_uuid"}`
//! and receive `{event, data}` messages mirroring the event bus. `ping`
//! is answered with `pong`; unknown events are ignored on both sides.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::WsClientMessage;
use crate::AppState;

const MAX_MESSAGE_SIZE: usize = 16 * 1024;
const OUTBOUND_BUFFER: usize = 256;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    // Single writer to the socket; everything else sends through out_tx.
    let sender_handle = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Forwarder of bus events for the currently joined task.
    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(ref text) if text.len() > MAX_MESSAGE_SIZE => {
                tracing::warn!("Rejected oversized WebSocket message ({} bytes)", text.len());
            }
            Message::Text(text) => {
                let Ok(client_msg) = serde_json::from_str::<WsClientMessage>(&text) else {
                    continue;
                };
                match client_msg {
                    WsClientMessage::JoinTask { task_uuid } => {
                        let Some(task) = state.registry.get(&task_uuid) else {
                            let err = serde_json::json!({
                                "event": "error",
                                "data": { "message": format!("unknown task {task_uuid}") }
                            });
                            let _ = out_tx.send(err.to_string()).await;
                            continue;
                        };
                        tracing::debug!(task_id = %task_uuid, "WebSocket joined task");

                        // One joined task per connection; a re-join
                        // replaces the previous stream.
                        if let Some(old) = forwarder.take() {
                            old.abort();
                        }

                        // Replay current state so late joiners render the
                        // graph immediately.
                        let replay = serde_json::json!({
                            "event": "task_update",
                            "data": { "task": task }
                        });
                        let _ = out_tx.send(replay.to_string()).await;

                        let subscription = state.registry.bus().subscribe(&task_uuid);
                        let tx = out_tx.clone();
                        forwarder = Some(tokio::spawn(async move {
                            loop {
                                let event = subscription.recv().await;
                                let payload = match serde_json::to_string(&event) {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::warn!("Failed to serialize bus event: {e}");
                                        continue;
                                    }
                                };
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                        }));
                    }
                    WsClientMessage::Ping => {
                        let pong = serde_json::json!({ "event": "pong" });
                        if out_tx.send(pong.to_string()).await.is_err() {
                            break;
                        }
                    }
                    WsClientMessage::Unknown => {}
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    drop(out_tx);
    let _ = sender_handle.await;
    tracing::debug!("WebSocket connection closed");
}
