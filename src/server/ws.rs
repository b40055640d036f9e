//! WebSocket streaming of query answers.
//!
//! The client sends `{"type": "query", "query": "..."}`; the server streams
//! `{"type": "token", "content": "..."}` messages in arrival order and ends
//! the exchange with `{"type": "done", "reply": "..."}` or
//! `{"type": "error", "message": "..."}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
    query: Option<String>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(raw) = message else {
            continue;
        };

        let incoming: WsIncoming = match serde_json::from_str(&raw) {
            Ok(incoming) => incoming,
            Err(err) => {
                send_json(&mut socket, json!({ "type": "error", "message": err.to_string() }))
                    .await;
                continue;
            }
        };

        if incoming.msg_type != "query" {
            send_json(
                &mut socket,
                json!({
                    "type": "error",
                    "message": format!("unknown message type '{}'", incoming.msg_type),
                }),
            )
            .await;
            continue;
        }

        let query = incoming.query.unwrap_or_default();
        run_query(&mut socket, &state, query).await;
    }
}

/// Runs one query, forwarding partial batches as they arrive.
async fn run_query(socket: &mut WebSocket, state: &Arc<AppState>, query: String) {
    let (tx, mut rx) = mpsc::channel::<String>(32);

    let pipeline = state.pipeline.clone();
    let answer = tokio::spawn(async move { pipeline.answer_query(&query, Some(tx)).await });

    while let Some(content) = rx.recv().await {
        send_json(socket, json!({ "type": "token", "content": content })).await;
    }

    // The channel closes when the pipeline is done with its sink; the final
    // reply (scrubbed, possibly the fallback text) comes from the join.
    let payload = match answer.await {
        Ok(Ok(reply)) => json!({ "type": "done", "reply": reply }),
        Ok(Err(err)) => json!({ "type": "error", "message": err.to_string() }),
        Err(err) => json!({ "type": "error", "message": err.to_string() }),
    };
    send_json(socket, payload).await;
}

async fn send_json(socket: &mut WebSocket, payload: serde_json::Value) {
    let _ = socket.send(Message::Text(payload.to_string())).await;
}
