use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::Json;
use log::{debug, info};
use nxweb_core::now_ms;
use serde_json::{json, Value};

pub(super) async fn socket_status() -> Json<Value> {
    Json(json!({ "success": true, "message": "Socket server is running" }))
}

pub(super) async fn websocket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(mut socket: WebSocket) {
    info!("event=ws_connect module=realtime status=ok");
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        if !is_ping(text.as_str()) {
            debug!("event=ws_message module=realtime status=ignored");
            continue;
        }
        let pong = json!({ "event": "pong", "data": { "timestamp": now_ms() } });
        if socket.send(Message::Text(pong.to_string().into())).await.is_err() {
            break;
        }
    }
    info!("event=ws_disconnect module=realtime status=ok");
}

/// Accepts both the bare `ping` frame and `{"event": "ping"}`.
fn is_ping(text: &str) -> bool {
    if text.trim() == "ping" {
        return true;
    }
    serde_json::from_str::<Value>(text)
        .ok()
        .is_some_and(|value| value.get("event").and_then(Value::as_str) == Some("ping"))
}
