//! Bridge WebSocket: pushes tool events and answers tool requests.
//!
//! Requests are `{"id"?, "event": "<tool>:<action>", "data"?}` and are
//! answered with `{"id", "success", "result" | "error"}`. Slow commands run
//! on their own task so events keep flowing.

use super::{Bridge, BridgeError, ToolKind};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// Socket actions each tool answers, with the command they send.
const SOCKET_ACTIONS: &[(ToolKind, &str, &str)] = &[
    (ToolKind::Debugger, "step_into", "step_into"),
    (ToolKind::Debugger, "step_over", "step_over"),
    (ToolKind::Debugger, "step_out", "step_out"),
    (ToolKind::Debugger, "continue", "continue"),
    (ToolKind::Debugger, "set_breakpoint", "set_breakpoint"),
    (ToolKind::Debugger, "clear_breakpoint", "clear_breakpoint"),
    (ToolKind::Debugger, "evaluate", "evaluate_expression"),
    (ToolKind::Debugger, "execute", "execute_statement"),
    (ToolKind::Debugger, "get_variables", "get_variables"),
    (ToolKind::Debugger, "get_call_stack", "get_call_stack"),
    (ToolKind::Debugger, "get_source", "get_source"),
    (ToolKind::Inspector, "get_requests", "get_all_requests"),
    (ToolKind::Inspector, "get_responses", "get_all_responses"),
    (ToolKind::Inspector, "get_request", "get_request"),
    (ToolKind::Inspector, "get_response", "get_response"),
    (ToolKind::Inspector, "clear_all", "clear_all"),
    (ToolKind::Inspector, "modify_request", "modify_request"),
    (ToolKind::Inspector, "resend_request", "resend_request"),
    (ToolKind::Inspector, "set_filter", "set_filter"),
    (ToolKind::Inspector, "clear_filter", "clear_filter"),
    (ToolKind::Inspector, "get_filtered_requests", "get_filtered_requests"),
    (ToolKind::Inspector, "get_filtered_responses", "get_filtered_responses"),
    (ToolKind::Inspector, "get_websocket_messages", "get_all_websocket_messages"),
    (ToolKind::Inspector, "clear_websocket_messages", "clear_websocket_messages"),
    (ToolKind::Inspector, "compare_requests", "compare_requests"),
    (ToolKind::Profiler, "start_cpu_profiling", "start_profiling"),
    (ToolKind::Profiler, "stop_cpu_profiling", "stop_profiling"),
    (ToolKind::Profiler, "start_memory_tracking", "start_memory_tracking"),
    (ToolKind::Profiler, "stop_memory_tracking", "stop_memory_tracking"),
    (ToolKind::Profiler, "take_memory_snapshot", "take_memory_snapshot"),
    (ToolKind::Profiler, "compare_memory_snapshots", "compare_memory_snapshots"),
    (ToolKind::Profiler, "start_timing", "start_timing"),
    (ToolKind::Profiler, "stop_timing", "stop_timing"),
    (ToolKind::Profiler, "get_timing_stats", "get_timing_stats"),
    (ToolKind::Profiler, "get_function_stats", "get_function_stats"),
    (ToolKind::Profiler, "get_memory_usage", "get_memory_usage"),
    (ToolKind::Profiler, "generate_report", "generate_report"),
    (ToolKind::Profiler, "start_resource_monitoring", "start_resource_monitoring"),
    (ToolKind::Profiler, "stop_resource_monitoring", "stop_resource_monitoring"),
    (ToolKind::Profiler, "get_resource_usage", "get_resource_usage"),
    (ToolKind::Profiler, "get_network_stats", "get_network_stats"),
    (ToolKind::Profiler, "profile_code_block", "profile_code_block"),
];

/// Socket payload keys renamed to the tool's parameter names.
const PARAM_ALIASES: &[(&str, &str)] = &[
    ("requestId", "request_id"),
    ("filterName", "filter_name"),
    ("messageId", "message_id"),
];

#[derive(Debug, Deserialize)]
struct SocketRequest {
    #[serde(default)]
    id: Value,
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Start,
    Stop,
    Command { command: String, params: Value },
}

pub(super) async fn websocket(State(bridge): State<Bridge>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve(socket, bridge))
}

async fn serve(socket: WebSocket, bridge: Bridge) {
    info!("event=bridge_ws_connect module=bridge status=ok");
    let (mut sender, mut receiver) = socket.split();
    let mut events = bridge.subscribe();
    let (replies, mut reply_rx) = mpsc::unbounded_channel::<Value>();

    loop {
        let outgoing = tokio::select! {
            event = events.recv() => match event {
                Ok(event) => json!(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event=bridge_ws_lagged module=bridge status=error skipped={skipped}");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            Some(reply) = reply_rx.recv() => reply,
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let (bridge, replies) = (bridge.clone(), replies.clone());
                    let text = text.as_str().to_string();
                    tokio::spawn(async move {
                        let _ = replies.send(answer(&bridge, &text).await);
                    });
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        if sender
            .send(Message::Text(outgoing.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }
    info!("event=bridge_ws_disconnect module=bridge status=ok");
}

async fn answer(bridge: &Bridge, text: &str) -> Value {
    let request = match serde_json::from_str::<SocketRequest>(text) {
        Ok(request) => request,
        Err(err) => {
            debug!("event=bridge_ws_request module=bridge status=invalid error={err}");
            return json!({ "id": Value::Null, "success": false, "error": "Invalid request" });
        }
    };
    let Some((kind, call)) = resolve(&request.event, request.data) else {
        return json!({ "id": request.id, "success": false, "error": "Unknown event" });
    };

    match run(bridge, kind, call).await {
        Ok(result) => json!({ "id": request.id, "success": true, "result": result }),
        Err(err) => {
            warn!(
                "event=bridge_ws_request module=bridge status=error request_event={} error={err}",
                request.event
            );
            json!({ "id": request.id, "success": false, "error": err.to_string() })
        }
    }
}

async fn run(bridge: &Bridge, kind: ToolKind, call: Call) -> Result<Value, BridgeError> {
    let tool = bridge.tool(kind);
    match call {
        Call::Start => Ok(serde_json::to_value(tool.start().await?)?),
        Call::Stop => Ok(serde_json::to_value(tool.stop().await?)?),
        Call::Command { command, params } => tool.send_command(&command, params).await,
    }
}

/// Maps `<tool>:<action>` plus payload onto a tool call.
///
/// Only `start`, `stop` and the actions in [`SOCKET_ACTIONS`] resolve.
fn resolve(event: &str, data: Value) -> Option<(ToolKind, Call)> {
    let (tool, action) = event.split_once(':')?;
    let kind = ToolKind::parse(tool)?;
    let call = match action {
        "start" => Call::Start,
        "stop" => Call::Stop,
        _ => {
            let (_, _, command) = SOCKET_ACTIONS
                .iter()
                .find(|(allowed_kind, allowed, _)| *allowed_kind == kind && *allowed == action)?;
            Call::Command {
                command: (*command).to_string(),
                params: params(data),
            }
        }
    };
    Some((kind, call))
}

fn params(data: Value) -> Value {
    let Value::Object(data) = data else {
        return json!({});
    };
    let renamed: Map<String, Value> = data
        .into_iter()
        .map(|(key, value)| {
            let key = PARAM_ALIASES
                .iter()
                .find(|(from, _)| *from == key)
                .map_or(key.clone(), |(_, to)| (*to).to_string());
            (key, value)
        })
        .collect();
    Value::Object(renamed)
}
