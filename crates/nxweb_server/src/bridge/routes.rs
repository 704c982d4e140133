//! HTTP surface of the bridge.
//!
//! Every route is one [`CommandRoute`] row: where its parameters come from,
//! which tool command it sends and how the result is wrapped. Successful
//! replies are `{"success": true, <key>: result}`; failures are
//! `{"success": false, "error": message}`.

use super::socket;
use super::{Bridge, BridgeError, ToolKind};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::{Json, Router};
use log::warn;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tower_http::cors::CorsLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verb {
    Get,
    Post,
    Delete,
}

impl Verb {
    fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Path(&'static str),
    Body(&'static str),
    Query(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Raw,
    /// Integers arriving as text are converted.
    Int,
    IntOr(i64),
}

#[derive(Debug, Clone, Copy)]
struct Field {
    param: &'static str,
    source: Source,
    shape: Shape,
    required: Option<&'static str>,
}

impl Field {
    const fn new(param: &'static str, source: Source) -> Self {
        Self {
            param,
            source,
            shape: Shape::Raw,
            required: None,
        }
    }

    const fn required(self, message: &'static str) -> Self {
        Self {
            required: Some(message),
            ..self
        }
    }

    const fn int(self) -> Self {
        Self {
            shape: Shape::Int,
            ..self
        }
    }

    const fn int_or(self, fallback: i64) -> Self {
        Self {
            shape: Shape::IntOr(fallback),
            ..self
        }
    }
}

const fn path(param: &'static str, segment: &'static str) -> Field {
    Field::new(param, Source::Path(segment))
}

const fn body(param: &'static str) -> Field {
    Field::new(param, Source::Body(param))
}

const fn query(param: &'static str) -> Field {
    Field::new(param, Source::Query(param))
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Stop,
    DebugScript,
    Command(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Reply {
    /// `{success, <key>: result}`.
    Key(&'static str),
    /// `{success}` only.
    Empty,
    /// Echoes a request body field, e.g. the HAR file name.
    Echo(&'static str),
    /// `{success, filename}` from a `{success, filename, error}` result.
    SavedFile,
}

#[derive(Debug, Clone, Copy)]
struct CommandRoute {
    verb: Verb,
    path: &'static str,
    tool: ToolKind,
    action: Action,
    fields: &'static [Field],
    reply: Reply,
    /// Status and message used when the tool answers with a falsy result.
    falsy: Option<(StatusCode, &'static str)>,
}

const fn route(verb: Verb, path: &'static str, tool: ToolKind, command: &'static str) -> CommandRoute {
    CommandRoute {
        verb,
        path,
        tool,
        action: Action::Command(command),
        fields: &[],
        reply: Reply::Key("result"),
        falsy: None,
    }
}

impl CommandRoute {
    const fn action(self, action: Action) -> Self {
        Self { action, ..self }
    }

    const fn fields(self, fields: &'static [Field]) -> Self {
        Self { fields, ..self }
    }

    const fn reply(self, reply: Reply) -> Self {
        Self { reply, ..self }
    }

    const fn or_fail(self, status: StatusCode, message: &'static str) -> Self {
        Self {
            falsy: Some((status, message)),
            ..self
        }
    }
}

use ToolKind::{Debugger as DBG, Inspector as INS, Profiler as PRF};
use Verb::{Delete as DELETE, Get as GET, Post as POST};

const BREAKPOINT_REQUIRED: &str = "Filename and line number are required";
const BREAKPOINT_AT: &[Field] = &[
    path("filename", "filename").required(BREAKPOINT_REQUIRED),
    path("lineno", "lineno").int().required(BREAKPOINT_REQUIRED),
];
const REQUEST_ID: &[Field] = &[path("request_id", "requestId")];
const REQUEST_NOT_FOUND: (StatusCode, &str) = (StatusCode::NOT_FOUND, "Request not found");
const INVALID_FILTER: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "Invalid filter name");

const fn fail_with(route: CommandRoute, falsy: (StatusCode, &'static str)) -> CommandRoute {
    route.or_fail(falsy.0, falsy.1)
}

static ROUTES: &[CommandRoute] = &[
    // Debugger
    route(POST, "/api/debugger/start", DBG, "start").action(Action::Start),
    route(POST, "/api/debugger/stop", DBG, "stop").action(Action::Stop),
    route(POST, "/api/debugger/step_into", DBG, "step_into"),
    route(POST, "/api/debugger/step_over", DBG, "step_over"),
    route(POST, "/api/debugger/step_out", DBG, "step_out"),
    route(POST, "/api/debugger/continue", DBG, "continue"),
    route(GET, "/api/debugger/breakpoints", DBG, "get_breakpoints").reply(Reply::Key("breakpoints")),
    route(POST, "/api/debugger/breakpoints", DBG, "set_breakpoint")
        .fields(&[
            body("filename").required(BREAKPOINT_REQUIRED),
            body("lineno").required(BREAKPOINT_REQUIRED),
            body("condition"),
        ])
        .reply(Reply::Key("breakpoint")),
    route(DELETE, "/api/debugger/breakpoints/{filename}/{lineno}", DBG, "clear_breakpoint")
        .fields(BREAKPOINT_AT),
    route(POST, "/api/debugger/breakpoints/{filename}/{lineno}/enable", DBG, "enable_breakpoint")
        .fields(BREAKPOINT_AT),
    route(POST, "/api/debugger/breakpoints/{filename}/{lineno}/disable", DBG, "disable_breakpoint")
        .fields(BREAKPOINT_AT),
    route(POST, "/api/debugger/breakpoints/clear", DBG, "clear_all_breakpoints"),
    route(POST, "/api/debugger/evaluate", DBG, "evaluate_expression")
        .fields(&[body("expression").required("Expression is required")]),
    route(POST, "/api/debugger/execute", DBG, "execute_statement")
        .fields(&[body("statement").required("Statement is required")]),
    route(GET, "/api/debugger/variables", DBG, "get_variables").reply(Reply::Key("variables")),
    route(GET, "/api/debugger/variable/{name}", DBG, "get_variable")
        .fields(&[path("name", "name").required("Variable name is required")])
        .reply(Reply::Key("variable")),
    route(POST, "/api/debugger/variable/{name}", DBG, "set_variable").fields(&[
        path("name", "name").required("Variable name is required"),
        body("value").required("Variable value is required"),
    ]),
    route(POST, "/api/debugger/watch", DBG, "watch_expression")
        .fields(&[body("expression").required("Expression is required")]),
    route(GET, "/api/debugger/stack", DBG, "get_call_stack").reply(Reply::Key("stack")),
    route(POST, "/api/debugger/frame/{frameIndex}", DBG, "jump_to_frame")
        .fields(&[path("frame_index", "frameIndex").int().required("Frame index is required")]),
    route(GET, "/api/debugger/source/{filename}", DBG, "get_source")
        .fields(&[path("filename", "filename").required("Filename is required")])
        .reply(Reply::Key("source")),
    route(POST, "/api/debugger/debug", DBG, "debug_script")
        .action(Action::DebugScript)
        .fields(&[body("script").required("Script is required"), body("globals")]),
    route(GET, "/api/debugger/output", DBG, "get_output").reply(Reply::Key("output")),
    route(POST, "/api/debugger/output/clear", DBG, "clear_output"),
    // Inspector
    route(GET, "/api/inspector/requests", INS, "get_all_requests").reply(Reply::Key("requests")),
    route(GET, "/api/inspector/responses", INS, "get_all_responses").reply(Reply::Key("responses")),
    fail_with(
        route(GET, "/api/inspector/request/{requestId}", INS, "get_request")
            .fields(REQUEST_ID)
            .reply(Reply::Key("request")),
        REQUEST_NOT_FOUND,
    ),
    route(GET, "/api/inspector/response/{requestId}", INS, "get_response")
        .fields(REQUEST_ID)
        .reply(Reply::Key("response"))
        .or_fail(StatusCode::NOT_FOUND, "Response not found"),
    route(GET, "/api/inspector/request_response/{requestId}", INS, "get_request_response")
        .fields(REQUEST_ID)
        .reply(Reply::Key("data"))
        .or_fail(StatusCode::NOT_FOUND, "Request/response not found"),
    route(POST, "/api/inspector/clear", INS, "clear_all").reply(Reply::Empty),
    fail_with(
        route(DELETE, "/api/inspector/request/{requestId}", INS, "delete_request")
            .fields(REQUEST_ID)
            .reply(Reply::Empty),
        REQUEST_NOT_FOUND,
    ),
    fail_with(
        route(POST, "/api/inspector/request/{requestId}/modify", INS, "modify_request")
            .fields(&[
                path("request_id", "requestId"),
                body("modifications").required("Modifications are required"),
            ])
            .reply(Reply::Key("request")),
        REQUEST_NOT_FOUND,
    ),
    fail_with(
        route(POST, "/api/inspector/request/{requestId}/resend", INS, "resend_request")
            .fields(&[path("request_id", "requestId"), body("modifications")])
            .reply(Reply::Key("request")),
        REQUEST_NOT_FOUND,
    ),
    fail_with(
        route(POST, "/api/inspector/filter", INS, "set_filter")
            .fields(&[body("name").required("Filter name is required"), body("value")])
            .reply(Reply::Empty),
        INVALID_FILTER,
    ),
    fail_with(
        route(POST, "/api/inspector/filter/{filterName}/clear", INS, "clear_filter")
            .fields(&[path("filter_name", "filterName").required("Filter name is required")])
            .reply(Reply::Empty),
        INVALID_FILTER,
    ),
    route(POST, "/api/inspector/filter/clear", INS, "clear_filter").reply(Reply::Empty),
    route(GET, "/api/inspector/filtered_requests", INS, "get_filtered_requests")
        .reply(Reply::Key("requests")),
    route(GET, "/api/inspector/filtered_responses", INS, "get_filtered_responses")
        .reply(Reply::Key("responses")),
    route(GET, "/api/inspector/websocket_messages", INS, "get_all_websocket_messages")
        .reply(Reply::Key("messages")),
    route(GET, "/api/inspector/websocket_message/{messageId}", INS, "get_websocket_message")
        .fields(&[path("message_id", "messageId")])
        .reply(Reply::Key("message"))
        .or_fail(StatusCode::NOT_FOUND, "Message not found"),
    route(POST, "/api/inspector/websocket_messages/clear", INS, "clear_websocket_messages")
        .reply(Reply::Empty),
    route(POST, "/api/inspector/har", INS, "save_to_har")
        .fields(&[body("filename").required("Filename is required")])
        .reply(Reply::Echo("filename"))
        .or_fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save to HAR"),
    route(POST, "/api/inspector/compare", INS, "compare_requests")
        .fields(&[
            body("request_id1").required("Two request IDs are required"),
            body("request_id2").required("Two request IDs are required"),
        ])
        .reply(Reply::Key("comparison")),
    // Profiler
    route(POST, "/api/profiler/cpu/start", PRF, "start_profiling"),
    route(POST, "/api/profiler/cpu/stop", PRF, "stop_profiling"),
    route(POST, "/api/profiler/memory/start", PRF, "start_memory_tracking"),
    route(POST, "/api/profiler/memory/stop", PRF, "stop_memory_tracking"),
    route(POST, "/api/profiler/memory/snapshot", PRF, "take_memory_snapshot")
        .fields(&[body("label")]),
    route(POST, "/api/profiler/memory/compare", PRF, "compare_memory_snapshots").fields(&[
        body("snapshot1_index").int().required("Two snapshot indices are required"),
        body("snapshot2_index").int().required("Two snapshot indices are required"),
    ]),
    route(POST, "/api/profiler/timing/start", PRF, "start_timing")
        .fields(&[body("name").required("Name is required")]),
    route(POST, "/api/profiler/timing/stop", PRF, "stop_timing")
        .fields(&[body("name").required("Name is required")]),
    route(POST, "/api/profiler/timing/reset", PRF, "reset_timing").fields(&[body("name")]),
    route(GET, "/api/profiler/timing", PRF, "get_timing_stats").fields(&[query("name")]),
    route(GET, "/api/profiler/function", PRF, "get_function_stats").fields(&[query("name")]),
    route(POST, "/api/profiler/function/reset", PRF, "reset_function_stats")
        .fields(&[body("name")]),
    route(POST, "/api/profiler/gc", PRF, "collect_garbage"),
    route(GET, "/api/profiler/memory_usage", PRF, "get_memory_usage"),
    route(GET, "/api/profiler/report", PRF, "generate_report"),
    route(POST, "/api/profiler/report/save", PRF, "save_report")
        .fields(&[body("filename").required("Filename is required")])
        .reply(Reply::SavedFile),
    route(POST, "/api/profiler/resources/start", PRF, "start_resource_monitoring"),
    route(POST, "/api/profiler/resources/stop", PRF, "stop_resource_monitoring"),
    route(GET, "/api/profiler/resources", PRF, "get_resource_usage"),
    route(GET, "/api/profiler/network", PRF, "get_network_stats"),
    route(POST, "/api/profiler/network/reset", PRF, "reset_network_stats"),
    route(POST, "/api/profiler/code", PRF, "profile_code_block").fields(&[
        body("code").required("Code is required"),
        body("globals"),
        body("locals"),
    ]),
    route(GET, "/api/profiler/fps", PRF, "get_frame_rate")
        .fields(&[query("window_size").int_or(10)]),
];

/// Bridge router: command routes, `/ws`, permissive CORS.
pub fn router(bridge: Bridge) -> Router {
    let mut by_path: BTreeMap<&'static str, MethodRouter<Bridge>> = BTreeMap::new();
    for route in ROUTES {
        let handler = if route.path.contains('{') {
            on(
                route.verb.filter(),
                move |State(bridge): State<Bridge>,
                      Path(params): Path<HashMap<String, String>>,
                      Query(query): Query<HashMap<String, String>>,
                      body: Bytes| async move {
                    handle(route, &bridge, &params, &query, &body).await
                },
            )
        } else {
            on(
                route.verb.filter(),
                move |State(bridge): State<Bridge>,
                      Query(query): Query<HashMap<String, String>>,
                      body: Bytes| async move {
                    handle(route, &bridge, &HashMap::new(), &query, &body).await
                },
            )
        };
        let merged = match by_path.remove(route.path) {
            Some(existing) => existing.merge(handler),
            None => handler,
        };
        by_path.insert(route.path, merged);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| router.route(path, methods))
        .route("/ws", axum::routing::get(socket::websocket))
        .layer(CorsLayer::permissive())
        .with_state(bridge)
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let body = Json(json!({ "success": false, "error": error.into() }));
    (status, body).into_response()
}

async fn handle(
    route: &'static CommandRoute,
    bridge: &Bridge,
    path: &HashMap<String, String>,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    let body = match parse_body(body) {
        Ok(body) => body,
        Err(err) => return failure(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {err}")),
    };
    let params = match collect_params(route.fields, path, query, &body) {
        Ok(params) => params,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };

    match run(route, bridge, params).await {
        Ok(result) => reply(route, result, &body),
        Err(err) => {
            warn!(
                "event=bridge_route module=bridge status=error path={} error={err}",
                route.path
            );
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn run(route: &CommandRoute, bridge: &Bridge, params: Value) -> Result<Value, BridgeError> {
    let tool = bridge.tool(route.tool);
    match route.action {
        Action::Start => Ok(serde_json::to_value(tool.start().await?)?),
        Action::Stop => Ok(serde_json::to_value(tool.stop().await?)?),
        Action::DebugScript => {
            let script = params
                .get("script")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let globals = params.get("globals").cloned().unwrap_or_else(|| json!({}));
            tool.debug_script(&script, globals).await
        }
        Action::Command(command) => tool.send_command(command, params).await,
    }
}

fn reply(route: &CommandRoute, result: Value, body: &Value) -> Response {
    if let Some((status, message)) = route.falsy {
        if is_falsy(&result) {
            return failure(status, message);
        }
    }

    let mut reply = Map::new();
    reply.insert("success".to_string(), Value::Bool(true));
    match route.reply {
        Reply::Key(key) => {
            reply.insert(key.to_string(), result);
        }
        Reply::Empty => {}
        Reply::Echo(field) => {
            reply.insert(field.to_string(), body.get(field).cloned().unwrap_or(Value::Null));
        }
        Reply::SavedFile => {
            if result.get("success").and_then(Value::as_bool) != Some(true) {
                let error = result
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Failed to save report");
                return failure(StatusCode::INTERNAL_SERVER_ERROR, error);
            }
            let filename = result.get("filename").cloned().unwrap_or(Value::Null);
            reply.insert("filename".to_string(), filename);
        }
    }
    Json(Value::Object(reply)).into_response()
}

/// Empty bodies read as `null`.
fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}

/// Builds the command params; the first missing required field wins.
fn collect_params(
    fields: &[Field],
    path: &HashMap<String, String>,
    query: &HashMap<String, String>,
    body: &Value,
) -> Result<Value, &'static str> {
    let mut params = Map::new();
    for field in fields {
        let raw = match field.source {
            Source::Path(name) => path.get(name).map(|text| Value::String(text.clone())),
            Source::Query(name) => query.get(name).map(|text| Value::String(text.clone())),
            Source::Body(name) => body.get(name).cloned(),
        };
        let value = shape(field.shape, raw);
        match value {
            Some(value) if !is_missing(&value) => {
                params.insert(field.param.to_string(), value);
            }
            _ => {
                if let Some(message) = field.required {
                    return Err(message);
                }
            }
        }
    }
    Ok(Value::Object(params))
}

fn shape(shape: Shape, value: Option<Value>) -> Option<Value> {
    match shape {
        Shape::Raw => value,
        Shape::Int => value.map(parse_int_text),
        Shape::IntOr(fallback) => Some(
            value
                .map(parse_int_text)
                .filter(Value::is_i64)
                .unwrap_or_else(|| json!(fallback)),
        ),
    }
}

fn parse_int_text(value: Value) -> Value {
    match &value {
        Value::String(text) => text.trim().parse::<i64>().map_or(value, |number| json!(number)),
        _ => value,
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
