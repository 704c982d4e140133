//! Debugger and CPU profiler sessions driven through the crawler.
//!
//! Each action finds the relevant session row, forwards the action to the
//! crawler and records the outcome in the session data. A failed crawler
//! call never leaves a session `RUNNING` when the action was a start or stop.

use crate::error::{ActionFailure, ApiResult};
use crate::state::AppState;
use axum::http::StatusCode;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use nxweb_core::model::debug::{DebugSession, DebugSessionStatus, DebugSessionType};
use nxweb_core::now_ms;
use nxweb_core::repo::debug_repo::SessionQuery;
use serde_json::{json, Value};

const CPU: &str = "CPU";

pub(super) async fn start_debugger(State(state): State<AppState>) -> ApiResult<Response> {
    let running = SessionQuery::new(DebugSessionType::Debugger)
        .with_statuses(&[DebugSessionStatus::Running]);
    if let Some(session) = latest(&state, running).await? {
        return Ok(Json(json!({
            "success": false,
            "message": "A debugger session is already running",
            "sessionId": session.id,
        }))
        .into_response());
    }

    let mut session = start(&state, DebugSessionType::Debugger, json!({})).await?;
    match action(&state, "debugger/start", &session).await {
        Ok(data) => {
            session.data = Some(data.clone());
            save(&state, &session).await?;
            info!(
                "event=debugger_start module=api status=ok session_id={}",
                session.id
            );
            Ok(Json(json!({
                "success": true,
                "message": "Debugger started successfully",
                "sessionId": session.id,
                "data": data,
            }))
            .into_response())
        }
        Err(err) => {
            session.stop(now_ms());
            session.data = Some(json!({ "error": err }));
            save(&state, &session).await?;
            Ok(ActionFailure::new("Failed to start debugger", err).into_response())
        }
    }
}

pub(super) async fn stop_debugger(State(state): State<AppState>) -> ApiResult<Response> {
    let active = SessionQuery::new(DebugSessionType::Debugger)
        .with_statuses(&[DebugSessionStatus::Running, DebugSessionStatus::Paused]);
    let Some(mut session) = latest(&state, active).await? else {
        return Ok(Json(json!({
            "success": false,
            "message": "No active debugger session found",
        }))
        .into_response());
    };

    let outcome = action(&state, "debugger/stop", &session).await;
    session.stop(now_ms());
    match outcome {
        Ok(result) => {
            session.merge_data(json!({ "stopResult": result }));
            save(&state, &session).await?;
            Ok(Json(json!({
                "success": true,
                "message": "Debugger stopped successfully",
                "sessionId": session.id,
            }))
            .into_response())
        }
        Err(err) => {
            session.merge_data(json!({ "error": err }));
            save(&state, &session).await?;
            Ok(ActionFailure::new("Failed to stop debugger cleanly", err).into_response())
        }
    }
}

pub(super) async fn debugger_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let query = SessionQuery::new(DebugSessionType::Debugger);
    let body = match latest(&state, query).await? {
        Some(session) => json!({
            "status": session.status,
            "sessionId": session.id,
            "startedAt": session.started_at,
            "endedAt": session.ended_at,
            "data": session.data,
        }),
        None => json!({
            "status": "STOPPED",
            "message": "No debugger session found",
        }),
    };
    Ok(Json(body))
}

pub(super) async fn step_into(State(state): State<AppState>) -> ApiResult<Response> {
    step(state, "step_into", "Step into executed successfully", "Failed to execute step into").await
}

pub(super) async fn step_over(State(state): State<AppState>) -> ApiResult<Response> {
    step(state, "step_over", "Step over executed successfully", "Failed to execute step over").await
}

pub(super) async fn continue_execution(State(state): State<AppState>) -> ApiResult<Response> {
    let Some(mut session) = paused_session(&state).await? else {
        return Ok(no_paused_session());
    };
    match action(&state, "debugger/continue", &session).await {
        Ok(_) => {
            session.status = DebugSessionStatus::Running;
            session.merge_data(json!({ "lastAction": "continue" }));
            save(&state, &session).await?;
            Ok(Json(json!({
                "success": true,
                "message": "Execution continued successfully",
            }))
            .into_response())
        }
        Err(err) => Ok(ActionFailure::new("Failed to continue execution", err).into_response()),
    }
}

async fn step(
    state: AppState,
    step: &'static str,
    message: &'static str,
    failure: &'static str,
) -> ApiResult<Response> {
    let Some(mut session) = paused_session(&state).await? else {
        return Ok(no_paused_session());
    };
    match action(&state, &format!("debugger/{step}"), &session).await {
        Ok(result) => {
            let frame = result.get("frame").cloned().unwrap_or(Value::Null);
            session.merge_data(json!({ "currentFrame": frame, "lastAction": step }));
            save(&state, &session).await?;
            Ok(Json(json!({ "success": true, "message": message, "frame": frame })).into_response())
        }
        Err(err) => Ok(ActionFailure::new(failure, err).into_response()),
    }
}

pub(super) async fn start_cpu_profiling(State(state): State<AppState>) -> ApiResult<Response> {
    if let Some(session) = latest(&state, running_cpu_profile()).await? {
        return Ok(Json(json!({
            "success": false,
            "message": "A CPU profiling session is already running",
            "sessionId": session.id,
        }))
        .into_response());
    }

    let data = json!({ "profilingType": CPU, "startTime": iso_now() });
    let mut session = start(&state, DebugSessionType::Profiler, data).await?;
    match action(&state, "profiler/cpu/start", &session).await {
        Ok(response) => {
            session.merge_data(json!({ "pyspiderResponse": response }));
            save(&state, &session).await?;
            Ok(Json(json!({
                "success": true,
                "message": "CPU profiling started successfully",
                "sessionId": session.id,
            }))
            .into_response())
        }
        Err(err) => {
            session.stop(now_ms());
            session.merge_data(json!({ "error": err }));
            save(&state, &session).await?;
            Ok(ActionFailure::new("Failed to start CPU profiling", err).into_response())
        }
    }
}

pub(super) async fn stop_cpu_profiling(State(state): State<AppState>) -> ApiResult<Response> {
    let Some(mut session) = latest(&state, running_cpu_profile()).await? else {
        return Ok(Json(json!({
            "success": false,
            "message": "No active CPU profiling session found",
        }))
        .into_response());
    };

    let outcome = action(&state, "profiler/cpu/stop", &session).await;
    session.stop(now_ms());
    match outcome {
        Ok(results) => {
            session.merge_data(json!({ "endTime": iso_now(), "results": results }));
            save(&state, &session).await?;
            Ok(Json(json!({
                "success": true,
                "message": "CPU profiling stopped successfully",
                "sessionId": session.id,
                "results": results,
            }))
            .into_response())
        }
        Err(err) => {
            session.merge_data(json!({ "endTime": iso_now(), "error": err }));
            save(&state, &session).await?;
            Ok(ActionFailure::new("Failed to stop CPU profiling cleanly", err).into_response())
        }
    }
}

fn running_cpu_profile() -> SessionQuery {
    SessionQuery::new(DebugSessionType::Profiler)
        .with_statuses(&[DebugSessionStatus::Running])
        .with_profiling_type(CPU)
}

async fn paused_session(state: &AppState) -> ApiResult<Option<DebugSession>> {
    let query = SessionQuery::new(DebugSessionType::Debugger)
        .with_statuses(&[DebugSessionStatus::Paused]);
    latest(state, query).await
}

fn no_paused_session() -> Response {
    let body = Json(json!({
        "success": false,
        "message": "No paused debugger session found",
    }));
    (StatusCode::BAD_REQUEST, body).into_response()
}

/// Forwards `path` to the crawler; the error is returned as display text.
async fn action(state: &AppState, path: &str, session: &DebugSession) -> Result<Value, String> {
    state
        .pyspider
        .debug_action(path, &json!({ "sessionId": session.id }))
        .await
        .map_err(|err| {
            warn!(
                "event=debug_action module=api status=error action={path} session_id={} error={err}",
                session.id
            );
            err.to_string()
        })
}

async fn latest(state: &AppState, query: SessionQuery) -> ApiResult<Option<DebugSession>> {
    state
        .store
        .debug(move |service| service.latest_session(&query))
        .await
}

async fn start(state: &AppState, kind: DebugSessionType, data: Value) -> ApiResult<DebugSession> {
    state
        .store
        .debug(move |service| service.start_session(kind, Some(data)))
        .await
}

async fn save(state: &AppState, session: &DebugSession) -> ApiResult<()> {
    let session = session.clone();
    state
        .store
        .debug(move |service| service.save_session(&session))
        .await
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
