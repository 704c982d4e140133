//! Dashboard HTTP surface.
//!
//! # Responsibility
//! - Map REST routes onto core services and the crawler client.
//! - Keep handlers thin: parse, call, serialize.
//!
//! # Invariants
//! - Project, task, schedule and log creates answer 201; deletes answer
//!   `{"success": true}`.
//! - Error bodies are `{"error": message}`, including JSON body rejections
//!   (request bodies are read through `ApiJson`).

mod debug_projects;
mod debug_sessions;
mod inspector;
mod projects;
mod pyspider;
mod realtime;
mod schedules;
mod tasks;

use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/{id}/stats", get(projects::project_stats))
        .route("/api/projects/{id}/tasks", get(projects::project_tasks))
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/status", put(tasks::change_status))
        .route(
            "/api/tasks/{id}/logs",
            get(tasks::list_logs).post(tasks::create_log),
        )
        .route(
            "/api/progress/{id}",
            get(tasks::get_progress).put(tasks::set_progress),
        )
        .route(
            "/api/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/schedules/{id}",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route("/api/schedules/{id}/activate", put(schedules::activate))
        .route("/api/schedules/{id}/deactivate", put(schedules::deactivate))
        .route("/api/schedules/{id}/run", post(schedules::run))
        .route("/api/pyspider-status", get(pyspider::status))
        .route("/api/pyspider/projects", get(pyspider::projects))
        .route(
            "/api/debug/projects",
            get(debug_projects::list_projects).post(debug_projects::create_project),
        )
        .route(
            "/api/debug/projects/{name}",
            get(debug_projects::get_project)
                .put(debug_projects::update_project)
                .delete(debug_projects::delete_project),
        )
        .route(
            "/api/debug/projects/{name}/script",
            get(debug_projects::get_script).put(debug_projects::put_script),
        )
        .route(
            "/api/debug/projects/{name}/history",
            get(debug_projects::list_history),
        )
        .route(
            "/api/debug/projects/{name}/history/{id}",
            get(debug_projects::history_item),
        )
        .route(
            "/api/debug/projects/{name}/run",
            post(debug_projects::run_project),
        )
        .route(
            "/api/debug/debugger/start",
            post(debug_sessions::start_debugger),
        )
        .route("/api/debug/debugger/stop", post(debug_sessions::stop_debugger))
        .route(
            "/api/debug/debugger/status",
            get(debug_sessions::debugger_status),
        )
        .route(
            "/api/debug/debugger/step_into",
            post(debug_sessions::step_into),
        )
        .route(
            "/api/debug/debugger/step_over",
            post(debug_sessions::step_over),
        )
        .route(
            "/api/debug/debugger/continue",
            post(debug_sessions::continue_execution),
        )
        .route(
            "/api/debug/profiler/cpu/start",
            post(debug_sessions::start_cpu_profiling),
        )
        .route(
            "/api/debug/profiler/cpu/stop",
            post(debug_sessions::stop_cpu_profiling),
        )
        .route(
            "/api/debug/inspector/requests",
            get(inspector::list_requests),
        )
        .route(
            "/api/debug/inspector/responses",
            get(inspector::list_responses),
        )
        .route(
            "/api/debug/inspector/request/{id}",
            get(inspector::get_request).delete(inspector::delete_request),
        )
        .route(
            "/api/debug/inspector/request/{id}/resend",
            post(inspector::resend_request),
        )
        .route("/api/socket", get(realtime::socket_status))
        .route("/ws", get(realtime::websocket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Page/limit query pair as sent by the UI; unparsable values use defaults.
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PageQuery {
    fn page_request(&self) -> nxweb_core::PageRequest {
        nxweb_core::PageRequest::new(parse_int(&self.page), parse_int(&self.limit))
    }
}

fn parse_int(value: &Option<String>) -> Option<i64> {
    value.as_deref().and_then(|text| text.trim().parse().ok())
}

fn deleted() -> axum::Json<Value> {
    axum::Json(json!({ "success": true }))
}
