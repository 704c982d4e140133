use super::{deleted, PageQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nxweb_core::model::task::{
    LogLevel, NewTask, Task, TaskDetail, TaskListItem, TaskLog, TaskLogPage, TaskPatch,
    TaskProgress,
};
use serde::Deserialize;
use serde_json::Value;

const INVALID_PROGRESS: &str = "Progress must be a number between 0 and 100";

#[derive(Debug, Deserialize)]
pub(super) struct StatusBody {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProgressBody {
    progress: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LogBody {
    #[serde(default)]
    message: String,
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct LogQuery {
    level: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

pub(super) async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskListItem>>> {
    let tasks = state.store.tasks(|service| service.list_tasks()).await?;
    Ok(Json(tasks))
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state
        .store
        .tasks(move |service| service.create_task(input))
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskDetail>> {
    let task = state.store.tasks(move |service| service.get_task(&id)).await?;
    Ok(Json(task))
}

pub(super) async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> ApiResult<Json<Task>> {
    let task = state
        .store
        .tasks(move |service| service.update_task(&id, patch))
        .await?;
    Ok(Json(task))
}

pub(super) async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .tasks(move |service| service.delete_task(&id))
        .await?;
    Ok(deleted())
}

pub(super) async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<Task>> {
    let task = state
        .store
        .tasks(move |service| service.change_status(&id, &body.status))
        .await?;
    Ok(Json(task))
}

pub(super) async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskProgress>> {
    let progress = state.store.tasks(move |service| service.progress(&id)).await?;
    Ok(Json(progress))
}

pub(super) async fn set_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ProgressBody>,
) -> ApiResult<Json<Task>> {
    let progress = body
        .progress
        .as_ref()
        .and_then(Value::as_f64)
        .ok_or_else(|| ApiError::bad_request(INVALID_PROGRESS))?;
    let task = state
        .store
        .tasks(move |service| service.set_progress(&id, progress))
        .await?;
    Ok(Json(task))
}

pub(super) async fn list_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<TaskLogPage>> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let level = query.level;
    let logs = state
        .store
        .tasks(move |service| service.list_logs(&id, level.as_deref(), page))
        .await?;
    Ok(Json(logs))
}

pub(super) async fn create_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<LogBody>,
) -> ApiResult<(StatusCode, Json<TaskLog>)> {
    let level = match body.level.as_deref().filter(|value| !value.is_empty()) {
        Some(text) => {
            Some(LogLevel::parse(text).ok_or_else(|| ApiError::bad_request("Invalid log level"))?)
        }
        None => None,
    };
    let log = state
        .store
        .tasks(move |service| service.add_log(&id, &body.message, level))
        .await?;
    Ok((StatusCode::CREATED, Json(log)))
}
