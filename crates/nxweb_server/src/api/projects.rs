use super::deleted;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use nxweb_core::model::project::{
    NewProject, Project, ProjectPatch, ProjectStats, ProjectWithCounts,
};
use nxweb_core::model::task::ProjectTaskItem;
use serde_json::Value;

pub(super) async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    let projects = state.store.projects(|service| service.list_projects()).await?;
    Ok(Json(projects))
}

pub(super) async fn create_project(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state
        .store
        .projects(move |service| service.create_project(input))
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub(super) async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectWithCounts>> {
    let project = state
        .store
        .projects(move |service| service.get_project(&id))
        .await?;
    Ok(Json(project))
}

pub(super) async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ProjectPatch>,
) -> ApiResult<Json<Project>> {
    let project = state
        .store
        .projects(move |service| service.update_project(&id, patch))
        .await?;
    Ok(Json(project))
}

pub(super) async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .projects(move |service| service.delete_project(&id))
        .await?;
    Ok(deleted())
}

pub(super) async fn project_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectStats>> {
    let stats = state
        .store
        .projects(move |service| service.project_stats(&id))
        .await?;
    Ok(Json(stats))
}

pub(super) async fn project_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ProjectTaskItem>>> {
    let tasks = state
        .store
        .tasks(move |service| service.list_project_tasks(&id))
        .await?;
    Ok(Json(tasks))
}
