use super::deleted;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use nxweb_core::model::schedule::{
    NewSchedule, Schedule, ScheduleDetail, ScheduleListItem, SchedulePatch,
};
use nxweb_core::service::schedule_service::ScheduleRunResult;
use serde_json::Value;

pub(super) async fn list_schedules(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ScheduleListItem>>> {
    let schedules = state
        .store
        .schedules(|service| service.list_schedules())
        .await?;
    Ok(Json(schedules))
}

pub(super) async fn create_schedule(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewSchedule>,
) -> ApiResult<(StatusCode, Json<Schedule>)> {
    let schedule = state
        .store
        .schedules(move |service| service.create_schedule(input))
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub(super) async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduleDetail>> {
    let schedule = state
        .store
        .schedules(move |service| service.get_schedule(&id))
        .await?;
    Ok(Json(schedule))
}

pub(super) async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<SchedulePatch>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .store
        .schedules(move |service| service.update_schedule(&id, patch))
        .await?;
    Ok(Json(schedule))
}

pub(super) async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .schedules(move |service| service.delete_schedule(&id))
        .await?;
    Ok(deleted())
}

pub(super) async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .store
        .schedules(move |service| service.activate(&id))
        .await?;
    Ok(Json(schedule))
}

pub(super) async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .store
        .schedules(move |service| service.deactivate(&id))
        .await?;
    Ok(Json(schedule))
}

pub(super) async fn run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduleRunResult>> {
    let result = state.store.schedules(move |service| service.run(&id)).await?;
    Ok(Json(result))
}
