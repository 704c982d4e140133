use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

pub(super) async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(state.pyspider.status().await)
}

pub(super) async fn projects(State(state): State<AppState>) -> Json<Value> {
    Json(state.pyspider.projects().await)
}
