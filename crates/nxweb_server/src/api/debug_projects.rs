use super::deleted;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::pyspider::{DebugPage, PySpiderClient};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use log::{info, warn};
use nxweb_core::model::debug::{DebugProject, ScriptHistory};
use nxweb_core::service::debug_service::{default_script, default_task, mock_run_result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateBody {
    #[serde(default)]
    name: String,
    start_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct GetQuery {
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ScriptBody {
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RunBody {
    script: Option<String>,
    task: Option<Value>,
}

/// Stored project plus the task the debugger opens with.
#[derive(Debug, Serialize)]
pub(super) struct ProjectWithTask {
    #[serde(flatten)]
    project: DebugProject,
    task: Value,
}

impl ProjectWithTask {
    fn new(project: DebugProject) -> Self {
        let task = default_task(&project.name);
        Self { project, task }
    }
}

pub(super) async fn list_projects(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DebugProject>>> {
    let projects = state.store.debug(|service| service.list_projects()).await?;
    Ok(Json(projects))
}

pub(super) async fn create_project(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateBody>,
) -> ApiResult<Json<DebugProject>> {
    let requested = body.name;
    let name = state
        .store
        .debug(move |service| service.ensure_name_available(&requested))
        .await?;
    let start_url = body.start_url.unwrap_or_default();

    let script = match state.pyspider.default_script(&name, &start_url).await {
        Ok(script) => script,
        Err(err) => {
            warn!(
                "event=debug_project_create module=api status=fallback project={name} error={err}"
            );
            let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
            default_script(&name, Some(start_url.as_str()), &date)
        }
    };

    let project = {
        let name = name.clone();
        state
            .store
            .debug(move |service| service.create_project(&name, script))
            .await?
    };
    push_script(&state.pyspider, &project.name, &project.script).await;
    Ok(Json(project))
}

/// Serves the cached script unless `refresh=true`, else asks the crawler.
pub(super) async fn get_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<GetQuery>,
) -> ApiResult<ProjectReply> {
    let refresh = query.refresh.as_deref() == Some("true");
    if !refresh {
        let lookup = name.clone();
        let cached = state
            .store
            .debug(move |service| service.find_project(&lookup))
            .await?;
        if let Some(project) = cached.filter(|project| !project.script.is_empty()) {
            return Ok(ProjectReply::Project(ProjectWithTask::new(project)));
        }
    }

    match state.pyspider.debug_page(&name).await {
        Ok(DebugPage::Json(value)) => Ok(ProjectReply::Raw(value)),
        Ok(DebugPage::Script(script)) => {
            let (lookup, fetched) = (name.clone(), script.clone());
            state
                .store
                .debug(move |service| service.sync_script(&lookup, &fetched))
                .await?;
            Ok(ProjectReply::Raw(json!({
                "name": name,
                "script": script,
                "task": default_task(&name),
            })))
        }
        Err(err) => {
            warn!("event=debug_project_fetch module=api status=offline project={name} error={err}");
            let project = state
                .store
                .debug(move |service| service.get_project(&name))
                .await?;
            Ok(ProjectReply::Project(ProjectWithTask::new(project)))
        }
    }
}

pub(super) enum ProjectReply {
    Project(ProjectWithTask),
    Raw(Value),
}

impl axum::response::IntoResponse for ProjectReply {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Project(project) => Json(project).into_response(),
            Self::Raw(value) => Json(value).into_response(),
        }
    }
}

pub(super) async fn update_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<ScriptBody>,
) -> ApiResult<Json<DebugProject>> {
    let project = state
        .store
        .debug(move |service| service.update_project(&name, body.script.as_deref()))
        .await?;
    push_script(&state.pyspider, &project.name, &project.script).await;
    Ok(Json(project))
}

pub(super) async fn delete_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let project = state
        .store
        .debug(move |service| service.delete_project(&name))
        .await?;
    if let Err(err) = state.pyspider.delete_project(&project.name).await {
        warn!(
            "event=pyspider_delete module=api status=error project={} error={err}",
            project.name
        );
    }
    Ok(deleted())
}

pub(super) async fn get_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let script = state.store.debug(move |service| service.script(&name)).await?;
    Ok(Json(json!({ "script": script })))
}

pub(super) async fn put_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<ScriptBody>,
) -> ApiResult<Json<Value>> {
    let script = body.script.unwrap_or_default();
    let project = state
        .store
        .debug(move |service| service.replace_script(&name, &script))
        .await?;
    push_script(&state.pyspider, &project.name, &project.script).await;
    Ok(Json(json!({ "success": true, "script": project.script })))
}

pub(super) async fn list_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ScriptHistory>>> {
    let history = state.store.debug(move |service| service.history(&name)).await?;
    Ok(Json(history))
}

pub(super) async fn history_item(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Json<ScriptHistory>> {
    let item = state
        .store
        .debug(move |service| service.history_item(&name, &id))
        .await?;
    Ok(Json(item))
}

/// Runs one task through the crawler, falling back to a canned result.
pub(super) async fn run_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<RunBody>,
) -> ApiResult<Json<Value>> {
    let script = body.script.unwrap_or_default();
    let run = {
        let (name, script) = (name.clone(), script.clone());
        state
            .store
            .debug(move |service| service.begin_run(&name, Some(&script), body.task))
            .await?
    };

    let result = match run_on_crawler(&state.pyspider, &name, &script, &run.task).await {
        Ok(result) => result,
        Err(err) => {
            warn!("event=debug_run module=api status=mock project={name} error={err}");
            mock_run_result(&run.task)
        }
    };

    let data = result.clone();
    let session = run.session;
    let session_id = session.id.clone();
    state
        .store
        .debug(move |service| service.finish_session(session, data))
        .await?;
    info!("event=debug_run module=api status=ok project={name} session_id={session_id}");
    Ok(Json(result))
}

async fn run_on_crawler(
    client: &PySpiderClient,
    name: &str,
    script: &str,
    task: &Value,
) -> Result<Value, ApiError> {
    if !client.is_alive().await {
        return Err(ApiError::BadGateway("PySpider is not running".to_string()));
    }
    Ok(client.run_debug(name, script, task).await?)
}

/// Pushes the script to the crawler; failures are only logged.
async fn push_script(client: &PySpiderClient, name: &str, script: &str) {
    if let Err(err) = client.save_project(name, script).await {
        warn!("event=pyspider_save module=api status=error project={name} error={err}");
    }
}
