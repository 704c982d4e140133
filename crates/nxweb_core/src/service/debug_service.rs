//! Script debugging use-cases: debug projects, script history, debug runs
//! and session bookkeeping.
//!
//! # Invariants
//! - Debug project names are non-blank and unique.
//! - Replacing a script snapshots the previous one first.
//! - A debug run always ends with its session `STOPPED`.

use super::{required_text, ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::debug::{
    DebugProject, DebugSession, DebugSessionType, DebugTask, ScriptHistory,
};
use crate::model::new_id;
use crate::repo::debug_repo::{DebugRepository, SessionQuery};
use log::info;
use serde_json::{json, Map, Value};

/// Task id and url used when a debug run does not supply one.
pub const ON_START_TASK: &str = "data:,on_start";
pub const ON_START_CALLBACK: &str = "on_start";
pub const DEFAULT_START_URL: &str = "http://example.com/";

const PROJECT_NOT_FOUND: &str = "Project not found";
const SCRIPT_REQUIRED: &str = "Script is required";

/// Session and normalized task created for one debug run.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugRun {
    pub session: DebugSession,
    pub task: Value,
}

pub struct DebugService<R: DebugRepository> {
    repo: R,
}

impl<R: DebugRepository> DebugService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_projects(&self) -> ServiceResult<Vec<DebugProject>> {
        Ok(self.repo.list_debug_projects()?)
    }

    /// Fails with `InvalidInput` for a blank name and `Conflict` for a taken one.
    pub fn ensure_name_available(&self, name: &str) -> ServiceResult<String> {
        let name = required_text(name, "Project name is required")?;
        if self.repo.get_debug_project(&name)?.is_some() {
            return Err(ServiceError::Conflict("Project name already exists".to_string()));
        }
        Ok(name)
    }

    pub fn create_project(&self, name: &str, script: String) -> ServiceResult<DebugProject> {
        let name = self.ensure_name_available(name)?;
        let now = now_ms();
        let project = DebugProject {
            id: new_id(),
            name,
            script,
            created_at: now,
            updated_at: now,
        };
        self.repo.create_debug_project(&project)?;
        info!(
            "event=debug_project_create module=service status=ok project={}",
            project.name
        );
        Ok(project)
    }

    pub fn find_project(&self, name: &str) -> ServiceResult<Option<DebugProject>> {
        Ok(self.repo.get_debug_project(name)?)
    }

    pub fn get_project(&self, name: &str) -> ServiceResult<DebugProject> {
        self.find_project(name)?
            .ok_or_else(|| ServiceError::not_found(PROJECT_NOT_FOUND))
    }

    /// Stores a script fetched from the crawler.
    ///
    /// Creates the project when missing; otherwise replaces a differing,
    /// non-empty script without a history snapshot.
    pub fn sync_script(&self, name: &str, script: &str) -> ServiceResult<DebugProject> {
        match self.find_project(name)? {
            Some(mut project) => {
                if !script.is_empty() && script != project.script {
                    project.script = script.to_string();
                    project.updated_at = now_ms();
                    self.repo.update_debug_project(&project)?;
                }
                Ok(project)
            }
            None => self.create_project(name, script.to_string()),
        }
    }

    /// Replaces the script when `script` is non-empty.
    pub fn update_project(&self, name: &str, script: Option<&str>) -> ServiceResult<DebugProject> {
        let mut project = self.get_project(name)?;
        if let Some(script) = script.filter(|value| !value.is_empty()) {
            project.script = script.to_string();
        }
        project.updated_at = now_ms();
        self.repo.update_debug_project(&project)?;
        Ok(project)
    }

    pub fn delete_project(&self, name: &str) -> ServiceResult<DebugProject> {
        let project = self.get_project(name)?;
        self.repo.delete_debug_project(&project.id)?;
        info!("event=debug_project_delete module=service status=ok project={name}");
        Ok(project)
    }

    pub fn script(&self, name: &str) -> ServiceResult<String> {
        Ok(self.get_project(name)?.script)
    }

    /// Snapshots the current script into history, then stores `script`.
    pub fn replace_script(&self, name: &str, script: &str) -> ServiceResult<DebugProject> {
        if script.is_empty() {
            return Err(ServiceError::invalid(SCRIPT_REQUIRED));
        }
        let mut project = self.get_project(name)?;
        let now = now_ms();
        let snapshot = ScriptHistory {
            id: new_id(),
            content: project.script.clone(),
            created_at: now,
            project_id: project.id.clone(),
        };
        project.script = script.to_string();
        project.updated_at = now;
        self.repo.replace_script(&project, &snapshot)?;
        Ok(project)
    }

    pub fn history(&self, name: &str) -> ServiceResult<Vec<ScriptHistory>> {
        let project = self.get_project(name)?;
        Ok(self.repo.list_history(&project.id)?)
    }

    pub fn history_item(&self, name: &str, id: &str) -> ServiceResult<ScriptHistory> {
        let project = self.get_project(name)?;
        self.repo
            .get_history(&project.id, id)?
            .ok_or_else(|| ServiceError::not_found("History item not found"))
    }

    /// Validates run input and records a `RUNNING` debugger session with its task.
    pub fn begin_run(
        &self,
        name: &str,
        script: Option<&str>,
        task: Option<Value>,
    ) -> ServiceResult<DebugRun> {
        if script.map_or(true, str::is_empty) {
            return Err(ServiceError::invalid(SCRIPT_REQUIRED));
        }
        let task = match task {
            Some(Value::Null) | None => return Err(ServiceError::invalid("Task is required")),
            Some(task) => task,
        };
        let project = self.get_project(name)?;
        let task = normalize_debug_task(task)?;

        let session = DebugSession::start(
            DebugSessionType::Debugger,
            Some(project.id.clone()),
            None,
            now_ms(),
        );
        self.repo.create_session(&session)?;
        self.repo.create_debug_task(&DebugTask {
            id: new_id(),
            task_id: task_text(&task, "taskid"),
            project: project.name.clone(),
            url: task_text(&task, "url"),
            process: task.get("process").cloned().unwrap_or_default(),
            session_id: session.id.clone(),
        })?;

        Ok(DebugRun { session, task })
    }

    /// Stops `session` and replaces its data with `result`.
    pub fn finish_session(&self, mut session: DebugSession, result: Value) -> ServiceResult<DebugSession> {
        session.stop(now_ms());
        session.data = Some(result);
        self.repo.update_session(&session)?;
        Ok(session)
    }

    pub fn latest_session(&self, query: &SessionQuery) -> ServiceResult<Option<DebugSession>> {
        Ok(self.repo.latest_session(query)?)
    }

    pub fn start_session(
        &self,
        kind: DebugSessionType,
        data: Option<Value>,
    ) -> ServiceResult<DebugSession> {
        let session = DebugSession::start(kind, None, data, now_ms());
        self.repo.create_session(&session)?;
        Ok(session)
    }

    pub fn save_session(&self, session: &DebugSession) -> ServiceResult<()> {
        Ok(self.repo.update_session(session)?)
    }
}

/// Task handed to the debugger when a project is opened.
pub fn default_task(project: &str) -> Value {
    json!({
        "taskid": ON_START_TASK,
        "project": project,
        "url": ON_START_TASK,
        "process": { "callback": ON_START_CALLBACK },
    })
}

/// Built-in crawl handler used when the crawler cannot supply a template.
///
/// `date` is stamped verbatim into the header comment.
pub fn default_script(project: &str, start_url: Option<&str>, date: &str) -> String {
    let start_url = start_url
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_START_URL);
    format!(
        r#"#!/usr/bin/env python
# -*- encoding: utf-8 -*-
# Created on {date}
# Project: {project}

from pyspider.libs.base_handler import *


class Handler(BaseHandler):
    crawl_config = {{
    }}

    @every(minutes=24 * 60)
    def on_start(self):
        self.crawl('{start_url}', callback=self.index_page)

    @config(age=10 * 24 * 60 * 60)
    def index_page(self, response):
        for each in response.doc('a[href^="http"]').items():
            self.crawl(each.attr.href, callback=self.detail_page)

    @config(priority=2)
    def detail_page(self, response):
        return {{
            "url": response.url,
            "title": response.doc('title').text(),
        }}
"#
    )
}

/// Accepts a task object or its JSON text and fills missing
/// `taskid`, `url` and `process.callback`.
pub fn normalize_debug_task(task: Value) -> ServiceResult<Value> {
    let task = match task {
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .map_err(|err| ServiceError::invalid(format!("Invalid task JSON: {err}")))?,
        other => other,
    };
    let Value::Object(mut map) = task else {
        return Err(ServiceError::invalid("Invalid task JSON: expected an object"));
    };

    if !has_text(&map, "taskid") {
        map.insert("taskid".into(), Value::String(ON_START_TASK.into()));
    }
    if !has_text(&map, "url") {
        map.insert("url".into(), Value::String(ON_START_TASK.into()));
    }
    let has_callback = map
        .get("process")
        .and_then(|process| process.get("callback"))
        .and_then(Value::as_str)
        .is_some_and(|callback| !callback.is_empty());
    if !has_callback {
        map.insert("process".into(), json!({ "callback": ON_START_CALLBACK }));
    }

    Ok(Value::Object(map))
}

/// Canned fetch result returned when the crawler cannot run the task.
pub fn mock_run_result(task: &Value) -> Value {
    let url = task_text(task, "url");
    let taskid = task_text(task, "taskid");
    json!({
        "fetch_result": {
            "status_code": 200,
            "url": url,
            "content": "<html><body><h1>Mock Response</h1><p>This is a mock response for debugging purposes.</p></body></html>",
            "headers": { "content-type": "text/html" },
            "cookies": {},
            "time": 0.1,
            "save": {
                "taskid": taskid,
                "url": url,
                "status_code": 200
            }
        },
        "follows": [],
        "messages": [
            { "type": "info", "message": "Using mock response (PySpider API not available)" }
        ],
        "logs": "PySpider API not available. Using mock response for debugging.\nScript executed in mock environment."
    })
}

fn has_text(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.is_empty())
}

fn task_text(task: &Value, key: &str) -> String {
    task.get(key)
        .and_then(Value::as_str)
        .unwrap_or(ON_START_TASK)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{default_script, default_task, mock_run_result, normalize_debug_task};
    use serde_json::json;

    #[test]
    fn default_script_stamps_header_and_start_url() {
        let script = default_script("news", Some("https://news.example/"), "2024-05-01");
        assert!(script.contains("# Created on 2024-05-01"));
        assert!(script.contains("# Project: news"));
        assert!(script.contains("self.crawl('https://news.example/', callback=self.index_page)"));
        assert!(script.contains("crawl_config = {\n    }"));
    }

    #[test]
    fn default_script_falls_back_to_example_url() {
        let script = default_script("news", Some("  "), "2024-05-01");
        assert!(script.contains("self.crawl('http://example.com/'"));
    }

    #[test]
    fn default_task_targets_on_start() {
        let task = default_task("news");
        assert_eq!(task["taskid"], "data:,on_start");
        assert_eq!(task["project"], "news");
        assert_eq!(task["process"]["callback"], "on_start");
    }

    #[test]
    fn normalize_parses_json_text_and_fills_defaults() {
        let task = normalize_debug_task(json!("{\"url\":\"http://a/\",\"process\":{}}")).unwrap();
        assert_eq!(task["url"], "http://a/");
        assert_eq!(task["taskid"], "data:,on_start");
        assert_eq!(task["process"], json!({"callback": "on_start"}));
    }

    #[test]
    fn normalize_rejects_invalid_json() {
        let err = normalize_debug_task(json!("{not json")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid task JSON"));
    }

    #[test]
    fn mock_result_echoes_task_url() {
        let result = mock_run_result(&json!({"taskid": "t1", "url": "http://a/"}));
        assert_eq!(result["fetch_result"]["url"], "http://a/");
        assert_eq!(result["fetch_result"]["save"]["taskid"], "t1");
        assert_eq!(result["follows"], json!([]));
    }
}
