//! Debug project, script history and debug session persistence.
//!
//! # Responsibility
//! - CRUD over `debug_projects` keyed by unique name.
//! - Snapshot-then-replace script updates through `script_history`.
//! - Track `debug_sessions` and the `debug_tasks` submitted with them.
//!
//! # Invariants
//! - A duplicate debug project name surfaces as `RepoError::Conflict`.
//! - Script replacement and its history snapshot commit together.

use super::{json_to_db, parse_enum_column, parse_json_column, RepoError, RepoResult};
use crate::model::debug::{
    DebugProject, DebugSession, DebugSessionStatus, DebugSessionType, DebugTask, ScriptHistory,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};

const DEBUG_PROJECT_SELECT_SQL: &str =
    "SELECT id, name, script, created_at, updated_at FROM debug_projects";
const HISTORY_SELECT_SQL: &str =
    "SELECT id, content, created_at, project_id FROM script_history";
const SESSION_SELECT_SQL: &str =
    "SELECT id, type, status, started_at, ended_at, data, project_id FROM debug_sessions";

/// Filter for picking the most recent matching session.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    pub kind: DebugSessionType,
    /// Empty means any status.
    pub statuses: Vec<DebugSessionStatus>,
    /// Matches `data.profilingType` when set.
    pub profiling_type: Option<String>,
}

impl SessionQuery {
    pub fn new(kind: DebugSessionType) -> Self {
        Self {
            kind,
            statuses: Vec::new(),
            profiling_type: None,
        }
    }

    pub fn with_statuses(mut self, statuses: &[DebugSessionStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_profiling_type(mut self, profiling_type: impl Into<String>) -> Self {
        self.profiling_type = Some(profiling_type.into());
        self
    }
}

pub trait DebugRepository {
    fn create_debug_project(&self, project: &DebugProject) -> RepoResult<()>;
    fn update_debug_project(&self, project: &DebugProject) -> RepoResult<()>;
    fn get_debug_project(&self, name: &str) -> RepoResult<Option<DebugProject>>;
    /// Ordered `updated_at DESC`.
    fn list_debug_projects(&self) -> RepoResult<Vec<DebugProject>>;
    fn delete_debug_project(&self, id: &str) -> RepoResult<()>;
    /// Stores `snapshot` and then writes `project` in one transaction.
    fn replace_script(&self, project: &DebugProject, snapshot: &ScriptHistory) -> RepoResult<()>;
    /// Ordered `created_at DESC`.
    fn list_history(&self, project_id: &str) -> RepoResult<Vec<ScriptHistory>>;
    fn get_history(&self, project_id: &str, id: &str) -> RepoResult<Option<ScriptHistory>>;
    fn create_session(&self, session: &DebugSession) -> RepoResult<()>;
    fn update_session(&self, session: &DebugSession) -> RepoResult<()>;
    fn get_session(&self, id: &str) -> RepoResult<Option<DebugSession>>;
    fn latest_session(&self, query: &SessionQuery) -> RepoResult<Option<DebugSession>>;
    fn create_debug_task(&self, task: &DebugTask) -> RepoResult<()>;
    fn list_debug_tasks(&self, session_id: &str) -> RepoResult<Vec<DebugTask>>;
}

pub struct SqliteDebugRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDebugRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DebugRepository for SqliteDebugRepository<'_> {
    fn create_debug_project(&self, project: &DebugProject) -> RepoResult<()> {
        let result = self.conn.execute(
            "INSERT INTO debug_projects (id, name, script, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                project.id,
                project.name,
                project.script,
                project.created_at,
                project.updated_at
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(RepoError::Conflict(format!(
                    "debug project `{}` already exists",
                    project.name
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_debug_project(&self, project: &DebugProject) -> RepoResult<()> {
        write_debug_project(self.conn, project)
    }

    fn get_debug_project(&self, name: &str) -> RepoResult<Option<DebugProject>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DEBUG_PROJECT_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_debug_project_row(row)?));
        }
        Ok(None)
    }

    fn list_debug_projects(&self) -> RepoResult<Vec<DebugProject>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DEBUG_PROJECT_SELECT_SQL} ORDER BY updated_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_debug_project_row(row)?);
        }
        Ok(projects)
    }

    fn delete_debug_project(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM debug_projects WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("debug project", id));
        }
        Ok(())
    }

    fn replace_script(&self, project: &DebugProject, snapshot: &ScriptHistory) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO script_history (id, content, created_at, project_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                snapshot.id,
                snapshot.content,
                snapshot.created_at,
                snapshot.project_id
            ],
        )?;
        write_debug_project(&tx, project)?;
        tx.commit()?;
        Ok(())
    }

    fn list_history(&self, project_id: &str) -> RepoResult<Vec<ScriptHistory>> {
        let mut stmt = self.conn.prepare(&format!(
            "{HISTORY_SELECT_SQL} WHERE project_id = ?1 ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([project_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_history_row(row)?);
        }
        Ok(items)
    }

    fn get_history(&self, project_id: &str, id: &str) -> RepoResult<Option<ScriptHistory>> {
        let mut stmt = self.conn.prepare(&format!(
            "{HISTORY_SELECT_SQL} WHERE id = ?1 AND project_id = ?2;"
        ))?;
        let mut rows = stmt.query([id, project_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_history_row(row)?));
        }
        Ok(None)
    }

    fn create_session(&self, session: &DebugSession) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO debug_sessions (id, type, status, started_at, ended_at, data, project_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                session.id,
                session.kind.as_str(),
                session.status.as_str(),
                session.started_at,
                session.ended_at,
                session.data.as_ref().map(json_to_db),
                session.project_id,
            ],
        )?;
        Ok(())
    }

    fn update_session(&self, session: &DebugSession) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE debug_sessions
             SET status = ?1, ended_at = ?2, data = ?3, project_id = ?4
             WHERE id = ?5;",
            params![
                session.status.as_str(),
                session.ended_at,
                session.data.as_ref().map(json_to_db),
                session.project_id,
                session.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("debug session", session.id.as_str()));
        }
        Ok(())
    }

    fn get_session(&self, id: &str) -> RepoResult<Option<DebugSession>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SESSION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_session_row(row)?));
        }
        Ok(None)
    }

    fn latest_session(&self, query: &SessionQuery) -> RepoResult<Option<DebugSession>> {
        let mut sql = format!("{SESSION_SELECT_SQL} WHERE type = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(query.kind.as_str().to_string())];

        if !query.statuses.is_empty() {
            let placeholders = vec!["?"; query.statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({placeholders})"));
            for status in &query.statuses {
                bind_values.push(Value::Text(status.as_str().to_string()));
            }
        }

        if let Some(profiling_type) = &query.profiling_type {
            sql.push_str(" AND json_extract(data, '$.profilingType') = ?");
            bind_values.push(Value::Text(profiling_type.clone()));
        }

        sql.push_str(" ORDER BY started_at DESC, rowid DESC LIMIT 1;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_session_row(row)?));
        }
        Ok(None)
    }

    fn create_debug_task(&self, task: &DebugTask) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO debug_tasks (id, task_id, project, url, process, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                task.id,
                task.task_id,
                task.project,
                task.url,
                json_to_db(&task.process),
                task.session_id,
            ],
        )?;
        Ok(())
    }

    fn list_debug_tasks(&self, session_id: &str) -> RepoResult<Vec<DebugTask>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, project, url, process, session_id
             FROM debug_tasks WHERE session_id = ?1 ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([session_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(DebugTask {
                id: row.get("id")?,
                task_id: row.get("task_id")?,
                project: row.get("project")?,
                url: row.get("url")?,
                process: parse_json_column(row, "process")?.unwrap_or_default(),
                session_id: row.get("session_id")?,
            });
        }
        Ok(tasks)
    }
}

fn write_debug_project(conn: &Connection, project: &DebugProject) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE debug_projects SET script = ?1, updated_at = ?2 WHERE id = ?3;",
        params![project.script, project.updated_at, project.id],
    )?;
    if changed == 0 {
        return Err(RepoError::not_found("debug project", project.id.as_str()));
    }
    Ok(())
}

fn parse_debug_project_row(row: &Row<'_>) -> RepoResult<DebugProject> {
    Ok(DebugProject {
        id: row.get("id")?,
        name: row.get("name")?,
        script: row.get("script")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<ScriptHistory> {
    Ok(ScriptHistory {
        id: row.get("id")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        project_id: row.get("project_id")?,
    })
}

pub(crate) fn parse_session_row(row: &Row<'_>) -> RepoResult<DebugSession> {
    Ok(DebugSession {
        id: row.get("id")?,
        kind: parse_enum_column(row, "type", DebugSessionType::parse)?,
        status: parse_enum_column(row, "status", DebugSessionStatus::parse)?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        data: parse_json_column(row, "data")?,
        project_id: row.get("project_id")?,
    })
}
