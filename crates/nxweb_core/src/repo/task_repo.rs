//! Task and task log repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over `tasks` and append/list over `task_logs`.
//! - Assemble relation views (project, parent, children, schedule, logs).
//!
//! # Invariants
//! - Lists are ordered newest first with `rowid` as tie-break.
//! - A task update and its accompanying log line commit together.

use super::project_repo::project_exists;
use super::{
    constraint_as_validation, count_to_u64, parse_enum_column, PageRequest, RepoError, RepoResult,
};
use crate::model::task::{
    LogLevel, ProjectTaskItem, Task, TaskCounts, TaskDetail, TaskListItem, TaskLog,
    TaskPriority, TaskRef, TaskStatus,
};
use crate::model::NamedRef;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

pub(crate) const TASK_COLUMNS: &str = "
    t.id,
    t.name,
    t.description,
    t.status,
    t.priority,
    t.progress,
    t.started_at,
    t.completed_at,
    t.created_at,
    t.updated_at,
    t.project_id,
    t.parent_id,
    t.schedule_id";

const TASK_REFERENCE_MESSAGE: &str = "task references an unknown project, parent or schedule";

const LOG_SELECT_SQL: &str = "SELECT id, message, level, created_at, task_id FROM task_logs";

/// Filter for the task log listing.
#[derive(Debug, Clone, Default)]
pub struct TaskLogQuery {
    pub task_id: String,
    pub level: Option<LogLevel>,
    pub page: PageRequest,
}

pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<()>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    /// Updates the task and appends `log` in one transaction.
    fn update_task_with_log(&self, task: &Task, log: &TaskLog) -> RepoResult<()>;
    fn get_task(&self, id: &str) -> RepoResult<Option<Task>>;
    fn get_task_detail(&self, id: &str, recent_logs: u32) -> RepoResult<Option<TaskDetail>>;
    fn list_tasks(&self) -> RepoResult<Vec<TaskListItem>>;
    fn list_project_tasks(&self, project_id: &str) -> RepoResult<Vec<ProjectTaskItem>>;
    fn project_exists(&self, project_id: &str) -> RepoResult<bool>;
    fn delete_task(&self, id: &str) -> RepoResult<()>;
    fn insert_log(&self, log: &TaskLog) -> RepoResult<()>;
    /// Returns one page of logs plus the unpaged total.
    fn list_logs(&self, query: &TaskLogQuery) -> RepoResult<(Vec<TaskLog>, u64)>;
}

pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn named_ref(&self, sql: &str, id: &str) -> RepoResult<Option<NamedRef>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(NamedRef {
                id: row.get(0)?,
                name: row.get(1)?,
            }));
        }
        Ok(None)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO tasks (
                id, name, description, status, priority, progress,
                started_at, completed_at, created_at, updated_at,
                project_id, parent_id, schedule_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                task.id,
                task.name,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.progress,
                task.started_at,
                task.completed_at,
                task.created_at,
                task.updated_at,
                task.project_id,
                task.parent_id,
                task.schedule_id,
            ],
        )
        .map_err(|err| constraint_as_validation(err, TASK_REFERENCE_MESSAGE))?;
        Ok(())
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        write_task(self.conn, task)
    }

    fn update_task_with_log(&self, task: &Task, log: &TaskLog) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_task(&tx, task)?;
        write_log(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn get_task_detail(&self, id: &str, recent_logs: u32) -> RepoResult<Option<TaskDetail>> {
        let Some(task) = self.get_task(id)? else {
            return Ok(None);
        };

        let project = self
            .named_ref("SELECT id, name FROM projects WHERE id = ?1;", &task.project_id)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!("task {} references a missing project", task.id))
            })?;
        let parent = match task.parent_id.as_deref() {
            Some(parent_id) => {
                self.named_ref("SELECT id, name FROM tasks WHERE id = ?1;", parent_id)?
            }
            None => None,
        };
        let schedule = match task.schedule_id.as_deref() {
            Some(schedule_id) => {
                self.named_ref("SELECT id, name FROM schedules WHERE id = ?1;", schedule_id)?
            }
            None => None,
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, name, status FROM tasks WHERE parent_id = ?1 ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            children.push(TaskRef {
                id: row.get("id")?,
                name: row.get("name")?,
                status: parse_enum_column(row, "status", TaskStatus::parse)?,
            });
        }

        let (logs, _) = self.list_logs(&TaskLogQuery {
            task_id: id.to_string(),
            level: None,
            page: PageRequest::first(recent_logs),
        })?;

        Ok(Some(TaskDetail {
            task,
            project,
            parent,
            children,
            schedule,
            logs,
        }))
    }

    fn list_tasks(&self) -> RepoResult<Vec<TaskListItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS}, p.name AS project_name
             FROM tasks t
             JOIN projects p ON p.id = t.project_id
             ORDER BY t.updated_at DESC, t.rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let task = parse_task_row(row)?;
            let project = NamedRef {
                id: task.project_id.clone(),
                name: row.get("project_name")?,
            };
            items.push(TaskListItem { task, project });
        }
        Ok(items)
    }

    fn list_project_tasks(&self, project_id: &str) -> RepoResult<Vec<ProjectTaskItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS},
                (SELECT COUNT(*) FROM task_logs l WHERE l.task_id = t.id) AS log_count,
                (SELECT COUNT(*) FROM tasks c WHERE c.parent_id = t.id) AS child_count
             FROM tasks t
             WHERE t.project_id = ?1
             ORDER BY t.updated_at DESC, t.rowid DESC;"
        ))?;
        let mut rows = stmt.query([project_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(ProjectTaskItem {
                task: parse_task_row(row)?,
                count: TaskCounts {
                    logs: count_to_u64(row.get("log_count")?),
                    children: count_to_u64(row.get("child_count")?),
                },
            });
        }
        Ok(items)
    }

    fn project_exists(&self, project_id: &str) -> RepoResult<bool> {
        project_exists(self.conn, project_id)
    }

    fn delete_task(&self, id: &str) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("task", id));
        }
        Ok(())
    }

    fn insert_log(&self, log: &TaskLog) -> RepoResult<()> {
        write_log(self.conn, log)
    }

    fn list_logs(&self, query: &TaskLogQuery) -> RepoResult<(Vec<TaskLog>, u64)> {
        let mut filter = String::from(" WHERE task_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(query.task_id.clone())];
        if let Some(level) = query.level {
            filter.push_str(" AND level = ?");
            bind_values.push(Value::Text(level.as_str().to_string()));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM task_logs{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        bind_values.push(Value::Integer(i64::from(query.page.limit())));
        bind_values.push(Value::Integer(query.page.offset()));
        let mut stmt = self.conn.prepare(&format!(
            "{LOG_SELECT_SQL}{filter} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_log_row(row)?);
        }

        Ok((logs, count_to_u64(total)))
    }
}

pub(crate) fn write_task(conn: &Connection, task: &Task) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE tasks
         SET
            name = ?1,
            description = ?2,
            status = ?3,
            priority = ?4,
            progress = ?5,
            started_at = ?6,
            completed_at = ?7,
            updated_at = ?8,
            parent_id = ?9,
            schedule_id = ?10
         WHERE id = ?11;",
        params![
            task.name,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.progress,
            task.started_at,
            task.completed_at,
            task.updated_at,
            task.parent_id,
            task.schedule_id,
            task.id,
        ],
    )
    .map_err(|err| constraint_as_validation(err, TASK_REFERENCE_MESSAGE))?;
    if changed == 0 {
        return Err(RepoError::not_found("task", task.id.as_str()));
    }
    Ok(())
}

pub(crate) fn write_log(conn: &Connection, log: &TaskLog) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO task_logs (id, message, level, created_at, task_id)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            log.id,
            log.message,
            log.level.as_str(),
            log.created_at,
            log.task_id
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let progress: f64 = row.get("progress")?;
    if !(0.0..=100.0).contains(&progress) {
        return Err(RepoError::InvalidData(format!(
            "task progress `{progress}` outside 0..=100"
        )));
    }

    Ok(Task {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: parse_enum_column(row, "status", TaskStatus::parse)?,
        priority: parse_enum_column(row, "priority", TaskPriority::parse)?,
        progress,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        project_id: row.get("project_id")?,
        parent_id: row.get("parent_id")?,
        schedule_id: row.get("schedule_id")?,
    })
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<TaskLog> {
    Ok(TaskLog {
        id: row.get("id")?,
        message: row.get("message")?,
        level: parse_enum_column(row, "level", LogLevel::parse)?,
        created_at: row.get("created_at")?,
        task_id: row.get("task_id")?,
    })
}
