//! Project repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over `projects`.
//! - Aggregate counts used by project detail and stats views.

use super::{count_to_u64, json_to_db, parse_enum_column, RepoError, RepoResult};
use crate::model::project::{Project, ProjectCounts, ProjectStatus, TaskStatusCounts};
use crate::model::task::TaskStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    status,
    settings,
    created_at,
    updated_at
FROM projects";

/// Schedule totals for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleTotals {
    pub total: u64,
    pub active: u64,
}

pub trait ProjectRepository {
    fn create_project(&self, project: &Project) -> RepoResult<()>;
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn get_project(&self, id: &str) -> RepoResult<Option<Project>>;
    /// Ordered `updated_at DESC`.
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    fn delete_project(&self, id: &str) -> RepoResult<()>;
    fn project_counts(&self, id: &str) -> RepoResult<ProjectCounts>;
    fn task_status_counts(&self, id: &str) -> RepoResult<TaskStatusCounts>;
    fn schedule_totals(&self, id: &str) -> RepoResult<ScheduleTotals>;
    /// Mean task progress, `0` when the project has no tasks.
    fn mean_task_progress(&self, id: &str) -> RepoResult<f64>;
}

pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, project: &Project) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO projects (id, name, description, status, settings, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                project.id,
                project.name,
                project.description,
                project.status.as_str(),
                json_to_db(&project.settings),
                project.created_at,
                project.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects
             SET name = ?1, description = ?2, status = ?3, settings = ?4, updated_at = ?5
             WHERE id = ?6;",
            params![
                project.name,
                project.description,
                project.status.as_str(),
                json_to_db(&project.settings),
                project.updated_at,
                project.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("project", project.id.as_str()));
        }
        Ok(())
    }

    fn get_project(&self, id: &str) -> RepoResult<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL} ORDER BY updated_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }
        Ok(projects)
    }

    fn delete_project(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("project", id));
        }
        Ok(())
    }

    fn project_counts(&self, id: &str) -> RepoResult<ProjectCounts> {
        let (tasks, schedules) = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM tasks WHERE project_id = ?1),
                (SELECT COUNT(*) FROM schedules WHERE project_id = ?1);",
            [id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(ProjectCounts {
            tasks: count_to_u64(tasks),
            schedules: count_to_u64(schedules),
        })
    }

    fn task_status_counts(&self, id: &str) -> RepoResult<TaskStatusCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) AS total FROM tasks WHERE project_id = ?1 GROUP BY status;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut counts = TaskStatusCounts::default();
        while let Some(row) = rows.next()? {
            let status = parse_enum_column(row, "status", TaskStatus::parse)?;
            counts.add(status, count_to_u64(row.get("total")?));
        }
        Ok(counts)
    }

    fn schedule_totals(&self, id: &str) -> RepoResult<ScheduleTotals> {
        let (total, active) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM schedules WHERE project_id = ?1;",
            [id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(ScheduleTotals {
            total: count_to_u64(total),
            active: count_to_u64(active),
        })
    }

    fn mean_task_progress(&self, id: &str) -> RepoResult<f64> {
        let mean = self
            .conn
            .query_row(
                "SELECT AVG(progress) FROM tasks WHERE project_id = ?1;",
                [id],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()?
            .flatten();
        Ok(mean.unwrap_or(0.0))
    }
}

pub(crate) fn project_exists(conn: &Connection, id: &str) -> RepoResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM projects WHERE id = ?1;", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let settings_text: String = row.get("settings")?;
    let settings = serde_json::from_str(&settings_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in projects.settings: {err}"))
    })?;

    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: parse_enum_column(row, "status", ProjectStatus::parse)?,
        settings,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
