//! Schedule repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over `schedules` and the list/detail relation views.
//! - Persist a manual run (schedule, started tasks, their logs) atomically.

use super::project_repo::project_exists;
use super::task_repo::{parse_task_row, write_log, write_task, TASK_COLUMNS};
use super::{bool_to_int, count_to_u64, int_to_bool, parse_enum_column, RepoError, RepoResult};
use crate::model::schedule::{
    Schedule, ScheduleCounts, ScheduleDetail, ScheduleListItem, ScheduleTaskRef,
};
use crate::model::task::{Task, TaskLog, TaskPriority, TaskStatus};
use crate::model::NamedRef;
use rusqlite::{params, Connection, Row};

const SCHEDULE_COLUMNS: &str = "
    s.id,
    s.name,
    s.description,
    s.cron,
    s.active,
    s.next_run,
    s.last_run,
    s.created_at,
    s.updated_at,
    s.project_id";

pub trait ScheduleRepository {
    fn create_schedule(&self, schedule: &Schedule) -> RepoResult<()>;
    fn update_schedule(&self, schedule: &Schedule) -> RepoResult<()>;
    fn get_schedule(&self, id: &str) -> RepoResult<Option<Schedule>>;
    fn get_schedule_detail(&self, id: &str) -> RepoResult<Option<ScheduleDetail>>;
    /// Ordered `updated_at DESC`.
    fn list_schedules(&self) -> RepoResult<Vec<ScheduleListItem>>;
    fn delete_schedule(&self, id: &str) -> RepoResult<()>;
    fn project_exists(&self, project_id: &str) -> RepoResult<bool>;
    /// Tasks attached to the schedule, oldest first.
    fn list_schedule_tasks(&self, schedule_id: &str) -> RepoResult<Vec<Task>>;
    /// Writes the schedule, every started task and every log in one transaction.
    fn record_run(&self, schedule: &Schedule, tasks: &[Task], logs: &[TaskLog]) -> RepoResult<()>;
}

pub struct SqliteScheduleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteScheduleRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn create_schedule(&self, schedule: &Schedule) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO schedules (
                id, name, description, cron, active, next_run, last_run,
                created_at, updated_at, project_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                schedule.id,
                schedule.name,
                schedule.description,
                schedule.cron,
                bool_to_int(schedule.active),
                schedule.next_run,
                schedule.last_run,
                schedule.created_at,
                schedule.updated_at,
                schedule.project_id,
            ],
        )?;
        Ok(())
    }

    fn update_schedule(&self, schedule: &Schedule) -> RepoResult<()> {
        write_schedule(self.conn, schedule)
    }

    fn get_schedule(&self, id: &str) -> RepoResult<Option<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules s WHERE s.id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_schedule_row(row)?));
        }
        Ok(None)
    }

    fn get_schedule_detail(&self, id: &str) -> RepoResult<Option<ScheduleDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS}, p.name AS project_name
             FROM schedules s
             JOIN projects p ON p.id = s.project_id
             WHERE s.id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let schedule = parse_schedule_row(row)?;
        let project = NamedRef {
            id: schedule.project_id.clone(),
            name: row.get("project_name")?,
        };

        let mut task_stmt = self.conn.prepare(
            "SELECT id, name, status, priority FROM tasks
             WHERE schedule_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut task_rows = task_stmt.query([id])?;
        let mut tasks = Vec::new();
        while let Some(task_row) = task_rows.next()? {
            tasks.push(ScheduleTaskRef {
                id: task_row.get("id")?,
                name: task_row.get("name")?,
                status: parse_enum_column(task_row, "status", TaskStatus::parse)?,
                priority: parse_enum_column(task_row, "priority", TaskPriority::parse)?,
            });
        }

        Ok(Some(ScheduleDetail {
            schedule,
            project,
            tasks,
        }))
    }

    fn list_schedules(&self) -> RepoResult<Vec<ScheduleListItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS},
                p.name AS project_name,
                (SELECT COUNT(*) FROM tasks t WHERE t.schedule_id = s.id) AS task_count
             FROM schedules s
             JOIN projects p ON p.id = s.project_id
             ORDER BY s.updated_at DESC, s.rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let schedule = parse_schedule_row(row)?;
            let project = NamedRef {
                id: schedule.project_id.clone(),
                name: row.get("project_name")?,
            };
            items.push(ScheduleListItem {
                schedule,
                project,
                count: ScheduleCounts {
                    tasks: count_to_u64(row.get("task_count")?),
                },
            });
        }
        Ok(items)
    }

    fn delete_schedule(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("schedule", id));
        }
        Ok(())
    }

    fn project_exists(&self, project_id: &str) -> RepoResult<bool> {
        project_exists(self.conn, project_id)
    }

    fn list_schedule_tasks(&self, schedule_id: &str) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             WHERE t.schedule_id = ?1
             ORDER BY t.created_at ASC, t.rowid ASC;"
        ))?;
        let mut rows = stmt.query([schedule_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn record_run(&self, schedule: &Schedule, tasks: &[Task], logs: &[TaskLog]) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_schedule(&tx, schedule)?;
        for task in tasks {
            write_task(&tx, task)?;
        }
        for log in logs {
            write_log(&tx, log)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn write_schedule(conn: &Connection, schedule: &Schedule) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE schedules
         SET
            name = ?1,
            description = ?2,
            cron = ?3,
            active = ?4,
            next_run = ?5,
            last_run = ?6,
            updated_at = ?7
         WHERE id = ?8;",
        params![
            schedule.name,
            schedule.description,
            schedule.cron,
            bool_to_int(schedule.active),
            schedule.next_run,
            schedule.last_run,
            schedule.updated_at,
            schedule.id,
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::not_found("schedule", schedule.id.as_str()));
    }
    Ok(())
}

fn parse_schedule_row(row: &Row<'_>) -> RepoResult<Schedule> {
    Ok(Schedule {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        cron: row.get("cron")?,
        active: int_to_bool(row.get("active")?, "schedules.active")?,
        next_run: row.get("next_run")?,
        last_run: row.get("last_run")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        project_id: row.get("project_id")?,
    })
}
