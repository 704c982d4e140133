//! Task use-case service: CRUD, status transitions, progress and logs.
//!
//! # Invariants
//! - `started_at` is stamped on the first transition to `RUNNING` only.
//! - Terminal statuses stamp `completed_at`.
//! - Every status change appends one log line in the same transaction.
//! - Progress `100` completes the task.

use super::{required_text, ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::new_id;
use crate::model::task::{
    LogLevel, NewTask, ProjectTaskItem, Task, TaskDetail, TaskListItem, TaskLog, TaskLogPage,
    TaskPatch, TaskPriority, TaskProgress, TaskStatus,
};
use crate::model::task::Pagination;
use crate::repo::task_repo::{TaskLogQuery, TaskRepository};
use crate::repo::PageRequest;
use log::info;

/// Number of log lines embedded in the task detail view.
pub const DETAIL_LOG_COUNT: u32 = 10;

const TASK_NOT_FOUND: &str = "Task not found";
const PROGRESS_RANGE: &str = "Progress must be a number between 0 and 100";

pub struct TaskService<R: TaskRepository> {
    repo: R,
}

impl<R: TaskRepository> TaskService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_tasks(&self) -> ServiceResult<Vec<TaskListItem>> {
        Ok(self.repo.list_tasks()?)
    }

    /// Tasks of one project with log and child counts.
    pub fn list_project_tasks(&self, project_id: &str) -> ServiceResult<Vec<ProjectTaskItem>> {
        self.require_project(project_id)?;
        Ok(self.repo.list_project_tasks(project_id)?)
    }

    pub fn create_task(&self, input: NewTask) -> ServiceResult<Task> {
        self.require_project(&input.project_id)?;
        let name = required_text(&input.name, "Task name is required")?;
        let progress = validate_progress(input.progress.unwrap_or(0.0))?;
        let now = now_ms();
        let task = Task {
            id: new_id(),
            name,
            description: input.description,
            status: input.status.unwrap_or(TaskStatus::Pending),
            priority: input.priority.unwrap_or(TaskPriority::Medium),
            progress,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            project_id: input.project_id,
            parent_id: input.parent_id,
            schedule_id: input.schedule_id,
        };
        self.repo.create_task(&task)?;
        info!(
            "event=task_create module=service status=ok task_id={} project_id={}",
            task.id, task.project_id
        );
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> ServiceResult<TaskDetail> {
        self.repo
            .get_task_detail(id, DETAIL_LOG_COUNT)?
            .ok_or_else(|| ServiceError::not_found(TASK_NOT_FOUND))
    }

    /// Applies a partial update; absent fields keep their stored value.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> ServiceResult<Task> {
        let mut task = self.require(id)?;
        if let Some(name) = patch.name {
            task.name = required_text(&name, "Task name is required")?;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(progress) = patch.progress {
            task.progress = validate_progress(progress)?;
        }
        if let Some(parent_id) = patch.parent_id {
            if parent_id == task.id {
                return Err(ServiceError::invalid("A task cannot be its own parent"));
            }
            task.parent_id = Some(parent_id);
        }
        if let Some(schedule_id) = patch.schedule_id {
            task.schedule_id = Some(schedule_id);
        }
        task.updated_at = now_ms();
        self.repo.update_task(&task)?;
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> ServiceResult<()> {
        self.repo.delete_task(id)?;
        info!("event=task_delete module=service status=ok task_id={id}");
        Ok(())
    }

    /// Moves the task to `status` (given as its wire text) and logs the change.
    pub fn change_status(&self, id: &str, status: &str) -> ServiceResult<Task> {
        let status = TaskStatus::parse(status).ok_or_else(|| ServiceError::invalid("Invalid status"))?;
        let mut task = self.require(id)?;
        let now = now_ms();

        task.status = status;
        if status == TaskStatus::Running && task.started_at.is_none() {
            task.started_at = Some(now);
        }
        if status.is_terminal() {
            task.completed_at = Some(now);
        }
        task.updated_at = now;

        let level = if status == TaskStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let log = new_log(&task.id, format!("Task status changed to {}", status.as_str()), level, now);
        self.repo.update_task_with_log(&task, &log)?;
        info!(
            "event=task_status module=service status=ok task_id={} task_status={}",
            task.id,
            status.as_str()
        );
        Ok(task)
    }

    pub fn progress(&self, id: &str) -> ServiceResult<TaskProgress> {
        let task = self.require(id)?;
        Ok(TaskProgress::from(&task))
    }

    /// Stores `progress`; reaching 100 completes the task and logs it.
    pub fn set_progress(&self, id: &str, progress: f64) -> ServiceResult<Task> {
        let progress = validate_progress(progress)?;
        let mut task = self.require(id)?;
        let now = now_ms();
        task.progress = progress;
        task.updated_at = now;

        if progress >= 100.0 {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
            let log = new_log(&task.id, "Task completed".to_string(), LogLevel::Info, now);
            self.repo.update_task_with_log(&task, &log)?;
        } else {
            self.repo.update_task(&task)?;
        }
        Ok(task)
    }

    /// Lists logs newest first with optional level filter.
    ///
    /// `level` is the wire text; unknown values are rejected.
    pub fn list_logs(
        &self,
        id: &str,
        level: Option<&str>,
        page: PageRequest,
    ) -> ServiceResult<TaskLogPage> {
        let level = match level.filter(|value| !value.is_empty()) {
            Some(text) => Some(
                LogLevel::parse(text).ok_or_else(|| ServiceError::invalid("Invalid log level"))?,
            ),
            None => None,
        };
        self.require(id)?;

        let (logs, total) = self.repo.list_logs(&TaskLogQuery {
            task_id: id.to_string(),
            level,
            page,
        })?;
        Ok(TaskLogPage {
            logs,
            pagination: Pagination {
                page: page.page(),
                limit: page.limit(),
                total,
                total_pages: page.total_pages(total),
            },
        })
    }

    pub fn add_log(&self, id: &str, message: &str, level: Option<LogLevel>) -> ServiceResult<TaskLog> {
        self.require(id)?;
        if message.trim().is_empty() {
            return Err(ServiceError::invalid("Log message is required"));
        }
        let log = new_log(id, message.to_string(), level.unwrap_or(LogLevel::Info), now_ms());
        self.repo.insert_log(&log)?;
        Ok(log)
    }

    fn require(&self, id: &str) -> ServiceResult<Task> {
        self.repo
            .get_task(id)?
            .ok_or_else(|| ServiceError::not_found(TASK_NOT_FOUND))
    }

    fn require_project(&self, project_id: &str) -> ServiceResult<()> {
        if self.repo.project_exists(project_id)? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Project not found"))
        }
    }
}

pub(crate) fn new_log(task_id: &str, message: String, level: LogLevel, now: i64) -> TaskLog {
    TaskLog {
        id: new_id(),
        message,
        level,
        created_at: now,
        task_id: task_id.to_string(),
    }
}

fn validate_progress(progress: f64) -> ServiceResult<f64> {
    if progress.is_finite() && (0.0..=100.0).contains(&progress) {
        Ok(progress)
    } else {
        Err(ServiceError::invalid(PROGRESS_RANGE))
    }
}
