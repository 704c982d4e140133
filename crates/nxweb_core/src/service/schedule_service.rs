//! Schedule use-case service.
//!
//! # Invariants
//! - Cron text, when present, has exactly five whitespace-separated fields.
//!   Fields are not interpreted further.
//! - `next_run` is a fixed offset from "now"; no cron evaluation happens.
//! - A manual run restarts every attached task in one transaction.

use super::task_service::new_log;
use super::{required_text, ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::new_id;
use crate::model::schedule::{
    NewSchedule, Schedule, ScheduleDetail, ScheduleListItem, SchedulePatch,
};
use crate::model::task::{LogLevel, Task, TaskStatus};
use crate::repo::schedule_repo::ScheduleRepository;
use log::info;
use serde::Serialize;

/// Placeholder distance between "now" and the next run.
pub const NEXT_RUN_OFFSET_MS: i64 = 5 * 60 * 1000;

const SCHEDULE_NOT_FOUND: &str = "Schedule not found";
const RUN_LOG_MESSAGE: &str = "Task started by manual schedule execution";

/// Result of a manual schedule run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRunResult {
    pub success: bool,
    pub message: String,
    pub tasks: Vec<Task>,
}

pub struct ScheduleService<R: ScheduleRepository> {
    repo: R,
}

impl<R: ScheduleRepository> ScheduleService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_schedules(&self) -> ServiceResult<Vec<ScheduleListItem>> {
        Ok(self.repo.list_schedules()?)
    }

    pub fn get_schedule(&self, id: &str) -> ServiceResult<ScheduleDetail> {
        self.repo
            .get_schedule_detail(id)?
            .ok_or_else(|| ServiceError::not_found(SCHEDULE_NOT_FOUND))
    }

    pub fn create_schedule(&self, input: NewSchedule) -> ServiceResult<Schedule> {
        if !self.repo.project_exists(&input.project_id)? {
            return Err(ServiceError::not_found("Project not found"));
        }
        let cron = normalize_cron(input.cron)?;
        let name = required_text(&input.name, "Schedule name is required")?;
        let now = now_ms();
        let active = input.active.unwrap_or(true);
        let schedule = Schedule {
            id: new_id(),
            name,
            description: input.description,
            next_run: next_run_for(cron.as_deref(), now),
            cron,
            active,
            last_run: None,
            created_at: now,
            updated_at: now,
            project_id: input.project_id,
        };
        self.repo.create_schedule(&schedule)?;
        info!(
            "event=schedule_create module=service status=ok schedule_id={} project_id={}",
            schedule.id, schedule.project_id
        );
        Ok(schedule)
    }

    /// Applies a partial update.
    ///
    /// Supplying cron recomputes `next_run` unless the same update
    /// deactivates the schedule; deactivation clears `next_run`.
    pub fn update_schedule(&self, id: &str, patch: SchedulePatch) -> ServiceResult<Schedule> {
        let cron = normalize_cron(patch.cron)?;
        let mut schedule = self.require(id)?;
        let now = now_ms();

        if let Some(name) = patch.name {
            schedule.name = required_text(&name, "Schedule name is required")?;
        }
        if let Some(description) = patch.description {
            schedule.description = Some(description);
        }
        if let Some(active) = patch.active {
            schedule.active = active;
        }
        if let Some(cron) = cron {
            if patch.active != Some(false) {
                schedule.next_run = Some(now + NEXT_RUN_OFFSET_MS);
            }
            schedule.cron = Some(cron);
        }
        if patch.active == Some(false) {
            schedule.next_run = None;
        }
        schedule.updated_at = now;
        self.repo.update_schedule(&schedule)?;
        Ok(schedule)
    }

    pub fn delete_schedule(&self, id: &str) -> ServiceResult<()> {
        self.repo.delete_schedule(id)?;
        info!("event=schedule_delete module=service status=ok schedule_id={id}");
        Ok(())
    }

    pub fn activate(&self, id: &str) -> ServiceResult<Schedule> {
        let mut schedule = self.require(id)?;
        let now = now_ms();
        schedule.active = true;
        schedule.next_run = next_run_for(schedule.cron.as_deref(), now);
        schedule.updated_at = now;
        self.repo.update_schedule(&schedule)?;
        Ok(schedule)
    }

    pub fn deactivate(&self, id: &str) -> ServiceResult<Schedule> {
        let mut schedule = self.require(id)?;
        schedule.active = false;
        schedule.next_run = None;
        schedule.updated_at = now_ms();
        self.repo.update_schedule(&schedule)?;
        Ok(schedule)
    }

    /// Records `last_run` and starts every task attached to the schedule.
    pub fn run(&self, id: &str) -> ServiceResult<ScheduleRunResult> {
        let mut schedule = self.require(id)?;
        let now = now_ms();
        schedule.last_run = Some(now);
        schedule.updated_at = now;

        let mut tasks = self.repo.list_schedule_tasks(id)?;
        let mut logs = Vec::with_capacity(tasks.len());
        for task in &mut tasks {
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            task.progress = 0.0;
            task.updated_at = now;
            logs.push(new_log(&task.id, RUN_LOG_MESSAGE.to_string(), LogLevel::Info, now));
        }

        self.repo.record_run(&schedule, &tasks, &logs)?;
        info!(
            "event=schedule_run module=service status=ok schedule_id={id} started_tasks={}",
            tasks.len()
        );
        Ok(ScheduleRunResult {
            success: true,
            message: format!("Started {} tasks", tasks.len()),
            tasks,
        })
    }

    fn require(&self, id: &str) -> ServiceResult<Schedule> {
        self.repo
            .get_schedule(id)?
            .ok_or_else(|| ServiceError::not_found(SCHEDULE_NOT_FOUND))
    }
}

/// Validates cron text; blank input counts as "no cron".
pub fn normalize_cron(cron: Option<String>) -> ServiceResult<Option<String>> {
    match cron {
        Some(text) if !text.trim().is_empty() => {
            if text.split_whitespace().count() != 5 {
                return Err(ServiceError::invalid("Invalid cron expression"));
            }
            Ok(Some(text.trim().to_string()))
        }
        _ => Ok(None),
    }
}

fn next_run_for(cron: Option<&str>, now: i64) -> Option<i64> {
    cron.map(|_| now + NEXT_RUN_OFFSET_MS)
}
