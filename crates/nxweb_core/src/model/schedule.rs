//! Crawl schedule records.
//!
//! # Invariants
//! - `cron`, when present, has exactly five whitespace-separated fields.
//! - `next_run` is null for inactive schedules and for schedules without cron.

use super::task::{TaskPriority, TaskStatus};
use super::NamedRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cron: Option<String>,
    pub active: bool,
    pub next_run: Option<i64>,
    pub last_run: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub project_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchedule {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub cron: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub project_id: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleCounts {
    pub tasks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleListItem {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub project: NamedRef,
    #[serde(rename = "_count")]
    pub count: ScheduleCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleTaskRef {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleDetail {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub project: NamedRef,
    pub tasks: Vec<ScheduleTaskRef>,
}
