//! Crawl project records.
//!
//! # Invariants
//! - `name` is non-empty after trimming.
//! - `settings` is a free-form JSON object, `{}` when not provided.

use super::task::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a crawl project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    Archived,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "ARCHIVED" => Some(Self::Archived),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub settings: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create request for a project.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub settings: Option<Value>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectCounts {
    pub tasks: u64,
    pub schedules: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectWithCounts {
    #[serde(flatten)]
    pub project: Project,
    #[serde(rename = "_count")]
    pub count: ProjectCounts,
}

/// Task counts keyed by status, zero-filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TaskStatusCounts {
    pub pending: u64,
    pub running: u64,
    pub paused: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl TaskStatusCounts {
    pub fn add(&mut self, status: TaskStatus, count: u64) {
        let slot = match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Paused => &mut self.paused,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Cancelled => &mut self.cancelled,
        };
        *slot += count;
    }
}

/// Aggregate view returned by the project stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project_id: String,
    pub project_name: String,
    pub total_tasks: u64,
    pub task_stats_by_status: TaskStatusCounts,
    pub total_schedules: u64,
    pub active_schedules: u64,
    /// Mean task progress; `0` when the project has no tasks.
    pub overall_progress: f64,
}
