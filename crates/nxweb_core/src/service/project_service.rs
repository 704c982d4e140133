//! Project use-case service.
//!
//! # Invariants
//! - Project names are non-blank.
//! - `settings` defaults to `{}` and must be a JSON object.

use super::{required_text, ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::new_id;
use crate::model::project::{
    NewProject, Project, ProjectPatch, ProjectStats, ProjectStatus, ProjectWithCounts,
};
use crate::repo::project_repo::ProjectRepository;
use log::info;
use serde_json::Value;

const NAME_REQUIRED: &str = "Project name is required";
const PROJECT_NOT_FOUND: &str = "Project not found";

pub struct ProjectService<R: ProjectRepository> {
    repo: R,
}

impl<R: ProjectRepository> ProjectService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_projects(&self) -> ServiceResult<Vec<Project>> {
        Ok(self.repo.list_projects()?)
    }

    /// Loads one project with its task and schedule counts.
    pub fn get_project(&self, id: &str) -> ServiceResult<ProjectWithCounts> {
        let project = self.require(id)?;
        let count = self.repo.project_counts(id)?;
        Ok(ProjectWithCounts { project, count })
    }

    pub fn create_project(&self, input: NewProject) -> ServiceResult<Project> {
        let name = required_text(&input.name, NAME_REQUIRED)?;
        let settings = normalize_settings(input.settings)?;
        let now = now_ms();
        let project = Project {
            id: new_id(),
            name,
            description: input.description,
            status: input.status.unwrap_or(ProjectStatus::Active),
            settings,
            created_at: now,
            updated_at: now,
        };
        self.repo.create_project(&project)?;
        info!(
            "event=project_create module=service status=ok project_id={}",
            project.id
        );
        Ok(project)
    }

    /// Applies a partial update; absent fields keep their stored value.
    pub fn update_project(&self, id: &str, patch: ProjectPatch) -> ServiceResult<Project> {
        let mut project = self.require(id)?;
        if let Some(name) = patch.name {
            project.name = required_text(&name, NAME_REQUIRED)?;
        }
        if let Some(description) = patch.description {
            project.description = Some(description);
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if patch.settings.is_some() {
            project.settings = normalize_settings(patch.settings)?;
        }
        project.updated_at = now_ms();
        self.repo.update_project(&project)?;
        Ok(project)
    }

    /// Deletes the project and, through cascades, its tasks and schedules.
    pub fn delete_project(&self, id: &str) -> ServiceResult<()> {
        self.repo.delete_project(id)?;
        info!("event=project_delete module=service status=ok project_id={id}");
        Ok(())
    }

    pub fn project_stats(&self, id: &str) -> ServiceResult<ProjectStats> {
        let project = self.require(id)?;
        let task_stats_by_status = self.repo.task_status_counts(id)?;
        let schedules = self.repo.schedule_totals(id)?;
        let counts = self.repo.project_counts(id)?;

        Ok(ProjectStats {
            project_id: project.id,
            project_name: project.name,
            total_tasks: counts.tasks,
            task_stats_by_status,
            total_schedules: schedules.total,
            active_schedules: schedules.active,
            overall_progress: self.repo.mean_task_progress(id)?,
        })
    }

    fn require(&self, id: &str) -> ServiceResult<Project> {
        self.repo
            .get_project(id)?
            .ok_or_else(|| ServiceError::not_found(PROJECT_NOT_FOUND))
    }
}

fn normalize_settings(settings: Option<Value>) -> ServiceResult<Value> {
    match settings {
        None | Some(Value::Null) => Ok(Value::Object(Default::default())),
        Some(Value::Object(map)) => Ok(Value::Object(map)),
        Some(_) => Err(ServiceError::invalid("Project settings must be a JSON object")),
    }
}
