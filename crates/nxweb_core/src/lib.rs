//! Core domain logic for the NxWeb crawl dashboard.
//! This crate is the single source of truth for persistence and business rules.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use db::{now_ms, open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::{PageRequest, RepoError, RepoResult};
pub use service::debug_service::DebugService;
pub use service::inspector_service::InspectorService;
pub use service::project_service::ProjectService;
pub use service::schedule_service::ScheduleService;
pub use service::task_service::TaskService;
pub use service::{ServiceError, ServiceResult};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
