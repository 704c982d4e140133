//! Async access to the synchronous SQLite services.
//!
//! # Responsibility
//! - Own the single dashboard connection.
//! - Run service calls on the blocking pool so handlers never block the runtime.
//!
//! # Invariants
//! - At most one service call touches the connection at a time.

use crate::error::{ApiError, ApiResult};
use nxweb_core::db::{open_db, open_db_in_memory, DbResult};
use nxweb_core::repo::debug_repo::SqliteDebugRepository;
use nxweb_core::repo::inspector_repo::SqliteInspectorRepository;
use nxweb_core::repo::project_repo::SqliteProjectRepository;
use nxweb_core::repo::schedule_repo::SqliteScheduleRepository;
use nxweb_core::repo::task_repo::SqliteTaskRepository;
use nxweb_core::{
    DebugService, InspectorService, ProjectService, ScheduleService, ServiceResult, TaskService,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Connection) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ApiError::internal("database lock poisoned"))?;
            f(&guard).map_err(ApiError::from)
        })
        .await
        .map_err(|err| ApiError::internal(format!("database task failed: {err}")))?
    }

    pub async fn projects<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&ProjectService<SqliteProjectRepository<'_>>) -> ServiceResult<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        self.call(move |conn| f(&ProjectService::new(SqliteProjectRepository::new(conn))))
            .await
    }

    pub async fn tasks<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&TaskService<SqliteTaskRepository<'_>>) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.call(move |conn| f(&TaskService::new(SqliteTaskRepository::new(conn))))
            .await
    }

    pub async fn schedules<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&ScheduleService<SqliteScheduleRepository<'_>>) -> ServiceResult<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        self.call(move |conn| f(&ScheduleService::new(SqliteScheduleRepository::new(conn))))
            .await
    }

    pub async fn debug<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&DebugService<SqliteDebugRepository<'_>>) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.call(move |conn| f(&DebugService::new(SqliteDebugRepository::new(conn))))
            .await
    }

    pub async fn inspector<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&InspectorService<SqliteInspectorRepository<'_>>) -> ServiceResult<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        self.call(move |conn| {
            f(&InspectorService::new(SqliteInspectorRepository::new(conn)))
        })
        .await
    }
}
