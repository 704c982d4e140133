//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Update/delete of a missing row reports `RepoError::NotFound`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use rusqlite::Row;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod debug_repo;
pub mod inspector_repo;
pub mod project_repo;
pub mod schedule_repo;
pub mod task_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every persistence area.
#[derive(Debug)]
pub enum RepoError {
    Validation(String),
    Db(DbError),
    NotFound { entity: &'static str, id: String },
    Conflict(String),
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Shared page/limit normalization for list endpoints.
///
/// Only built through [`PageRequest::new`], so `page >= 1` and
/// `1 <= limit <= MAX_LIMIT` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    /// Page defaults to 1 (min 1); limit defaults to 50 and is clamped to `1..=500`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        let limit = limit
            .unwrap_or(i64::from(Self::DEFAULT_LIMIT))
            .clamp(1, i64::from(Self::MAX_LIMIT)) as u32;
        Self { page, limit }
    }

    /// First page of `limit` rows.
    pub fn first(limit: u32) -> Self {
        Self::new(None, Some(i64::from(limit)))
    }

    pub fn page(self) -> u32 {
        self.page
    }

    pub fn limit(self) -> u32 {
        self.limit
    }

    pub fn offset(self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    pub fn total_pages(self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Maps SQLite constraint failures to `RepoError::Validation`.
pub(crate) fn constraint_as_validation(err: rusqlite::Error, message: &str) -> RepoError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RepoError::Validation(message.to_string())
        }
        other => other.into(),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

/// Reads a text column and maps it through an enum parser.
pub(crate) fn parse_enum_column<T>(
    row: &Row<'_>,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> RepoResult<T> {
    let text: String = row.get(column)?;
    parse(&text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid value `{text}` in {column}")))
}

/// Reads a nullable JSON text column.
pub(crate) fn parse_json_column(row: &Row<'_>, column: &str) -> RepoResult<Option<Value>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}"))),
        None => Ok(None),
    }
}

pub(crate) fn json_to_db(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn count_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
