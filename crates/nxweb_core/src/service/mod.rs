//! Dashboard use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own input validation and state transition rules.
//! - Keep the HTTP layer decoupled from storage details.

use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod debug_service;
pub mod inspector_service;
pub mod project_service;
pub mod schedule_service;
pub mod task_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for dashboard use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Caller input failed validation.
    InvalidInput(String),
    /// Target record does not exist.
    NotFound(String),
    /// Write would violate a uniqueness rule.
    Conflict(String),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "{message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, .. } => Self::NotFound(not_found_message(entity)),
            RepoError::Validation(message) => Self::InvalidInput(message),
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

/// `"Project not found"`-style message for an entity label.
pub(crate) fn not_found_message(entity: &str) -> String {
    let mut chars = entity.chars();
    match chars.next() {
        Some(first) => format!("{}{} not found", first.to_uppercase(), chars.as_str()),
        None => "Not found".to_string(),
    }
}

/// Trims and rejects blank required text.
pub(crate) fn required_text(value: &str, message: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(message));
    }
    Ok(trimmed.to_string())
}
