//! HTTP error mapping.
//!
//! # Invariants
//! - Every failure renders as `{"error": message}` with a matching status.
//! - Storage details are logged, never returned to the caller.

use crate::pyspider::PySpiderError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use nxweb_core::ServiceError;
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
    /// Crawler answered with an error or could not be reached.
    BadGateway(String),
    /// Crawler did not answer in time.
    GatewayTimeout(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Internal(message)
            | Self::BadGateway(message)
            | Self::GatewayTimeout(message) => message,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::InvalidInput(message) => Self::BadRequest(message),
            ServiceError::NotFound(message) => Self::NotFound(message),
            ServiceError::Conflict(message) => Self::Conflict(message),
            ServiceError::Repo(err) => {
                error!("event=api_error module=api status=error error_code=storage error={err}");
                Self::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<PySpiderError> for ApiError {
    fn from(value: PySpiderError) -> Self {
        match value {
            PySpiderError::Timeout(_) => Self::GatewayTimeout(value.to_string()),
            other => Self::BadGateway(other.to_string()),
        }
    }
}

/// Failed crawler-backed action: `{success: false, error, details}`.
///
/// Local state has already been reconciled when this is returned.
#[derive(Debug)]
pub struct ActionFailure {
    pub status: StatusCode,
    pub error: &'static str,
    pub details: String,
}

impl ActionFailure {
    pub fn new(error: &'static str, details: impl Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
            details: details.to_string(),
        }
    }

    /// Uses the gateway status that matches the crawler failure.
    pub fn upstream(error: &'static str, err: PySpiderError) -> Self {
        let status = ApiError::from(err.clone()).status();
        Self {
            status,
            error,
            details: err.to_string(),
        }
    }
}

impl IntoResponse for ActionFailure {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.error,
            "details": self.details,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::invalid("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::not_found("gone"), StatusCode::NOT_FOUND),
            (
                ServiceError::Conflict("taken".into()),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn crawler_timeout_is_gateway_timeout() {
        let err = ApiError::from(PySpiderError::Timeout("http://x/".into()));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        let err = ApiError::from(PySpiderError::Unreachable("refused".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
