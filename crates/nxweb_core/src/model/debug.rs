//! Script debugging records: debug projects, history, sessions and
//! captured inspector traffic.
//!
//! # Invariants
//! - Debug project names are unique.
//! - A session's `ended_at` is set exactly when it reaches `STOPPED`.
//! - An inspector request has at most one response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugSessionType {
    Debugger,
    Inspector,
    Profiler,
}

impl DebugSessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debugger => "DEBUGGER",
            Self::Inspector => "INSPECTOR",
            Self::Profiler => "PROFILER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DEBUGGER" => Some(Self::Debugger),
            "INSPECTOR" => Some(Self::Inspector),
            "PROFILER" => Some(Self::Profiler),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugSessionStatus {
    Running,
    Paused,
    Stopped,
}

impl DebugSessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(Self::Running),
            "PAUSED" => Some(Self::Paused),
            "STOPPED" => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugProject {
    pub id: String,
    pub name: String,
    pub script: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Snapshot of a script taken right before it was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptHistory {
    pub id: String,
    pub content: String,
    pub created_at: i64,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSession {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DebugSessionType,
    pub status: DebugSessionStatus,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub data: Option<Value>,
    pub project_id: Option<String>,
}

impl DebugSession {
    /// Builds a `RUNNING` session started at `now`.
    pub fn start(
        kind: DebugSessionType,
        project_id: Option<String>,
        data: Option<Value>,
        now: i64,
    ) -> Self {
        Self {
            id: super::new_id(),
            kind,
            status: DebugSessionStatus::Running,
            started_at: now,
            ended_at: None,
            data,
            project_id,
        }
    }

    /// Marks the session `STOPPED` at `now`.
    pub fn stop(&mut self, now: i64) {
        self.status = DebugSessionStatus::Stopped;
        self.ended_at = Some(now);
    }

    /// Shallow-merges `patch` into the session data.
    pub fn merge_data(&mut self, patch: Value) {
        self.data = Some(super::merge_json(self.data.take(), patch));
    }
}

/// Crawl task submitted as part of a debug run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTask {
    pub id: String,
    pub task_id: String,
    pub project: String,
    pub url: String,
    pub process: Value,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: Option<Value>,
    pub body: Option<String>,
    pub timestamp: i64,
    pub debug_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorResponse {
    pub id: String,
    pub status_code: i64,
    pub headers: Option<Value>,
    pub body: Option<String>,
    pub timestamp: i64,
    pub request_id: String,
    pub debug_session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub status_code: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub url: String,
    pub method: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DebugSessionType,
    pub status: DebugSessionStatus,
    pub started_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorRequestItem {
    #[serde(flatten)]
    pub request: InspectorRequest,
    pub response: Option<ResponseSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorRequestDetail {
    #[serde(flatten)]
    pub request: InspectorRequest,
    pub response: Option<InspectorResponse>,
    pub debug_session: Option<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorResponseItem {
    #[serde(flatten)]
    pub response: InspectorResponse,
    pub request: Option<RequestSummary>,
}

#[cfg(test)]
mod tests {
    use super::{DebugSession, DebugSessionStatus, DebugSessionType};
    use serde_json::json;

    #[test]
    fn session_serializes_kind_as_type() {
        let session = DebugSession::start(DebugSessionType::Profiler, None, Some(json!({})), 42);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["type"], "PROFILER");
        assert_eq!(value["status"], "RUNNING");
        assert_eq!(value["startedAt"], 42);
        assert!(value["endedAt"].is_null());
    }

    #[test]
    fn stop_sets_end_time_and_merge_keeps_existing_keys() {
        let mut session = DebugSession::start(
            DebugSessionType::Profiler,
            None,
            Some(json!({"profilingType": "CPU"})),
            1,
        );
        session.merge_data(json!({"results": {"calls": 3}}));
        session.stop(9);
        assert_eq!(session.status, DebugSessionStatus::Stopped);
        assert_eq!(session.ended_at, Some(9));
        assert_eq!(
            session.data,
            Some(json!({"profilingType": "CPU", "results": {"calls": 3}}))
        );
    }

    #[test]
    fn session_status_parse_roundtrips_text() {
        for status in [
            DebugSessionStatus::Running,
            DebugSessionStatus::Paused,
            DebugSessionStatus::Stopped,
        ] {
            assert_eq!(DebugSessionStatus::parse(status.as_str()), Some(status));
        }
    }
}
