//! Dashboard domain model.
//!
//! # Responsibility
//! - Define records persisted by the dashboard and their JSON shapes.
//! - Define the closed status/priority/level vocabularies.
//!
//! # Invariants
//! - Every record is identified by a UUID v4 string that is never reused.
//! - Timestamps are Unix epoch milliseconds.
//! - Records serialize camelCase; enum values serialize SCREAMING_CASE.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod debug;
pub mod project;
pub mod schedule;
pub mod task;

/// Generates a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `{id, name}` reference embedded in list and detail views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// Shallow JSON object merge used for session `data` updates.
///
/// Keys of `patch` win. A non-object base is replaced by the patch.
pub fn merge_json(base: Option<serde_json::Value>, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (Some(serde_json::Value::Object(mut base)), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, patch) => patch,
    }
}
