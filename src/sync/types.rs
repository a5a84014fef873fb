use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Sync-eligible object types. The wire carries free strings so an unknown
/// type degrades to a per-operation error instead of failing the batch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectType {
    Goal,
    Task,
    Project,
    Assistant,
    OnboardingState,
    UserPreferences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// One client-side mutation to replay on the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOp {
    pub object_id: String,
    pub object_type: String,
    pub operation: Operation,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Client-side version counter; informational.
    #[serde(default)]
    pub version: i64,
    /// Optimistic-concurrency guard. Absent means "no version check".
    #[serde(default)]
    pub if_match_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub client_id: String,
    pub operations: Vec<SyncOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Success,
    Conflict,
    Error,
    Resolved,
}

/// Per-operation outcome. Every op in a batch yields exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResult {
    pub object_id: String,
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl OpResult {
    pub fn success(object_id: impl Into<String>, new_version: Option<i64>) -> Self {
        Self {
            object_id: object_id.into(),
            status: OpStatus::Success,
            new_version,
            server_data: None,
            error_message: None,
        }
    }

    pub fn conflict(
        object_id: impl Into<String>,
        server_version: i64,
        server_data: serde_json::Value,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            status: OpStatus::Conflict,
            new_version: Some(server_version),
            server_data: Some(server_data),
            error_message: None,
        }
    }

    pub fn error(object_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            status: OpStatus::Error,
            new_version: None,
            server_data: None,
            error_message: Some(message.into()),
        }
    }
}

/// A row in the versioned-object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedObject {
    pub object_id: String,
    pub object_type: ObjectType,
    #[serde(skip_serializing)]
    pub owner_id: String,
    pub data: serde_json::Value,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaPage {
    pub changes: Vec<VersionedObject>,
    pub current_timestamp: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeStats {
    pub total_objects: i64,
    pub recent_changes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub user_id: String,
    pub sync_timestamp: i64,
    pub object_stats: std::collections::BTreeMap<String, TypeStats>,
}
