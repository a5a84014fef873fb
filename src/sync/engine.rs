use super::store::{SyncStore, now_millis};
use super::types::{
    BatchRequest, DeltaPage, ObjectType, OpResult, OpStatus, Operation, SyncOp, SyncStatus,
};
use crate::error::{EngineError, Result};
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;
use uuid::Uuid;

/// Page limit for the delta feed.
const DELTA_PAGE_LIMIT: usize = 500;
/// Window for "recent changes" in the status report.
const RECENT_WINDOW_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Offline-first batch synchronization over the versioned-object store.
pub struct SyncEngine {
    store: Arc<SyncStore>,
}

impl SyncEngine {
    pub fn new(store: Arc<SyncStore>) -> Self {
        Self { store }
    }

    /// Apply a batch of client operations in listed order. Each operation
    /// yields exactly one result; a conflict or error on one never aborts
    /// the rest.
    pub async fn apply_batch(&self, user_id: &str, request: &BatchRequest) -> Vec<OpResult> {
        let mut results = Vec::with_capacity(request.operations.len());

        for op in &request.operations {
            let result = self.apply_op(user_id, op).await.unwrap_or_else(|error| {
                tracing::warn!(
                    client_id = %request.client_id,
                    object_id = %op.object_id,
                    %error,
                    "sync operation failed"
                );
                OpResult::error(&op.object_id, error.to_string())
            });
            results.push(result);
        }

        results
    }

    async fn apply_op(&self, user_id: &str, op: &SyncOp) -> Result<OpResult> {
        let Ok(object_type) = ObjectType::from_str(&op.object_type) else {
            return Ok(OpResult::error(&op.object_id, "Unknown object type"));
        };

        match op.operation {
            Operation::Create => self.apply_create(user_id, object_type, op).await,
            Operation::Update => self.apply_update(user_id, object_type, op).await,
            Operation::Delete => self.apply_delete(user_id, object_type, op).await,
        }
    }

    async fn apply_create(
        &self,
        user_id: &str,
        object_type: ObjectType,
        op: &SyncOp,
    ) -> Result<OpResult> {
        let object_id = if op.object_id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            op.object_id.clone()
        };

        if self
            .store
            .get(object_type, &object_id, user_id)
            .await?
            .is_some()
        {
            return Ok(OpResult::error(&object_id, "Object already exists"));
        }

        let version = self
            .store
            .insert(object_type, &object_id, user_id, &op.data)
            .await?;

        Ok(OpResult::success(object_id, Some(version)))
    }

    async fn apply_update(
        &self,
        user_id: &str,
        object_type: ObjectType,
        op: &SyncOp,
    ) -> Result<OpResult> {
        let Some(current) = self.store.get(object_type, &op.object_id, user_id).await? else {
            return Ok(OpResult::error(&op.object_id, "Object not found"));
        };

        if let Some(expected) = op.if_match_version
            && expected != current.version
        {
            return Ok(OpResult::conflict(
                &op.object_id,
                current.version,
                current.data,
            ));
        }

        let merged = merge_patch(current.data, &op.data);
        let version = self
            .store
            .write(object_type, &op.object_id, user_id, &merged, current.version)
            .await?;

        Ok(OpResult::success(&op.object_id, Some(version)))
    }

    async fn apply_delete(
        &self,
        user_id: &str,
        object_type: ObjectType,
        op: &SyncOp,
    ) -> Result<OpResult> {
        let Some(current) = self.store.get(object_type, &op.object_id, user_id).await? else {
            return Ok(OpResult::error(&op.object_id, "Object not found"));
        };

        if let Some(expected) = op.if_match_version
            && expected != current.version
        {
            return Ok(OpResult::conflict(
                &op.object_id,
                current.version,
                current.data,
            ));
        }

        self.store
            .delete(object_type, &op.object_id, user_id)
            .await?;

        Ok(OpResult::success(&op.object_id, None))
    }

    /// Everything the caller owns that changed after `since`, ordered by
    /// version. `current_timestamp` is the cursor for the next call.
    pub async fn delta(
        &self,
        user_id: &str,
        since: i64,
        object_types: Option<&[ObjectType]>,
    ) -> Result<DeltaPage> {
        let mut changes = self
            .store
            .changes_since(user_id, since, object_types, DELTA_PAGE_LIMIT)
            .await?;

        let has_more = changes.len() > DELTA_PAGE_LIMIT;
        changes.truncate(DELTA_PAGE_LIMIT);

        let current_timestamp = changes.last().map_or(since, |object| object.version);

        Ok(DeltaPage {
            changes,
            current_timestamp,
            has_more,
        })
    }

    /// Unconditionally install client-merged state and bump the version.
    pub async fn resolve_conflict(
        &self,
        user_id: &str,
        object_id: &str,
        object_type: &str,
        data: &serde_json::Value,
    ) -> Result<OpResult> {
        let object_type = ObjectType::from_str(object_type)
            .map_err(|_| EngineError::Validation(format!("Unknown object type: {object_type}")))?;

        if self
            .store
            .get(object_type, object_id, user_id)
            .await?
            .is_none()
        {
            return Err(EngineError::NotFound(format!(
                "{object_type} {object_id} not found"
            )));
        }

        let version = self
            .store
            .upsert(object_type, object_id, user_id, data)
            .await?;

        Ok(OpResult {
            object_id: object_id.to_string(),
            status: OpStatus::Resolved,
            new_version: Some(version),
            server_data: None,
            error_message: None,
        })
    }

    /// Per-type object counts and a recent-changes window, for observability.
    pub async fn status(&self, user_id: &str) -> Result<SyncStatus> {
        let cutoff = now_millis() - RECENT_WINDOW_MILLIS;
        let mut object_stats = std::collections::BTreeMap::new();

        for object_type in ObjectType::iter() {
            let stats = self.store.stats_for(user_id, object_type, cutoff).await?;
            object_stats.insert(object_type.to_string(), stats);
        }

        Ok(SyncStatus {
            user_id: user_id.to_string(),
            sync_timestamp: now_millis(),
            object_stats,
        })
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }
}

/// Shallow merge of a patch object onto the current data. Non-object patches
/// replace the value outright.
fn merge_patch(current: serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
    match (current, patch) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(base)
        }
        (_, replacement) => replacement.clone(),
    }
}
