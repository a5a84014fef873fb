use crate::error::Result;
use crate::intent::types::EntityMap;
use crate::prompts::ConversationContext;
use crate::sync::{ObjectType, SyncStore};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Domain mutations the action dispatcher can execute. The conversation
/// engine only ever passes `(user_id, entities)` through this seam; what a
/// goal or task *is* stays on the other side of it.
#[async_trait]
pub trait DomainService: Send + Sync {
    async fn create_goal(&self, user_id: &str, entities: &EntityMap) -> Result<serde_json::Value>;
    async fn create_task(&self, user_id: &str, entities: &EntityMap) -> Result<serde_json::Value>;
    async fn create_project(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value>;
    async fn update_settings(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value>;
    async fn rate_life_area(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value>;

    /// Context used to sharpen intent classification: recent activity,
    /// stored preferences, and the user's life areas.
    async fn user_context(&self, user_id: &str) -> Result<ConversationContext>;
}

/// Domain service writing through the versioned-object store, so every
/// mutation lands in the sync delta feed.
pub struct SyncBackedDomainService {
    store: Arc<SyncStore>,
}

impl SyncBackedDomainService {
    pub fn new(store: Arc<SyncStore>) -> Self {
        Self { store }
    }

    async fn create_object(
        &self,
        user_id: &str,
        object_type: ObjectType,
        entities: &EntityMap,
    ) -> Result<serde_json::Value> {
        let object_id = Uuid::new_v4().to_string();

        let mut data = serde_json::Map::new();
        data.insert("status".into(), "active".into());
        for key in ["title", "due_date", "priority", "duration", "life_area"] {
            if let Some(value) = entities.get(key) {
                data.insert(key.into(), value.clone());
            }
        }

        let version = self
            .store
            .insert(object_type, &object_id, user_id, &data.clone().into())
            .await?;

        Ok(serde_json::json!({
            "id": object_id,
            "object_type": object_type,
            "title": data.get("title").cloned().unwrap_or_default(),
            "version": version,
        }))
    }

    /// The per-user preferences singleton is keyed by the user id itself.
    async fn patch_preferences(
        &self,
        user_id: &str,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut data = self
            .store
            .get(ObjectType::UserPreferences, user_id, user_id)
            .await?
            .map(|object| object.data)
            .unwrap_or_else(|| serde_json::json!({}));

        if let (Some(base), Some(overlay)) = (data.as_object_mut(), patch.as_object()) {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
        }

        let version = self
            .store
            .upsert(ObjectType::UserPreferences, user_id, user_id, &data)
            .await?;

        Ok(serde_json::json!({
            "id": user_id,
            "object_type": ObjectType::UserPreferences,
            "version": version,
        }))
    }
}

#[async_trait]
impl DomainService for SyncBackedDomainService {
    async fn create_goal(&self, user_id: &str, entities: &EntityMap) -> Result<serde_json::Value> {
        self.create_object(user_id, ObjectType::Goal, entities).await
    }

    async fn create_task(&self, user_id: &str, entities: &EntityMap) -> Result<serde_json::Value> {
        self.create_object(user_id, ObjectType::Task, entities).await
    }

    async fn create_project(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value> {
        self.create_object(user_id, ObjectType::Project, entities)
            .await
    }

    async fn update_settings(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value> {
        let settings = entities
            .get("settings")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(entities.clone()));
        self.patch_preferences(user_id, serde_json::json!({"settings": settings}))
            .await
    }

    async fn rate_life_area(
        &self,
        user_id: &str,
        entities: &EntityMap,
    ) -> Result<serde_json::Value> {
        let area = entities
            .get("life_area")
            .and_then(|v| v.as_str())
            .unwrap_or("Personal")
            .to_string();
        let rating = entities
            .get("rating")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let mut data = self
            .store
            .get(ObjectType::UserPreferences, user_id, user_id)
            .await?
            .map(|object| object.data)
            .unwrap_or_else(|| serde_json::json!({}));

        let ratings = data
            .as_object_mut()
            .map(|base| {
                base.entry("life_area_ratings")
                    .or_insert_with(|| serde_json::json!({}))
            })
            .and_then(|v| v.as_object_mut());
        if let Some(ratings) = ratings {
            ratings.insert(area, rating);
        }

        let version = self
            .store
            .upsert(ObjectType::UserPreferences, user_id, user_id, &data)
            .await?;

        Ok(serde_json::json!({
            "id": user_id,
            "object_type": ObjectType::UserPreferences,
            "version": version,
        }))
    }

    async fn user_context(&self, user_id: &str) -> Result<ConversationContext> {
        let recent = self.store.recent_for_owner(user_id, 5).await?;

        let recent_activity = recent
            .iter()
            .map(|object| {
                let label = object
                    .data
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or(&object.object_id);
                format!("{}: {label}", object.object_type)
            })
            .collect();

        let preferences = self
            .store
            .get(ObjectType::UserPreferences, user_id, user_id)
            .await?
            .map(|object| object.data)
            .unwrap_or_else(|| serde_json::json!({}));

        let life_areas = preferences
            .get("life_areas")
            .and_then(|v| v.as_array())
            .map(|areas| {
                areas
                    .iter()
                    .filter_map(|a| a.as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ConversationContext {
            recent_activity,
            preferences,
            life_areas,
        })
    }
}
