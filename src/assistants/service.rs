use super::store::AssistantStore;
use super::types::{
    AssistantPermission, AssistantProfile, AssistantProfileUpdate, NewAssistantProfile,
    PermissionLevel, validate_temperature,
};
use crate::error::{EngineError, Result};
use crate::sync::{ObjectType, SyncStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Assistant-profile CRUD and the permission-scoped sharing model.
///
/// Every mutation bumps the profile version and mirrors the profile into the
/// sync store so the delta feed reflects the change.
pub struct AssistantService {
    store: Arc<AssistantStore>,
    sync: Arc<SyncStore>,
    max_profiles_per_user: u32,
}

impl AssistantService {
    pub fn new(store: Arc<AssistantStore>, sync: Arc<SyncStore>, max_profiles_per_user: u32) -> Self {
        Self {
            store,
            sync,
            max_profiles_per_user,
        }
    }

    pub fn store(&self) -> &Arc<AssistantStore> {
        &self.store
    }

    // ── Profile CRUD ────────────────────────────────────────────────────

    pub async fn create_profile(
        &self,
        user_id: &str,
        new: &NewAssistantProfile,
    ) -> Result<AssistantProfile> {
        validate_new(new)?;

        let owned = self.store.count_owned(user_id).await?;
        if owned >= i64::from(self.max_profiles_per_user) {
            return Err(EngineError::Validation(format!(
                "assistant profile limit reached ({} per user)",
                self.max_profiles_per_user
            )));
        }

        let profile = self.store.create(user_id, new).await?;
        self.mirror(&profile).await;
        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: &str, assistant_id: &str) -> Result<AssistantProfile> {
        let profile = self.load(assistant_id).await?;
        self.require_level(user_id, &profile, PermissionLevel::Read)
            .await?;
        Ok(profile)
    }

    /// Owned, public, and explicitly granted (unexpired) profiles.
    pub async fn list_accessible(&self, user_id: &str) -> Result<Vec<AssistantProfile>> {
        let mut seen = HashSet::new();
        let mut accessible = Vec::new();

        for profile in self
            .store
            .list_owned(user_id)
            .await?
            .into_iter()
            .chain(self.store.list_granted_to(user_id).await?)
            .chain(self.store.list_public().await?)
        {
            if seen.insert(profile.id.clone()) {
                accessible.push(profile);
            }
        }

        Ok(accessible)
    }

    pub async fn default_profile(&self, user_id: &str) -> Result<Option<AssistantProfile>> {
        Ok(self.store.get_default(user_id).await?)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        assistant_id: &str,
        patch: &AssistantProfileUpdate,
    ) -> Result<AssistantProfile> {
        validate_patch(patch)?;

        let profile = self.load(assistant_id).await?;
        self.require_level(user_id, &profile, PermissionLevel::Edit)
            .await?;

        let updated = self.store.update(&profile, patch).await?;
        self.mirror(&updated).await;
        Ok(updated)
    }

    pub async fn delete_profile(&self, user_id: &str, assistant_id: &str) -> Result<()> {
        let profile = self.load(assistant_id).await?;
        if profile.owner_id != user_id {
            return Err(EngineError::InsufficientPermission(
                "only the owner can delete an assistant".to_string(),
            ));
        }

        self.store.delete(assistant_id).await?;
        if let Err(error) = self
            .sync
            .delete(ObjectType::Assistant, assistant_id, &profile.owner_id)
            .await
        {
            tracing::warn!(%error, assistant_id, "failed to remove assistant from sync feed");
        }
        Ok(())
    }

    /// `(assistant_id, version)` pairs over the caller's accessible profiles.
    pub async fn versions(
        &self,
        user_id: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<(String, i64)>> {
        let accessible = self.list_accessible(user_id).await?;
        Ok(self.store.versions(&accessible, ids))
    }

    // ── Permission model ────────────────────────────────────────────────

    /// Effective level: ownership beats grants, grants beat public read.
    pub async fn get_level(
        &self,
        user_id: &str,
        assistant_id: &str,
    ) -> Result<Option<PermissionLevel>> {
        let profile = self.load(assistant_id).await?;
        self.effective_level(user_id, &profile).await
    }

    pub async fn check(
        &self,
        user_id: &str,
        assistant_id: &str,
        required: PermissionLevel,
    ) -> Result<bool> {
        let profile = self.load(assistant_id).await?;
        Ok(self
            .effective_level(user_id, &profile)
            .await?
            .is_some_and(|level| level >= required))
    }

    /// Grant `level` on an assistant to `target_user_id`.
    ///
    /// The granter must hold admin, and may not grant a level above their
    /// own. A prior grant for the pair is overwritten.
    pub async fn share(
        &self,
        assistant_id: &str,
        target_user_id: &str,
        level: PermissionLevel,
        granted_by: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AssistantPermission> {
        let profile = self.load(assistant_id).await?;

        let granter_level = self
            .effective_level(granted_by, &profile)
            .await?
            .unwrap_or(PermissionLevel::Read);
        if granter_level < PermissionLevel::Admin {
            return Err(EngineError::InsufficientPermission(
                "Insufficient permissions to share this assistant".to_string(),
            ));
        }
        if level > granter_level {
            return Err(EngineError::InsufficientPermission(
                "Cannot grant higher permission than your own".to_string(),
            ));
        }

        let permission = AssistantPermission {
            assistant_id: assistant_id.to_string(),
            grantee_user_id: target_user_id.to_string(),
            level,
            granted_by: granted_by.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        self.store.upsert_permission(&permission).await?;
        self.touch_and_mirror(&profile).await?;

        tracing::info!(
            assistant_id,
            target = target_user_id,
            level = %level,
            granted_by,
            "assistant shared"
        );
        Ok(permission)
    }

    pub async fn revoke(
        &self,
        assistant_id: &str,
        target_user_id: &str,
        revoked_by: &str,
    ) -> Result<bool> {
        let profile = self.load(assistant_id).await?;
        self.require_level(revoked_by, &profile, PermissionLevel::Admin)
            .await?;

        let removed = self
            .store
            .delete_permission(assistant_id, target_user_id)
            .await?;
        if removed {
            self.touch_and_mirror(&profile).await?;
        }
        Ok(removed)
    }

    /// The grant table for an assistant; requires admin.
    pub async fn list_permissions(
        &self,
        user_id: &str,
        assistant_id: &str,
    ) -> Result<Vec<AssistantPermission>> {
        let profile = self.load(assistant_id).await?;
        self.require_level(user_id, &profile, PermissionLevel::Admin)
            .await?;
        Ok(self.store.list_permissions(assistant_id).await?)
    }

    pub async fn sweep_expired(&self) -> Result<u64> {
        Ok(self.store.sweep_expired().await?)
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn load(&self, assistant_id: &str) -> Result<AssistantProfile> {
        self.store
            .get(assistant_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("assistant {assistant_id} not found")))
    }

    async fn effective_level(
        &self,
        user_id: &str,
        profile: &AssistantProfile,
    ) -> Result<Option<PermissionLevel>> {
        if profile.owner_id == user_id {
            return Ok(Some(PermissionLevel::Owner));
        }

        if let Some(grant) = self.store.get_permission(&profile.id, user_id).await?
            && grant.is_effective(Utc::now())
        {
            return Ok(Some(grant.level));
        }

        if profile.is_public {
            return Ok(Some(PermissionLevel::Read));
        }

        Ok(None)
    }

    async fn require_level(
        &self,
        user_id: &str,
        profile: &AssistantProfile,
        required: PermissionLevel,
    ) -> Result<()> {
        let held = self.effective_level(user_id, profile).await?;
        if held.is_some_and(|level| level >= required) {
            Ok(())
        } else {
            Err(EngineError::InsufficientPermission(format!(
                "{required} access required on assistant {}",
                profile.id
            )))
        }
    }

    async fn touch_and_mirror(&self, profile: &AssistantProfile) -> Result<()> {
        let version = self.store.touch(profile).await?;
        let mut bumped = profile.clone();
        bumped.version = version;
        self.mirror(&bumped).await;
        Ok(())
    }

    async fn mirror(&self, profile: &AssistantProfile) {
        let data = match serde_json::to_value(profile) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize profile for sync mirror");
                return;
            }
        };
        if let Err(error) = self
            .sync
            .upsert(ObjectType::Assistant, &profile.id, &profile.owner_id, &data)
            .await
        {
            tracing::warn!(%error, assistant_id = %profile.id, "sync mirror failed");
        }
    }
}

fn validate_new(new: &NewAssistantProfile) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "assistant name must not be empty".to_string(),
        ));
    }
    new.style.validate().map_err(EngineError::Validation)?;
    validate_temperature("dialogue_temperature", new.dialogue_temperature)
        .map_err(EngineError::Validation)?;
    validate_temperature("intent_temperature", new.intent_temperature)
        .map_err(EngineError::Validation)?;
    Ok(())
}

fn validate_patch(patch: &AssistantProfileUpdate) -> Result<()> {
    if let Some(name) = &patch.name
        && name.trim().is_empty()
    {
        return Err(EngineError::Validation(
            "assistant name must not be empty".to_string(),
        ));
    }
    if let Some(style) = &patch.style {
        style.validate().map_err(EngineError::Validation)?;
    }
    if let Some(temperature) = patch.dialogue_temperature {
        validate_temperature("dialogue_temperature", temperature)
            .map_err(EngineError::Validation)?;
    }
    if let Some(temperature) = patch.intent_temperature {
        validate_temperature("intent_temperature", temperature).map_err(EngineError::Validation)?;
    }
    Ok(())
}
