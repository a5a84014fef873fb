use super::types::{
    AssistantPermission, AssistantProfile, AssistantProfileUpdate, NewAssistantProfile,
    PermissionLevel, StyleTraits,
};
use crate::sync::next_version;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS assistant_profiles (
    id                    TEXT PRIMARY KEY,
    owner_id              TEXT NOT NULL,
    name                  TEXT NOT NULL,
    description           TEXT,
    language              TEXT NOT NULL DEFAULT 'en',
    ai_model              TEXT NOT NULL,
    style                 TEXT NOT NULL,
    dialogue_temperature  REAL NOT NULL,
    intent_temperature    REAL NOT NULL,
    custom_instructions   TEXT,
    requires_confirmation INTEGER NOT NULL DEFAULT 1,
    is_default            INTEGER NOT NULL DEFAULT 0,
    is_public             INTEGER NOT NULL DEFAULT 0,
    version               INTEGER NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_assistants_owner ON assistant_profiles(owner_id);

CREATE TABLE IF NOT EXISTS assistant_permissions (
    assistant_id    TEXT NOT NULL REFERENCES assistant_profiles(id) ON DELETE CASCADE,
    grantee_user_id TEXT NOT NULL,
    level           TEXT NOT NULL,
    granted_by      TEXT NOT NULL,
    expires_at      TEXT,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (assistant_id, grantee_user_id)
);
CREATE INDEX IF NOT EXISTS idx_permissions_grantee ON assistant_permissions(grantee_user_id);
";

pub struct AssistantStore {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in {column}: {raw}"))
}

fn map_profile_row(row: &SqliteRow) -> Result<AssistantProfile> {
    let style_raw: String = row.try_get("style")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;
    let requires_confirmation: i64 = row.try_get("requires_confirmation")?;
    let is_default: i64 = row.try_get("is_default")?;
    let is_public: i64 = row.try_get("is_public")?;

    Ok(AssistantProfile {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        language: row.try_get("language")?,
        ai_model: row.try_get("ai_model")?,
        style: serde_json::from_str::<StyleTraits>(&style_raw).context("corrupt style traits")?,
        dialogue_temperature: row.try_get("dialogue_temperature")?,
        intent_temperature: row.try_get("intent_temperature")?,
        custom_instructions: row.try_get("custom_instructions")?,
        requires_confirmation: requires_confirmation != 0,
        is_default: is_default != 0,
        is_public: is_public != 0,
        version: row.try_get("version")?,
        created_at: parse_timestamp(&created_raw, "created_at")?,
        updated_at: parse_timestamp(&updated_raw, "updated_at")?,
    })
}

fn map_permission_row(row: &SqliteRow) -> Result<AssistantPermission> {
    let level_raw: String = row.try_get("level")?;
    let created_raw: String = row.try_get("created_at")?;
    let expires_raw: Option<String> = row.try_get("expires_at")?;

    Ok(AssistantPermission {
        assistant_id: row.try_get("assistant_id")?,
        grantee_user_id: row.try_get("grantee_user_id")?,
        level: PermissionLevel::from_str(&level_raw)
            .with_context(|| format!("unknown permission level: {level_raw}"))?,
        granted_by: row.try_get("granted_by")?,
        expires_at: expires_raw
            .map(|raw| parse_timestamp(&raw, "expires_at"))
            .transpose()?,
        created_at: parse_timestamp(&created_raw, "created_at")?,
    })
}

impl AssistantStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("create assistant schema")?;
        Ok(Self { pool })
    }

    // ── Profiles ────────────────────────────────────────────────────────

    pub async fn count_owned(&self, owner_id: &str) -> Result<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM assistant_profiles WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await
                .context("count assistant profiles")?;
        Ok(row.try_get("n")?)
    }

    /// Insert a new profile. Default flags are reconciled in the same
    /// transaction: the owner's first profile becomes the default, and an
    /// explicit new default clears the previous one.
    pub async fn create(
        &self,
        owner_id: &str,
        new: &NewAssistantProfile,
    ) -> Result<AssistantProfile> {
        let mut tx = self.pool.begin().await.context("begin create profile")?;

        let owned: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM assistant_profiles WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&mut *tx)
                .await
                .context("count profiles in tx")?
                .try_get("n")?;

        let is_default = new.is_default || owned == 0;
        if is_default {
            sqlx::query(
                "UPDATE assistant_profiles SET is_default = 0 WHERE owner_id = $1",
            )
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("clear previous default")?;
        }

        let profile = AssistantProfile {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: new.name.clone(),
            description: new.description.clone(),
            language: new.language.clone(),
            ai_model: new.ai_model.clone(),
            style: new.style,
            dialogue_temperature: new.dialogue_temperature,
            intent_temperature: new.intent_temperature,
            custom_instructions: new.custom_instructions.clone(),
            requires_confirmation: new.requires_confirmation,
            is_default,
            is_public: new.is_public,
            version: next_version(None),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO assistant_profiles
                 (id, owner_id, name, description, language, ai_model, style,
                  dialogue_temperature, intent_temperature, custom_instructions,
                  requires_confirmation, is_default, is_public, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(&profile.id)
        .bind(&profile.owner_id)
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(&profile.language)
        .bind(&profile.ai_model)
        .bind(serde_json::to_string(&profile.style)?)
        .bind(profile.dialogue_temperature)
        .bind(profile.intent_temperature)
        .bind(&profile.custom_instructions)
        .bind(i64::from(profile.requires_confirmation))
        .bind(i64::from(profile.is_default))
        .bind(i64::from(profile.is_public))
        .bind(profile.version)
        .bind(profile.created_at.to_rfc3339())
        .bind(profile.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("insert assistant profile")?;

        tx.commit().await.context("commit create profile")?;
        Ok(profile)
    }

    pub async fn get(&self, assistant_id: &str) -> Result<Option<AssistantProfile>> {
        let row = sqlx::query("SELECT * FROM assistant_profiles WHERE id = $1")
            .bind(assistant_id)
            .fetch_optional(&self.pool)
            .await
            .context("load assistant profile")?;

        row.as_ref().map(map_profile_row).transpose()
    }

    pub async fn list_owned(&self, owner_id: &str) -> Result<Vec<AssistantProfile>> {
        let rows = sqlx::query(
            "SELECT * FROM assistant_profiles
             WHERE owner_id = $1
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("list owned profiles")?;

        rows.iter().map(map_profile_row).collect()
    }

    pub async fn get_default(&self, owner_id: &str) -> Result<Option<AssistantProfile>> {
        let row = sqlx::query(
            "SELECT * FROM assistant_profiles WHERE owner_id = $1 AND is_default = 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("load default profile")?;

        row.as_ref().map(map_profile_row).transpose()
    }

    pub async fn list_public(&self) -> Result<Vec<AssistantProfile>> {
        let rows = sqlx::query(
            "SELECT * FROM assistant_profiles WHERE is_public = 1 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("list public profiles")?;

        rows.iter().map(map_profile_row).collect()
    }

    /// Apply a partial update, bumping the version. Setting `is_default`
    /// clears the owner's previous default in the same transaction.
    pub async fn update(
        &self,
        current: &AssistantProfile,
        patch: &AssistantProfileUpdate,
    ) -> Result<AssistantProfile> {
        let mut updated = current.clone();
        if let Some(name) = &patch.name {
            updated.name = name.clone();
        }
        if let Some(description) = &patch.description {
            updated.description = Some(description.clone());
        }
        if let Some(language) = &patch.language {
            updated.language = language.clone();
        }
        if let Some(ai_model) = &patch.ai_model {
            updated.ai_model = ai_model.clone();
        }
        if let Some(style) = patch.style {
            updated.style = style;
        }
        if let Some(temperature) = patch.dialogue_temperature {
            updated.dialogue_temperature = temperature;
        }
        if let Some(temperature) = patch.intent_temperature {
            updated.intent_temperature = temperature;
        }
        if let Some(instructions) = &patch.custom_instructions {
            updated.custom_instructions = Some(instructions.clone());
        }
        if let Some(requires_confirmation) = patch.requires_confirmation {
            updated.requires_confirmation = requires_confirmation;
        }
        if let Some(is_default) = patch.is_default {
            updated.is_default = is_default;
        }
        if let Some(is_public) = patch.is_public {
            updated.is_public = is_public;
        }
        updated.version = next_version(Some(current.version));
        updated.updated_at = Utc::now();

        let mut tx = self.pool.begin().await.context("begin update profile")?;

        if updated.is_default && !current.is_default {
            sqlx::query(
                "UPDATE assistant_profiles SET is_default = 0 WHERE owner_id = $1",
            )
            .bind(&current.owner_id)
            .execute(&mut *tx)
            .await
            .context("clear previous default")?;
        }

        sqlx::query(
            "UPDATE assistant_profiles
             SET name = $1, description = $2, language = $3, ai_model = $4, style = $5,
                 dialogue_temperature = $6, intent_temperature = $7, custom_instructions = $8,
                 requires_confirmation = $9, is_default = $10, is_public = $11,
                 version = $12, updated_at = $13
             WHERE id = $14",
        )
        .bind(&updated.name)
        .bind(&updated.description)
        .bind(&updated.language)
        .bind(&updated.ai_model)
        .bind(serde_json::to_string(&updated.style)?)
        .bind(updated.dialogue_temperature)
        .bind(updated.intent_temperature)
        .bind(&updated.custom_instructions)
        .bind(i64::from(updated.requires_confirmation))
        .bind(i64::from(updated.is_default))
        .bind(i64::from(updated.is_public))
        .bind(updated.version)
        .bind(updated.updated_at.to_rfc3339())
        .bind(&updated.id)
        .execute(&mut *tx)
        .await
        .context("update assistant profile")?;

        tx.commit().await.context("commit update profile")?;
        Ok(updated)
    }

    /// Bump a profile's version without any field change (used when a share
    /// or revoke mutates the assistant's permission surface).
    pub async fn touch(&self, profile: &AssistantProfile) -> Result<i64> {
        let version = next_version(Some(profile.version));
        sqlx::query(
            "UPDATE assistant_profiles SET version = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(version)
        .bind(Utc::now().to_rfc3339())
        .bind(&profile.id)
        .execute(&self.pool)
        .await
        .context("touch assistant profile")?;
        Ok(version)
    }

    pub async fn delete(&self, assistant_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assistant_profiles WHERE id = $1")
            .bind(assistant_id)
            .execute(&self.pool)
            .await
            .context("delete assistant profile")?;
        Ok(result.rows_affected() > 0)
    }

    /// `(assistant_id, version)` pairs for the caller's accessible profiles,
    /// optionally narrowed to explicit ids.
    pub fn versions(
        &self,
        profiles: &[AssistantProfile],
        ids: Option<&[String]>,
    ) -> Vec<(String, i64)> {
        profiles
            .iter()
            .filter(|profile| ids.is_none_or(|wanted| wanted.contains(&profile.id)))
            .map(|profile| (profile.id.clone(), profile.version))
            .collect()
    }

    // ── Permissions ─────────────────────────────────────────────────────

    /// Install or overwrite the single grant row for `(assistant, grantee)`.
    pub async fn upsert_permission(
        &self,
        permission: &AssistantPermission,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO assistant_permissions
                 (assistant_id, grantee_user_id, level, granted_by, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (assistant_id, grantee_user_id)
             DO UPDATE SET level = excluded.level,
                           granted_by = excluded.granted_by,
                           expires_at = excluded.expires_at,
                           created_at = excluded.created_at",
        )
        .bind(&permission.assistant_id)
        .bind(&permission.grantee_user_id)
        .bind(permission.level.to_string())
        .bind(&permission.granted_by)
        .bind(permission.expires_at.map(|e| e.to_rfc3339()))
        .bind(permission.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("upsert assistant permission")?;

        Ok(())
    }

    pub async fn get_permission(
        &self,
        assistant_id: &str,
        grantee_user_id: &str,
    ) -> Result<Option<AssistantPermission>> {
        let row = sqlx::query(
            "SELECT * FROM assistant_permissions
             WHERE assistant_id = $1 AND grantee_user_id = $2",
        )
        .bind(assistant_id)
        .bind(grantee_user_id)
        .fetch_optional(&self.pool)
        .await
        .context("load assistant permission")?;

        row.as_ref().map(map_permission_row).transpose()
    }

    pub async fn list_permissions(
        &self,
        assistant_id: &str,
    ) -> Result<Vec<AssistantPermission>> {
        let rows = sqlx::query(
            "SELECT * FROM assistant_permissions
             WHERE assistant_id = $1
             ORDER BY created_at ASC",
        )
        .bind(assistant_id)
        .fetch_all(&self.pool)
        .await
        .context("list assistant permissions")?;

        rows.iter().map(map_permission_row).collect()
    }

    pub async fn delete_permission(
        &self,
        assistant_id: &str,
        grantee_user_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM assistant_permissions
             WHERE assistant_id = $1 AND grantee_user_id = $2",
        )
        .bind(assistant_id)
        .bind(grantee_user_id)
        .execute(&self.pool)
        .await
        .context("delete assistant permission")?;

        Ok(result.rows_affected() > 0)
    }

    /// Profiles explicitly granted to the user, expired rows excluded.
    pub async fn list_granted_to(&self, user_id: &str) -> Result<Vec<AssistantProfile>> {
        let rows = sqlx::query(
            "SELECT p.* FROM assistant_profiles p
             JOIN assistant_permissions ap ON ap.assistant_id = p.id
             WHERE ap.grantee_user_id = $1
               AND (ap.expires_at IS NULL OR ap.expires_at > $2)
             ORDER BY p.created_at ASC",
        )
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .context("list granted profiles")?;

        rows.iter().map(map_profile_row).collect()
    }

    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM assistant_permissions
             WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("sweep expired permissions")?;

        Ok(result.rows_affected())
    }
}
