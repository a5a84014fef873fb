use super::types::{ObjectType, TypeStats, VersionedObject};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Versioned-object store backing the offline-first sync protocol.
///
/// Every sync-eligible row carries a millisecond `version` that is strictly
/// increasing per object id; it doubles as the delta-feed cursor.
pub struct SyncStore {
    pool: SqlitePool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sync_objects (
    object_id   TEXT NOT NULL,
    object_type TEXT NOT NULL,
    owner_id    TEXT NOT NULL,
    data        TEXT NOT NULL,
    version     INTEGER NOT NULL,
    PRIMARY KEY (object_type, object_id)
);
CREATE INDEX IF NOT EXISTS idx_sync_objects_owner_version
    ON sync_objects(owner_id, version);
";

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Next version for an object: wall-clock millis, bumped past the previous
/// version when the clock has not advanced (or has regressed).
pub fn next_version(previous: Option<i64>) -> i64 {
    let candidate = now_millis();
    match previous {
        Some(prev) if candidate <= prev => prev + 1,
        _ => candidate,
    }
}

fn map_row(row: &SqliteRow) -> Result<VersionedObject> {
    let object_type_raw: String = row.try_get("object_type")?;
    let data_raw: String = row.try_get("data")?;

    Ok(VersionedObject {
        object_id: row.try_get("object_id")?,
        object_type: ObjectType::from_str(&object_type_raw)
            .with_context(|| format!("unknown object type in store: {object_type_raw}"))?,
        owner_id: row.try_get("owner_id")?,
        data: serde_json::from_str(&data_raw).context("corrupt object data")?,
        version: row.try_get("version")?,
    })
}

impl SyncStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("create sync_objects schema")?;
        Ok(Self { pool })
    }

    pub async fn get(
        &self,
        object_type: ObjectType,
        object_id: &str,
        owner_id: &str,
    ) -> Result<Option<VersionedObject>> {
        let row = sqlx::query(
            "SELECT object_id, object_type, owner_id, data, version
             FROM sync_objects
             WHERE object_type = $1 AND object_id = $2 AND owner_id = $3",
        )
        .bind(object_type.to_string())
        .bind(object_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("load sync object")?;

        row.as_ref().map(map_row).transpose()
    }

    /// Insert a fresh object. Fails if the id is already taken for the type.
    pub async fn insert(
        &self,
        object_type: ObjectType,
        object_id: &str,
        owner_id: &str,
        data: &serde_json::Value,
    ) -> Result<i64> {
        let version = next_version(None);
        sqlx::query(
            "INSERT INTO sync_objects (object_id, object_type, owner_id, data, version)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(object_id)
        .bind(object_type.to_string())
        .bind(owner_id)
        .bind(data.to_string())
        .bind(version)
        .execute(&self.pool)
        .await
        .context("insert sync object")?;

        Ok(version)
    }

    /// Replace an object's data and bump its version.
    pub async fn write(
        &self,
        object_type: ObjectType,
        object_id: &str,
        owner_id: &str,
        data: &serde_json::Value,
        previous_version: i64,
    ) -> Result<i64> {
        let version = next_version(Some(previous_version));
        sqlx::query(
            "UPDATE sync_objects
             SET data = $1, version = $2
             WHERE object_type = $3 AND object_id = $4 AND owner_id = $5",
        )
        .bind(data.to_string())
        .bind(version)
        .bind(object_type.to_string())
        .bind(object_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .context("update sync object")?;

        Ok(version)
    }

    /// Install or replace an object unconditionally, keeping the version
    /// monotonic. Used when another subsystem mirrors state into the feed.
    pub async fn upsert(
        &self,
        object_type: ObjectType,
        object_id: &str,
        owner_id: &str,
        data: &serde_json::Value,
    ) -> Result<i64> {
        let previous = self.get(object_type, object_id, owner_id).await?;
        let version = next_version(previous.map(|o| o.version));

        sqlx::query(
            "INSERT INTO sync_objects (object_id, object_type, owner_id, data, version)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (object_type, object_id)
             DO UPDATE SET data = excluded.data, version = excluded.version",
        )
        .bind(object_id)
        .bind(object_type.to_string())
        .bind(owner_id)
        .bind(data.to_string())
        .bind(version)
        .execute(&self.pool)
        .await
        .context("upsert sync object")?;

        Ok(version)
    }

    pub async fn delete(
        &self,
        object_type: ObjectType,
        object_id: &str,
        owner_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM sync_objects
             WHERE object_type = $1 AND object_id = $2 AND owner_id = $3",
        )
        .bind(object_type.to_string())
        .bind(object_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .context("delete sync object")?;

        Ok(result.rows_affected() > 0)
    }

    /// Objects owned by `owner_id` with `version > since`, oldest first.
    /// Fetches one past `limit` so the caller can detect truncation.
    pub async fn changes_since(
        &self,
        owner_id: &str,
        since: i64,
        object_types: Option<&[ObjectType]>,
        limit: usize,
    ) -> Result<Vec<VersionedObject>> {
        let fetch = (limit + 1) as i64;
        let rows = if let Some(filter) = object_types {
            let type_names: Vec<String> = filter.iter().map(ToString::to_string).collect();
            let type_json =
                serde_json::to_string(&type_names).context("encode object-type filter")?;
            sqlx::query(
                "SELECT object_id, object_type, owner_id, data, version
                 FROM sync_objects
                 WHERE owner_id = $1 AND version > $2
                   AND object_type IN (SELECT value FROM json_each($3))
                 ORDER BY version ASC
                 LIMIT $4",
            )
            .bind(owner_id)
            .bind(since)
            .bind(type_json)
            .bind(fetch)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT object_id, object_type, owner_id, data, version
                 FROM sync_objects
                 WHERE owner_id = $1 AND version > $2
                 ORDER BY version ASC
                 LIMIT $3",
            )
            .bind(owner_id)
            .bind(since)
            .bind(fetch)
            .fetch_all(&self.pool)
            .await
        }
        .context("load delta changes")?;

        rows.iter().map(map_row).collect()
    }

    pub async fn stats_for(
        &self,
        owner_id: &str,
        object_type: ObjectType,
        recent_cutoff: i64,
    ) -> Result<TypeStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) AS total,
                 COALESCE(SUM(CASE WHEN version > $3 THEN 1 ELSE 0 END), 0) AS recent
             FROM sync_objects
             WHERE owner_id = $1 AND object_type = $2",
        )
        .bind(owner_id)
        .bind(object_type.to_string())
        .bind(recent_cutoff)
        .fetch_one(&self.pool)
        .await
        .context("load sync stats")?;

        Ok(TypeStats {
            total_objects: row.try_get("total")?,
            recent_changes: row.try_get("recent")?,
        })
    }

    /// Most recently changed objects for a user, newest first. Feeds the
    /// classifier's user-context hydration.
    pub async fn recent_for_owner(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<VersionedObject>> {
        let rows = sqlx::query(
            "SELECT object_id, object_type, owner_id, data, version
             FROM sync_objects
             WHERE owner_id = $1
             ORDER BY version DESC
             LIMIT $2",
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("load recent objects")?;

        rows.iter().map(map_row).collect()
    }
}
