use super::types::{
    ConversationLogEntry, ConversationSession, FeedbackType, IntentFeedback, SessionStatus,
};
use crate::intent::types::{EntityMap, IntentKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversation_sessions (
    id                  TEXT PRIMARY KEY,
    user_id             TEXT NOT NULL,
    session_type        TEXT NOT NULL DEFAULT 'chat',
    status              TEXT NOT NULL DEFAULT 'active',
    current_intent      TEXT,
    turn_count          INTEGER NOT NULL DEFAULT 0,
    successful_intents  INTEGER NOT NULL DEFAULT 0,
    failed_intents      INTEGER NOT NULL DEFAULT 0,
    avg_confidence      REAL NOT NULL DEFAULT 0.0,
    incomplete_entities TEXT NOT NULL DEFAULT '[]',
    context_data        TEXT NOT NULL DEFAULT '{}',
    started_at          TEXT NOT NULL,
    last_activity       TEXT NOT NULL,
    completed_at        TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_user_activity
    ON conversation_sessions(user_id, last_activity DESC);

CREATE TABLE IF NOT EXISTS conversation_logs (
    id                 TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL,
    session_id         TEXT NOT NULL REFERENCES conversation_sessions(id) ON DELETE CASCADE,
    turn_number        INTEGER NOT NULL,
    user_message       TEXT NOT NULL,
    intent             TEXT NOT NULL,
    confidence         REAL NOT NULL,
    entities           TEXT NOT NULL DEFAULT '{}',
    reasoning          TEXT,
    fallback_used      INTEGER NOT NULL DEFAULT 0,
    processing_time_ms REAL NOT NULL DEFAULT 0.0,
    previous_intent    TEXT,
    created_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_session_turn
    ON conversation_logs(session_id, turn_number);

CREATE TABLE IF NOT EXISTS intent_feedback (
    id                  TEXT PRIMARY KEY,
    user_id             TEXT NOT NULL,
    conversation_log_id TEXT NOT NULL REFERENCES conversation_logs(id) ON DELETE CASCADE,
    original_intent     TEXT NOT NULL,
    original_confidence REAL NOT NULL,
    corrected_intent    TEXT NOT NULL,
    feedback_type       TEXT NOT NULL,
    comment             TEXT,
    created_at          TEXT NOT NULL
);
";

/// Persistence for conversation sessions, per-turn logs and intent feedback.
pub struct ConversationStore {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in {column}: {raw}"))
}

fn parse_intent(raw: Option<String>) -> Option<IntentKind> {
    raw.and_then(|value| IntentKind::from_str(&value).ok())
}

fn map_session_row(row: &SqliteRow) -> Result<ConversationSession> {
    let status_raw: String = row.try_get("status")?;
    let incomplete_raw: String = row.try_get("incomplete_entities")?;
    let context_raw: String = row.try_get("context_data")?;
    let started_raw: String = row.try_get("started_at")?;
    let activity_raw: String = row.try_get("last_activity")?;
    let completed_raw: Option<String> = row.try_get("completed_at")?;

    Ok(ConversationSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        session_type: row.try_get("session_type")?,
        status: SessionStatus::parse(&status_raw)
            .with_context(|| format!("unknown session status: {status_raw}"))?,
        current_intent: parse_intent(row.try_get("current_intent")?),
        turn_count: row.try_get("turn_count")?,
        successful_intents: row.try_get("successful_intents")?,
        failed_intents: row.try_get("failed_intents")?,
        avg_confidence: row.try_get("avg_confidence")?,
        incomplete_entities: serde_json::from_str(&incomplete_raw)
            .context("corrupt incomplete_entities")?,
        context_data: serde_json::from_str(&context_raw).context("corrupt context_data")?,
        started_at: parse_timestamp(&started_raw, "started_at")?,
        last_activity: parse_timestamp(&activity_raw, "last_activity")?,
        completed_at: completed_raw
            .map(|raw| parse_timestamp(&raw, "completed_at"))
            .transpose()?,
    })
}

fn map_log_row(row: &SqliteRow) -> Result<ConversationLogEntry> {
    let intent_raw: String = row.try_get("intent")?;
    let entities_raw: String = row.try_get("entities")?;
    let created_raw: String = row.try_get("created_at")?;
    let fallback: i64 = row.try_get("fallback_used")?;

    Ok(ConversationLogEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        turn_number: row.try_get("turn_number")?,
        user_message: row.try_get("user_message")?,
        intent: IntentKind::from_str(&intent_raw).unwrap_or(IntentKind::Unknown),
        confidence: row.try_get("confidence")?,
        entities: serde_json::from_str(&entities_raw).context("corrupt entities")?,
        reasoning: row.try_get("reasoning")?,
        fallback_used: fallback != 0,
        processing_time_ms: row.try_get("processing_time_ms")?,
        previous_intent: parse_intent(row.try_get("previous_intent")?),
        created_at: parse_timestamp(&created_raw, "created_at")?,
    })
}

fn map_feedback_row(row: &SqliteRow) -> Result<IntentFeedback> {
    let original_raw: String = row.try_get("original_intent")?;
    let corrected_raw: String = row.try_get("corrected_intent")?;
    let type_raw: String = row.try_get("feedback_type")?;
    let created_raw: String = row.try_get("created_at")?;

    Ok(IntentFeedback {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        conversation_log_id: row.try_get("conversation_log_id")?,
        original_intent: IntentKind::from_str(&original_raw).unwrap_or(IntentKind::Unknown),
        original_confidence: row.try_get("original_confidence")?,
        corrected_intent: IntentKind::from_str(&corrected_raw).unwrap_or(IntentKind::Unknown),
        feedback_type: FeedbackType::parse(&type_raw)
            .with_context(|| format!("unknown feedback type: {type_raw}"))?,
        comment: row.try_get("comment")?,
        created_at: parse_timestamp(&created_raw, "created_at")?,
    })
}

impl ConversationStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("create conversation schema")?;
        Ok(Self { pool })
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Create a session. The client may supply the id; otherwise one is
    /// generated.
    pub async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        session_type: &str,
        context_data: serde_json::Value,
    ) -> Result<ConversationSession> {
        let id = session_id
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO conversation_sessions
                 (id, user_id, session_type, status, context_data, started_at, last_activity)
             VALUES ($1, $2, $3, 'active', $4, $5, $5)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(session_type)
        .bind(context_data.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert conversation session")?;

        Ok(ConversationSession {
            id,
            user_id: user_id.to_string(),
            session_type: session_type.to_string(),
            status: SessionStatus::Active,
            current_intent: None,
            turn_count: 0,
            successful_intents: 0,
            failed_intents: 0,
            avg_confidence: 0.0,
            incomplete_entities: vec![],
            context_data,
            started_at: now,
            last_activity: now,
            completed_at: None,
        })
    }

    pub async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ConversationSession>> {
        let row = sqlx::query(
            "SELECT * FROM conversation_sessions WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("load conversation session")?;

        row.as_ref().map(map_session_row).transpose()
    }

    pub async fn list_sessions(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
        status: Option<SessionStatus>,
    ) -> Result<Vec<ConversationSession>> {
        let rows = if let Some(status) = status {
            sqlx::query(
                "SELECT * FROM conversation_sessions
                 WHERE user_id = $1 AND status = $2
                 ORDER BY last_activity DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(user_id)
            .bind(status.as_str())
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT * FROM conversation_sessions
                 WHERE user_id = $1
                 ORDER BY last_activity DESC
                 LIMIT $2 OFFSET $3",
            )
            .bind(user_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
        }
        .context("list conversation sessions")?;

        rows.iter().map(map_session_row).collect()
    }

    /// Persist the post-turn rollup for a session.
    pub async fn update_after_turn(&self, session: &ConversationSession) -> Result<()> {
        sqlx::query(
            "UPDATE conversation_sessions
             SET current_intent = $1,
                 turn_count = $2,
                 successful_intents = $3,
                 failed_intents = $4,
                 avg_confidence = $5,
                 incomplete_entities = $6,
                 last_activity = $7
             WHERE id = $8 AND user_id = $9",
        )
        .bind(session.current_intent.map(|i| i.to_string()))
        .bind(session.turn_count)
        .bind(session.successful_intents)
        .bind(session.failed_intents)
        .bind(session.avg_confidence)
        .bind(serde_json::to_string(&session.incomplete_entities)?)
        .bind(session.last_activity.to_rfc3339())
        .bind(&session.id)
        .bind(&session.user_id)
        .execute(&self.pool)
        .await
        .context("update conversation session")?;

        Ok(())
    }

    pub async fn complete_session(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE conversation_sessions
             SET status = 'completed', completed_at = $1, last_activity = $1
             WHERE id = $2 AND user_id = $3 AND status = 'active'",
        )
        .bind(now)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("complete conversation session")?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark active sessions idle since before `cutoff` as abandoned.
    pub async fn sweep_idle(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE conversation_sessions
             SET status = 'abandoned'
             WHERE status = 'active' AND last_activity < $1",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("sweep idle sessions")?;

        Ok(result.rows_affected())
    }

    // ── Logs ────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn append_log(
        &self,
        user_id: &str,
        session_id: &str,
        turn_number: i64,
        user_message: &str,
        intent: IntentKind,
        confidence: f64,
        entities: &EntityMap,
        reasoning: Option<&str>,
        fallback_used: bool,
        processing_time_ms: f64,
        previous_intent: Option<IntentKind>,
    ) -> Result<ConversationLogEntry> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO conversation_logs
                 (id, user_id, session_id, turn_number, user_message, intent, confidence,
                  entities, reasoning, fallback_used, processing_time_ms, previous_intent,
                  created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(session_id)
        .bind(turn_number)
        .bind(user_message)
        .bind(intent.to_string())
        .bind(confidence)
        .bind(serde_json::to_string(entities)?)
        .bind(reasoning)
        .bind(i64::from(fallback_used))
        .bind(processing_time_ms)
        .bind(previous_intent.map(|i| i.to_string()))
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert conversation log")?;

        Ok(ConversationLogEntry {
            id,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            turn_number,
            user_message: user_message.to_string(),
            intent,
            confidence,
            entities: entities.clone(),
            reasoning: reasoning.map(ToOwned::to_owned),
            fallback_used,
            processing_time_ms,
            previous_intent,
            created_at,
        })
    }

    pub async fn list_logs(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_logs
             WHERE session_id = $1 AND user_id = $2
             ORDER BY turn_number ASC
             LIMIT $3",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("list conversation logs")?;

        rows.iter().map(map_log_row).collect()
    }

    pub async fn get_log(
        &self,
        log_id: &str,
        user_id: &str,
    ) -> Result<Option<ConversationLogEntry>> {
        let row = sqlx::query(
            "SELECT * FROM conversation_logs WHERE id = $1 AND user_id = $2",
        )
        .bind(log_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("load conversation log")?;

        row.as_ref().map(map_log_row).transpose()
    }

    pub async fn count_logs(&self, session_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversation_logs WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .context("count conversation logs")?;

        Ok(row.try_get("n")?)
    }

    // ── Feedback ────────────────────────────────────────────────────────

    pub async fn insert_feedback(
        &self,
        user_id: &str,
        log: &ConversationLogEntry,
        corrected_intent: IntentKind,
        feedback_type: FeedbackType,
        comment: Option<&str>,
    ) -> Result<IntentFeedback> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO intent_feedback
                 (id, user_id, conversation_log_id, original_intent, original_confidence,
                  corrected_intent, feedback_type, comment, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&log.id)
        .bind(log.intent.to_string())
        .bind(log.confidence)
        .bind(corrected_intent.to_string())
        .bind(feedback_type.as_str())
        .bind(comment)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert intent feedback")?;

        Ok(IntentFeedback {
            id,
            user_id: user_id.to_string(),
            conversation_log_id: log.id.clone(),
            original_intent: log.intent,
            original_confidence: log.confidence,
            corrected_intent,
            feedback_type,
            comment: comment.map(ToOwned::to_owned),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> ConversationStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ConversationStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let store = store().await;
        let created = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();

        let loaded = store
            .get_session(&created.id, "user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.turn_count, 0);

        // Sessions are owner-scoped.
        assert!(store
            .get_session(&created.id, "someone-else")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn client_supplied_session_id_is_kept() {
        let store = store().await;
        let created = store
            .create_session("user-1", Some("client-session"), "chat", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(created.id, "client-session");
    }

    #[tokio::test]
    async fn update_after_turn_persists_counters() {
        let store = store().await;
        let mut session = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();

        session.turn_count = 3;
        session.successful_intents = 2;
        session.failed_intents = 1;
        session.avg_confidence = 0.8;
        session.current_intent = Some(IntentKind::CreateGoal);
        session.incomplete_entities = vec!["title".into()];
        session.last_activity = Utc::now();
        store.update_after_turn(&session).await.unwrap();

        let loaded = store
            .get_session(&session.id, "user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.turn_count, 3);
        assert_eq!(loaded.successful_intents, 2);
        assert_eq!(loaded.current_intent, Some(IntentKind::CreateGoal));
        assert_eq!(loaded.incomplete_entities, vec!["title".to_string()]);
    }

    #[tokio::test]
    async fn list_sessions_filters_by_status() {
        let store = store().await;
        let first = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();
        store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();

        store.complete_session(&first.id, "user-1").await.unwrap();

        let all = store.list_sessions("user-1", 10, 0, None).await.unwrap();
        let completed = store
            .list_sessions("user-1", 10, 0, Some(SessionStatus::Completed))
            .await
            .unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
        assert!(completed[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn sweep_idle_abandons_stale_sessions() {
        let store = store().await;
        let session = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();

        // Cutoff after creation: everything active is stale.
        let swept = store
            .sweep_idle(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let loaded = store
            .get_session(&session.id, "user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, SessionStatus::Abandoned);

        // Second sweep finds nothing.
        let swept_again = store
            .sweep_idle(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(swept_again, 0);
    }

    #[tokio::test]
    async fn logs_round_trip_in_turn_order() {
        let store = store().await;
        let session = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();

        for turn in 1..=3 {
            store
                .append_log(
                    "user-1",
                    &session.id,
                    turn,
                    &format!("message {turn}"),
                    IntentKind::ChatContinuation,
                    0.7,
                    &EntityMap::new(),
                    None,
                    turn % 2 == 0,
                    12.5,
                    None,
                )
                .await
                .unwrap();
        }

        let logs = store.list_logs(&session.id, "user-1", 50).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].turn_number, 1);
        assert_eq!(logs[2].turn_number, 3);
        assert!(logs[1].fallback_used);

        assert_eq!(store.count_logs(&session.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn feedback_references_log() {
        let store = store().await;
        let session = store
            .create_session("user-1", None, "chat", serde_json::json!({}))
            .await
            .unwrap();
        let log = store
            .append_log(
                "user-1",
                &session.id,
                1,
                "rate my health",
                IntentKind::GetAdvice,
                0.6,
                &EntityMap::new(),
                None,
                true,
                8.0,
                None,
            )
            .await
            .unwrap();

        let feedback = store
            .insert_feedback(
                "user-1",
                &log,
                IntentKind::RateLifeArea,
                FeedbackType::WrongIntent,
                Some("should have been a rating"),
            )
            .await
            .unwrap();

        assert_eq!(feedback.original_intent, IntentKind::GetAdvice);
        assert_eq!(feedback.corrected_intent, IntentKind::RateLifeArea);
        assert_eq!(feedback.feedback_type, FeedbackType::WrongIntent);
    }
}
