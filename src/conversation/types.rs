use crate::intent::types::{EntityMap, IntentKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// Session-level rollup of a user's conversation turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub user_id: String,
    pub session_type: String,
    pub status: SessionStatus,
    pub current_intent: Option<IntentKind>,
    pub turn_count: i64,
    pub successful_intents: i64,
    pub failed_intents: i64,
    pub avg_confidence: f64,
    pub incomplete_entities: Vec<String>,
    pub context_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One classified turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub turn_number: i64,
    pub user_message: String,
    pub intent: IntentKind,
    pub confidence: f64,
    pub entities: EntityMap,
    pub reasoning: Option<String>,
    pub fallback_used: bool,
    pub processing_time_ms: f64,
    pub previous_intent: Option<IntentKind>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    WrongIntent,
    MissingEntity,
    WrongEntity,
}

impl FeedbackType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackType::WrongIntent => "wrong_intent",
            FeedbackType::MissingEntity => "missing_entity",
            FeedbackType::WrongEntity => "wrong_entity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wrong_intent" => Some(FeedbackType::WrongIntent),
            "missing_entity" => Some(FeedbackType::MissingEntity),
            "wrong_entity" => Some(FeedbackType::WrongEntity),
            _ => None,
        }
    }
}

/// User-submitted correction for a logged classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentFeedback {
    pub id: String,
    pub user_id: String,
    pub conversation_log_id: String,
    pub original_intent: IntentKind,
    pub original_confidence: f64,
    pub corrected_intent: IntentKind,
    pub feedback_type: FeedbackType,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_round_trips() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }

    #[test]
    fn feedback_type_round_trips() {
        for feedback in [
            FeedbackType::WrongIntent,
            FeedbackType::MissingEntity,
            FeedbackType::WrongEntity,
        ] {
            assert_eq!(FeedbackType::parse(feedback.as_str()), Some(feedback));
        }
    }

    #[test]
    fn session_serializes_enums_lowercase() {
        let session = ConversationSession {
            id: "s1".into(),
            user_id: "u1".into(),
            session_type: "chat".into(),
            status: SessionStatus::Active,
            current_intent: Some(IntentKind::CreateTask),
            turn_count: 1,
            successful_intents: 1,
            failed_intents: 0,
            avg_confidence: 0.9,
            incomplete_entities: vec![],
            context_data: serde_json::json!({}),
            started_at: Utc::now(),
            last_activity: Utc::now(),
            completed_at: None,
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["status"], "active");
        assert_eq!(value["current_intent"], "create_task");
    }
}
