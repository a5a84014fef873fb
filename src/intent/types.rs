use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Closed set of intents the conversation engine understands.
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
pub enum IntentKind {
    CreateGoal,
    CreateTask,
    CreateProject,
    UpdateSettings,
    RateLifeArea,
    ChatContinuation,
    GetAdvice,
    Unknown,
}

impl IntentKind {
    /// Entities that must be present before the dispatcher will execute the
    /// intent.
    pub fn required_entities(self) -> &'static [&'static str] {
        match self {
            IntentKind::CreateGoal | IntentKind::CreateTask | IntentKind::CreateProject => {
                &["title"]
            }
            IntentKind::RateLifeArea => &["life_area"],
            IntentKind::UpdateSettings
            | IntentKind::ChatContinuation
            | IntentKind::GetAdvice
            | IntentKind::Unknown => &[],
        }
    }

    /// The noun for `create_*` intents, used in clarification copy.
    pub fn created_noun(self) -> Option<&'static str> {
        match self {
            IntentKind::CreateGoal => Some("goal"),
            IntentKind::CreateTask => Some("task"),
            IntentKind::CreateProject => Some("project"),
            _ => None,
        }
    }

    pub fn is_create(self) -> bool {
        self.created_noun().is_some()
    }
}

pub type EntityMap = serde_json::Map<String, serde_json::Value>;

/// Result of intent classification and entity extraction for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentKind,
    pub confidence: f64,
    pub entities: EntityMap,
    pub reasoning: Option<String>,
    pub fallback_used: bool,
    pub processing_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn intent_names_round_trip_snake_case() {
        assert_eq!(IntentKind::CreateGoal.to_string(), "create_goal");
        assert_eq!(
            IntentKind::from_str("chat_continuation").unwrap(),
            IntentKind::ChatContinuation
        );
    }

    #[test]
    fn create_intents_require_title() {
        assert_eq!(IntentKind::CreateTask.required_entities(), &["title"]);
        assert_eq!(IntentKind::RateLifeArea.required_entities(), &["life_area"]);
        assert!(IntentKind::GetAdvice.required_entities().is_empty());
    }

    #[test]
    fn created_noun_only_for_create_intents() {
        assert_eq!(IntentKind::CreateProject.created_noun(), Some("project"));
        assert_eq!(IntentKind::GetAdvice.created_noun(), None);
    }
}
