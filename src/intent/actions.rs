use super::types::{EntityMap, IntentKind, IntentResult};
use crate::domain::DomainService;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ordered recommendation for the client's next step. Only `execute_action`
/// mutates state; the rest shape the next UI turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    ClarificationRequest {
        message: String,
        suggested_intents: Vec<IntentKind>,
    },
    EntityRequest {
        required_entity: String,
        message: String,
    },
    ExecuteAction {
        action: IntentKind,
        entities: EntityMap,
    },
    ProvideAdvice {
        context: EntityMap,
    },
    ContinueConversation {
        context: serde_json::Value,
    },
}

/// Plans next actions from a classification and executes the actionable ones
/// through the domain service.
pub struct ActionDispatcher {
    domain: Arc<dyn DomainService>,
    confidence_threshold: f64,
}

impl ActionDispatcher {
    pub fn new(domain: Arc<dyn DomainService>, confidence_threshold: f64) -> Self {
        Self {
            domain,
            confidence_threshold,
        }
    }

    pub fn domain(&self) -> &Arc<dyn DomainService> {
        &self.domain
    }

    /// Next-action planning table. `session_context` is attached to
    /// conversation continuations so the client can keep its thread.
    pub fn plan(
        &self,
        result: &IntentResult,
        session_context: &serde_json::Value,
    ) -> Vec<NextAction> {
        let mut actions = Vec::new();

        if result.confidence < self.confidence_threshold {
            actions.push(NextAction::ClarificationRequest {
                message: "I'm not sure what you'd like to do. Could you please be more specific?"
                    .to_string(),
                suggested_intents: vec![
                    IntentKind::CreateGoal,
                    IntentKind::CreateTask,
                    IntentKind::GetAdvice,
                ],
            });
            return actions;
        }

        match result.intent {
            intent if intent.is_create() => {
                let missing = intent
                    .required_entities()
                    .iter()
                    .find(|entity| !result.entities.contains_key(**entity));

                match missing {
                    Some(entity) => actions.push(NextAction::EntityRequest {
                        required_entity: (*entity).to_string(),
                        message: format!(
                            "What would you like to call this {}?",
                            intent.created_noun().unwrap_or("item")
                        ),
                    }),
                    None => actions.push(NextAction::ExecuteAction {
                        action: intent,
                        entities: result.entities.clone(),
                    }),
                }
            }
            IntentKind::GetAdvice => actions.push(NextAction::ProvideAdvice {
                context: result.entities.clone(),
            }),
            IntentKind::ChatContinuation => actions.push(NextAction::ContinueConversation {
                context: session_context.clone(),
            }),
            _ => {}
        }

        actions
    }

    /// Execute an `execute_action` through the domain service.
    pub async fn execute(
        &self,
        user_id: &str,
        intent: IntentKind,
        entities: &EntityMap,
    ) -> Result<serde_json::Value> {
        match intent {
            IntentKind::CreateGoal => self.domain.create_goal(user_id, entities).await,
            IntentKind::CreateTask => self.domain.create_task(user_id, entities).await,
            IntentKind::CreateProject => self.domain.create_project(user_id, entities).await,
            IntentKind::UpdateSettings => self.domain.update_settings(user_id, entities).await,
            IntentKind::RateLifeArea => self.domain.rate_life_area(user_id, entities).await,
            other => Err(EngineError::Validation(format!(
                "intent {other} is not executable"
            ))),
        }
    }
}
