use super::actions::{ActionDispatcher, NextAction};
use super::classifier::IntentClassifier;
use super::types::{IntentKind, IntentResult};
use crate::ai::AssistantTuning;
use crate::conversation::store::ConversationStore;
use crate::conversation::types::{ConversationSession, SessionStatus};
use crate::domain::DomainService;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

const SESSION_TYPE_CHAT: &str = "chat";

/// Assistant profile parameters that influence a turn.
#[derive(Debug, Clone, Copy)]
pub struct AssistantBinding {
    pub tuning: AssistantTuning,
    pub requires_confirmation: bool,
}

/// Per-user conversation state. Lives in the process; the durable rollup is
/// mirrored into the conversation store after every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub current_intent: Option<IntentKind>,
    pub turn_count: i64,
    pub successful_intents: i64,
    pub failed_intents: i64,
    pub avg_confidence: f64,
    pub incomplete_entities: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

impl SessionState {
    fn fresh(session_id: String) -> Self {
        Self {
            session_id,
            current_intent: None,
            turn_count: 0,
            successful_intents: 0,
            failed_intents: 0,
            avg_confidence: 0.0,
            incomplete_entities: vec![],
            last_activity: Utc::now(),
        }
    }

    fn from_row(row: &ConversationSession) -> Self {
        Self {
            session_id: row.id.clone(),
            current_intent: row.current_intent,
            turn_count: row.turn_count,
            successful_intents: row.successful_intents,
            failed_intents: row.failed_intents,
            avg_confidence: row.avg_confidence,
            incomplete_entities: row.incomplete_entities.clone(),
            last_activity: row.last_activity,
        }
    }
}

/// Everything a conversation turn produces.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub intent_result: IntentResult,
    pub conversation_state: SessionState,
    pub next_actions: Vec<NextAction>,
    pub requires_clarification: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<serde_json::Value>,
}

/// Serializes turns per user, maintains session rollups and plans (and
/// optionally executes) the next actions for every message.
pub struct ConversationFlowManager {
    classifier: IntentClassifier,
    dispatcher: ActionDispatcher,
    store: Arc<ConversationStore>,
    domain: Arc<dyn DomainService>,
    sessions: StdMutex<HashMap<String, Arc<AsyncMutex<Option<SessionState>>>>>,
    confidence_threshold: f64,
    idle_timeout: Duration,
}

impl ConversationFlowManager {
    pub fn new(
        classifier: IntentClassifier,
        dispatcher: ActionDispatcher,
        store: Arc<ConversationStore>,
        domain: Arc<dyn DomainService>,
        idle_timeout_minutes: i64,
    ) -> Self {
        let confidence_threshold = classifier.confidence_threshold();
        Self {
            classifier,
            dispatcher,
            store,
            domain,
            sessions: StdMutex::new(HashMap::new()),
            confidence_threshold,
            idle_timeout: Duration::minutes(idle_timeout_minutes),
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Process one user message. Turns for the same user are serialized on a
    /// per-user lock so `turn_count` and `avg_confidence` stay consistent
    /// under concurrency.
    pub async fn process_message(
        &self,
        user_id: &str,
        message: &str,
        session_id: Option<&str>,
        assistant: Option<AssistantBinding>,
    ) -> Result<TurnOutcome> {
        if message.trim().is_empty() {
            return Err(EngineError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        // Lazy idle sweep; cheap no-op when nothing is stale.
        if let Err(error) = self.sweep_idle().await {
            tracing::warn!(%error, "idle session sweep failed");
        }

        let entry = {
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(
                sessions
                    .entry(user_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
            )
        };
        let mut slot = entry.lock().await;

        let mut state = self.resolve_session(user_id, session_id, slot.take()).await?;

        let user_context = match self.domain.user_context(user_id).await {
            Ok(context) => Some(context),
            Err(error) => {
                tracing::warn!(%error, "user context hydration failed");
                None
            }
        };

        let previous_intent = state.current_intent;
        let result = self
            .classifier
            .classify_intent(message, user_context.as_ref(), assistant.map(|a| a.tuning))
            .await;

        self.update_state(&mut state, &result);

        self.persist_turn(user_id, &state, message, &result, previous_intent)
            .await?;

        let session_context = serde_json::to_value(&state)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        let next_actions = self.dispatcher.plan(&result, &session_context);

        let auto_execute = assistant.is_none_or(|a| !a.requires_confirmation);
        let execution_result = if auto_execute {
            self.execute_planned(user_id, &next_actions).await
        } else {
            None
        };

        let outcome = TurnOutcome {
            requires_clarification: result.confidence < self.confidence_threshold,
            session_id: state.session_id.clone(),
            conversation_state: state.clone(),
            intent_result: result,
            next_actions,
            execution_result,
        };

        *slot = Some(state);
        Ok(outcome)
    }

    /// Mark a session completed; also drops any in-memory state bound to it.
    pub async fn complete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let completed = self
            .store
            .complete_session(session_id, user_id)
            .await
            .map_err(EngineError::Other)?;

        if completed {
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sessions.remove(user_id);
        }

        Ok(completed)
    }

    /// Abandon sessions idle past the configured window and evict their
    /// in-memory state.
    pub async fn sweep_idle(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.idle_timeout;
        let swept = self
            .store
            .sweep_idle(cutoff)
            .await
            .map_err(EngineError::Other)?;

        if swept > 0 {
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            sessions.retain(|_, entry| {
                entry
                    .try_lock()
                    .map(|state| {
                        state
                            .as_ref()
                            .is_none_or(|s| s.last_activity >= cutoff)
                    })
                    .unwrap_or(true)
            });
        }

        Ok(swept)
    }

    async fn resolve_session(
        &self,
        user_id: &str,
        requested: Option<&str>,
        in_memory: Option<SessionState>,
    ) -> Result<SessionState> {
        match requested {
            // Client continues a named session.
            Some(session_id) => {
                if let Some(state) = in_memory.filter(|s| s.session_id == session_id) {
                    return Ok(state);
                }
                match self
                    .store
                    .get_session(session_id, user_id)
                    .await
                    .map_err(EngineError::Other)?
                {
                    Some(row) if row.status == SessionStatus::Active => {
                        Ok(SessionState::from_row(&row))
                    }
                    // Session ended; the turn starts a replacement.
                    Some(_) => {
                        let row = self
                            .store
                            .create_session(user_id, None, SESSION_TYPE_CHAT, serde_json::json!({}))
                            .await
                            .map_err(EngineError::Other)?;
                        Ok(SessionState::fresh(row.id))
                    }
                    None => {
                        let row = self
                            .store
                            .create_session(
                                user_id,
                                Some(session_id),
                                SESSION_TYPE_CHAT,
                                serde_json::json!({}),
                            )
                            .await
                            .map_err(EngineError::Other)?;
                        Ok(SessionState::fresh(row.id))
                    }
                }
            }
            // No session supplied: reuse the live one, else start fresh.
            None => match in_memory {
                Some(state) => Ok(state),
                None => {
                    let row = self
                        .store
                        .create_session(
                            user_id,
                            Some(&Uuid::new_v4().to_string()),
                            SESSION_TYPE_CHAT,
                            serde_json::json!({}),
                        )
                        .await
                        .map_err(EngineError::Other)?;
                    Ok(SessionState::fresh(row.id))
                }
            },
        }
    }

    fn update_state(&self, state: &mut SessionState, result: &IntentResult) {
        state.turn_count += 1;
        state.current_intent = Some(result.intent);
        if result.confidence >= self.confidence_threshold {
            state.successful_intents += 1;
        } else {
            state.failed_intents += 1;
        }
        // Running mean over all classified turns in the session.
        state.avg_confidence +=
            (result.confidence - state.avg_confidence) / state.turn_count as f64;
        state.incomplete_entities = result
            .intent
            .required_entities()
            .iter()
            .filter(|entity| !result.entities.contains_key(**entity))
            .map(|entity| (*entity).to_string())
            .collect();
        state.last_activity = Utc::now();
    }

    async fn persist_turn(
        &self,
        user_id: &str,
        state: &SessionState,
        message: &str,
        result: &IntentResult,
        previous_intent: Option<IntentKind>,
    ) -> Result<()> {
        let row = ConversationSession {
            id: state.session_id.clone(),
            user_id: user_id.to_string(),
            session_type: SESSION_TYPE_CHAT.to_string(),
            status: SessionStatus::Active,
            current_intent: state.current_intent,
            turn_count: state.turn_count,
            successful_intents: state.successful_intents,
            failed_intents: state.failed_intents,
            avg_confidence: state.avg_confidence,
            incomplete_entities: state.incomplete_entities.clone(),
            context_data: serde_json::json!({}),
            started_at: state.last_activity,
            last_activity: state.last_activity,
            completed_at: None,
        };
        self.store
            .update_after_turn(&row)
            .await
            .map_err(EngineError::Other)?;

        self.store
            .append_log(
                user_id,
                &state.session_id,
                state.turn_count,
                message,
                result.intent,
                result.confidence,
                &result.entities,
                result.reasoning.as_deref(),
                result.fallback_used,
                result.processing_time_ms,
                previous_intent,
            )
            .await
            .map_err(EngineError::Other)?;

        Ok(())
    }

    async fn execute_planned(
        &self,
        user_id: &str,
        actions: &[NextAction],
    ) -> Option<serde_json::Value> {
        let NextAction::ExecuteAction { action, entities } = actions.first()? else {
            return None;
        };

        match self.dispatcher.execute(user_id, *action, entities).await {
            Ok(result) => Some(result),
            Err(error) => {
                tracing::warn!(intent = %action, %error, "action execution failed");
                Some(serde_json::json!({
                    "status": "error",
                    "detail": error.to_string(),
                }))
            }
        }
    }
}
