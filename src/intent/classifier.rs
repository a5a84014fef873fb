use super::entities;
use super::types::{EntityMap, IntentKind, IntentResult};
use crate::ai::{AiOrchestrator, AssistantTuning, ConversationRequest};
use crate::error::EngineError;
use crate::prompts::{self, ConversationContext};
use regex::Regex;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

const DEFAULT_INTENT_TEMPERATURE: f64 = 0.1;
const CLASSIFICATION_MAX_TOKENS: u32 = 500;

/// Rule catalog for Stage-B classification. Messages are lowercased before
/// matching, so the patterns themselves stay lowercase.
static INTENT_PATTERNS: LazyLock<Vec<(IntentKind, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid intent pattern"))
            .collect::<Vec<_>>()
    };

    vec![
        (
            IntentKind::CreateGoal,
            compile(&[
                r"\b(create|add|set|make|new)\s+(a\s+)?goal\b",
                r"\bgoal\s*(is|:|to)\b",
                r"\bi\s+want\s+to\s+(achieve|accomplish|reach)\b",
                r"\bmy\s+goal\s+is\b",
                r"\bset\s+a\s+goal\b",
            ]),
        ),
        (
            IntentKind::CreateTask,
            compile(&[
                r"\b(create|add|make|new)\s+(a\s+)?task\b",
                r"\btask\s*(is|:|to)\b",
                r"\bi\s+need\s+to\s+(do|complete|finish)\b",
                r"\btodo\s*:",
                r"\bremind\s+me\s+to\b",
                r"\bschedule\s+(a\s+)?(meeting|call|appointment)\b",
            ]),
        ),
        (
            IntentKind::CreateProject,
            compile(&[
                r"\b(create|start|begin|new)\s+(a\s+)?project\b",
                r"\bproject\s*(is|:|to)\b",
                r"\bworking\s+on\s+a\s+project\b",
                r"\bproject\s+called\b",
            ]),
        ),
        (
            IntentKind::UpdateSettings,
            compile(&[
                r"\b(change|update|modify|set)\s+settings\b",
                r"\bpreferences\s+(to|for)\b",
                r"\bi\s+prefer\b",
                r"\bchange\s+my\s+(name|email|theme)\b",
                r"\bnotifications?\s+(on|off|enable|disable)\b",
            ]),
        ),
        (
            IntentKind::RateLifeArea,
            compile(&[
                r"\brate\s+(my\s+)?\w+\s+area\b",
                r"\b(health|career|relationships?|finance|personal)\s+(is|rate|score)\b",
                r"\bgive\s+\w+\s+a\s+rating\b",
                r"\bhow\s+(good|bad)\s+is\s+my\s+\w+\b",
            ]),
        ),
        (
            IntentKind::GetAdvice,
            compile(&[
                r"\b(advice|suggestion|help|guidance|recommend)\b",
                r"\bwhat\s+should\s+i\s+(do|try)\b",
                r"\bhow\s+(can|do)\s+i\s+\w+\b",
                r"\bany\s+ideas\s+(for|about)\b",
                r"\btips\s+(for|on)\b",
            ]),
        ),
    ]
});

/// Stage-A output contract. Anything that fails to parse into this shape
/// degrades to rule-based classification.
#[derive(Debug, Deserialize)]
struct ParsedClassification {
    intent: String,
    confidence: f64,
    #[serde(default)]
    entities: EntityMap,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Two-stage intent classifier: model-based with a strict JSON contract,
/// rule-based regex catalog as the fallback.
pub struct IntentClassifier {
    orchestrator: Arc<AiOrchestrator>,
    confidence_threshold: f64,
}

impl IntentClassifier {
    pub fn new(orchestrator: Arc<AiOrchestrator>, confidence_threshold: f64) -> Self {
        Self {
            orchestrator,
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Classify a message, merging extracted entities into the result.
    /// Never fails: Stage-A errors degrade to the rule catalog.
    pub async fn classify_intent(
        &self,
        message: &str,
        user_context: Option<&ConversationContext>,
        tuning: Option<AssistantTuning>,
    ) -> IntentResult {
        let start = Instant::now();

        let mut result = match self.llm_classify(message, user_context, tuning).await {
            Ok(stage_a) => {
                if stage_a.confidence < self.confidence_threshold {
                    tracing::debug!(
                        confidence = stage_a.confidence,
                        "model confidence below threshold, consulting rule catalog"
                    );
                    let stage_b = Self::rule_based_classify(message);
                    if stage_b.confidence > stage_a.confidence {
                        stage_b
                    } else {
                        stage_a
                    }
                } else {
                    stage_a
                }
            }
            Err(error) => {
                tracing::warn!(%error, "model classification failed, using rule catalog");
                Self::rule_based_classify(message)
            }
        };

        // Entity extraction runs regardless of which stage won. Stage-A
        // entities take precedence; extraction fills the gaps.
        let extracted = entities::extract_entities_now(message, result.intent);
        for (key, value) in extracted {
            result.entities.entry(key).or_insert(value);
        }

        result.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            intent = %result.intent,
            confidence = result.confidence,
            fallback = result.fallback_used,
            time_ms = result.processing_time_ms,
            "intent classified"
        );

        result
    }

    async fn llm_classify(
        &self,
        message: &str,
        user_context: Option<&ConversationContext>,
        tuning: Option<AssistantTuning>,
    ) -> Result<IntentResult, EngineError> {
        let system_prompt = prompts::classification_prompt(user_context)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        let prompt = prompts::chat_prompt(&system_prompt, message);

        let temperature = tuning
            .map(|t| t.intent_temperature)
            .unwrap_or(DEFAULT_INTENT_TEMPERATURE);

        let request = ConversationRequest {
            user_id: "intent-classifier".to_string(),
            message: message.to_string(),
            context: user_context.cloned(),
            tuning,
            classification: true,
            temperature: Some(temperature),
            max_tokens: Some(CLASSIFICATION_MAX_TOKENS),
            prompt: Some(prompt),
        };

        let response = self.orchestrator.chat(&request).await;
        if !response.is_success() {
            return Err(EngineError::Serialization(
                response
                    .error_message
                    .unwrap_or_else(|| "model call failed".to_string()),
            ));
        }

        let parsed: ParsedClassification = serde_json::from_str(&response.content)
            .map_err(|e| EngineError::Serialization(format!("unparseable model output: {e}")))?;

        let intent = IntentKind::from_str(&parsed.intent).unwrap_or(IntentKind::Unknown);

        Ok(IntentResult {
            intent,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            entities: parsed.entities,
            reasoning: parsed.reasoning,
            fallback_used: false,
            processing_time_ms: 0.0,
        })
    }

    /// Stage B: each matching pattern raises confidence by 0.1 from a 0.7
    /// base, capped at 0.95. Weak matches fall through to chat continuation.
    pub fn rule_based_classify(message: &str) -> IntentResult {
        let lowered = message.to_lowercase();
        let mut best_intent = IntentKind::Unknown;
        let mut best_confidence = 0.0_f64;

        for (intent, patterns) in INTENT_PATTERNS.iter() {
            let matches = patterns.iter().filter(|p| p.is_match(&lowered)).count();
            if matches == 0 {
                continue;
            }

            let confidence = (0.7 + matches as f64 * 0.1).min(0.95);
            if confidence > best_confidence {
                best_confidence = confidence;
                best_intent = *intent;
            }
        }

        if best_confidence < 0.5 {
            best_intent = IntentKind::ChatContinuation;
            best_confidence = 0.6;
        }

        IntentResult {
            intent: best_intent,
            confidence: best_confidence,
            entities: EntityMap::new(),
            reasoning: Some(format!("Rule-based match for {best_intent}")),
            fallback_used: true,
            processing_time_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::AiProvider;
    use crate::providers::mock::MockClient;
    use std::time::Duration;

    fn classifier() -> IntentClassifier {
        let orchestrator = Arc::new(AiOrchestrator::with_chain(
            vec![(AiProvider::Local, Box::new(MockClient::new()))],
            false,
            Duration::from_secs(3600),
        ));
        IntentClassifier::new(orchestrator, 0.85)
    }

    #[test]
    fn rules_match_create_goal() {
        let result = IntentClassifier::rule_based_classify("I want to achieve a marathon finish");
        assert_eq!(result.intent, IntentKind::CreateGoal);
        assert!(result.fallback_used);
        assert!(result.confidence >= 0.7);
    }

    #[test]
    fn rules_match_create_task_via_reminder() {
        let result = IntentClassifier::rule_based_classify("Remind me to water the plants");
        assert_eq!(result.intent, IntentKind::CreateTask);
    }

    #[test]
    fn multiple_pattern_matches_raise_confidence() {
        // Hits both "create a task" and "todo:".
        let one = IntentClassifier::rule_based_classify("create a task");
        let two = IntentClassifier::rule_based_classify("create a task, todo: water plants");
        assert!(two.confidence > one.confidence);
        assert!(two.confidence <= 0.95);
    }

    #[test]
    fn weak_signal_defaults_to_chat_continuation() {
        let result = IntentClassifier::rule_based_classify("hmm");
        assert_eq!(result.intent, IntentKind::ChatContinuation);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn classify_reminder_yields_confident_create_task() {
        let result = classifier()
            .classify_intent("Remind me to buy groceries tomorrow", None, None)
            .await;

        assert_eq!(result.intent, IntentKind::CreateTask);
        assert!(result.confidence >= 0.85);
        assert!(!result.fallback_used);
        assert_eq!(result.entities["title"], "buy groceries");
        assert!(result.entities.contains_key("due_date"));
        assert!(result.processing_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn classify_noise_falls_back_with_low_confidence() {
        let result = classifier().classify_intent("hmm", None, None).await;

        assert!(matches!(
            result.intent,
            IntentKind::ChatContinuation | IntentKind::Unknown
        ));
        assert!(result.confidence < 0.85);
        assert!(result.fallback_used);
    }

    #[tokio::test]
    async fn very_long_message_still_classifies() {
        let long_message = format!("remind me to review {}", "notes ".repeat(4000));
        let result = classifier().classify_intent(&long_message, None, None).await;

        assert_eq!(result.intent, IntentKind::CreateTask);
    }

    #[tokio::test]
    async fn stage_a_entities_survive_extraction_merge() {
        // The extractor would produce no life_area for this message; a
        // Stage-A entity must not be clobbered either way.
        let result = classifier()
            .classify_intent("Remind me to call the bank tomorrow", None, None)
            .await;

        assert_eq!(result.entities["title"], "call the bank");
        assert_eq!(result.entities["due_date"].as_str().unwrap().len(), 10);
    }
}
