use crate::prompts::{ConversationContext, GoalContext, TaskContext};
use crate::providers::{AiProvider, TokenUsage};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// What a request is for; drives model-config selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UseCase {
    GoalDecomposition,
    TaskGeneration,
    Conversation,
}

/// Per-attempt model parameters. One of these is derived for every provider
/// in the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: AiProvider,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub cost_per_token: Option<f64>,
}

impl ModelConfig {
    /// Default model configuration for a use case on a given provider.
    pub fn for_use_case(use_case: UseCase, provider: AiProvider) -> Self {
        let (max_tokens, temperature, timeout_secs) = match use_case {
            UseCase::GoalDecomposition => (1200, 0.3, 30),
            UseCase::TaskGeneration => (800, 0.4, 30),
            UseCase::Conversation => (600, 0.7, 20),
        };

        let (model_name, cost_per_token) = match provider {
            AiProvider::OpenAi => ("gpt-4o-mini", Some(2e-6)),
            AiProvider::Anthropic => ("claude-3-5-haiku-latest", Some(3e-6)),
            AiProvider::Local => ("mock-model", None),
        };

        Self {
            provider,
            model_name: model_name.to_string(),
            max_tokens,
            temperature,
            timeout_secs,
            cost_per_token,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Temperature/model overrides carried by an assistant profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssistantTuning {
    pub dialogue_temperature: f64,
    pub intent_temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub provider: Option<AiProvider>,
    pub finish_reason: Option<String>,
    pub cache_hit: bool,
}

/// Result envelope for every orchestrated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    pub content: String,
    pub metadata: ResponseMetadata,
    pub token_usage: Option<TokenUsage>,
    pub cost_estimate: f64,
    pub model_used: Option<String>,
    /// Wall-clock seconds spent on this request.
    pub processing_time: f64,
    pub error_message: Option<String>,
}

impl AiResponse {
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Error,
            content: String::new(),
            metadata: ResponseMetadata::default(),
            token_usage: None,
            cost_estimate: 0.0,
            model_used: None,
            processing_time: 0.0,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

// ─── Typed requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<ConversationContext>,
    #[serde(default)]
    pub tuning: Option<AssistantTuning>,
    /// True when this conversation call is an intent-classification probe;
    /// selects the intent temperature from the tuning.
    #[serde(default)]
    pub classification: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Pre-built prompt overriding the default chat prompt (used by the
    /// classifier, which supplies its own system prompt).
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDecompositionRequest {
    pub user_id: String,
    pub goal_description: String,
    #[serde(default)]
    pub context: GoalContext,
    #[serde(default)]
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGenerationRequest {
    pub user_id: String,
    pub context: TaskContext,
}

/// Goal decomposition with the light-weight structure parsed out of the
/// completion text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDecompositionResult {
    #[serde(flatten)]
    pub response: AiResponse,
    pub suggested_tasks: Vec<String>,
    pub overall_timeline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGenerationResult {
    #[serde(flatten)]
    pub response: AiResponse,
    pub generated_tasks: Vec<String>,
}

// ─── Metrics ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_cost: f64,
    pub average_processing_time: f64,
}

impl ProcessingMetrics {
    pub fn record(&mut self, success: bool, processing_time: f64, cost: f64) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.total_cost += cost;
        // Running mean over all requests.
        self.average_processing_time += (processing_time - self.average_processing_time)
            / self.total_requests as f64;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

pub fn create_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Conservative, idempotent cleanup of provider output: trims surrounding
/// whitespace and strips ASCII control characters other than newline and tab.
pub fn sanitize_model_output(content: &str) -> String {
    content
        .chars()
        .filter(|c| !c.is_ascii_control() || matches!(c, '\n' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}
