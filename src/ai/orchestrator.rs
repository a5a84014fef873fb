use super::cache::ResponseCache;
use super::models::{
    AiResponse, ConversationRequest, GoalDecompositionRequest, GoalDecompositionResult,
    ModelConfig, ProcessingMetrics, ResponseMetadata, ResponseStatus, TaskGenerationRequest,
    TaskGenerationResult, UseCase, create_request_id, sanitize_model_output,
};
use crate::config::Config;
use crate::error::ProviderError;
use crate::prompts;
use crate::providers::{self, AiProvider, ProviderClient, sanitize_api_error};
use regex::Regex;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Per-request parameter overrides layered on top of the use-case defaults.
#[derive(Debug, Clone, Default)]
struct Overrides {
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

/// Routes typed AI requests through cache lookup, the provider fallback
/// chain, content sanitization and cost accounting.
///
/// Every public operation resolves to an [`AiResponse`]; provider failures
/// are absorbed into `status = error` and never escape as panics or errors.
pub struct AiOrchestrator {
    chain: Vec<(AiProvider, Box<dyn ProviderClient>)>,
    cache: ResponseCache,
    enable_caching: bool,
    metrics: Mutex<ProcessingMetrics>,
}

impl AiOrchestrator {
    pub fn from_config(config: &Config) -> Self {
        let primary = AiProvider::from_str(&config.ai.provider).unwrap_or_else(|_| {
            tracing::warn!(
                provider = %config.ai.provider,
                "unknown AI provider in config, falling back to local"
            );
            AiProvider::Local
        });

        Self::with_chain(
            providers::create_chain(primary, &config.ai),
            config.ai.enable_caching,
            Duration::from_secs(config.ai.cache_ttl_seconds),
        )
    }

    /// Build from an explicit provider chain. The chain must not be empty.
    pub fn with_chain(
        chain: Vec<(AiProvider, Box<dyn ProviderClient>)>,
        enable_caching: bool,
        cache_ttl: Duration,
    ) -> Self {
        assert!(!chain.is_empty(), "provider chain must not be empty");
        Self {
            chain,
            cache: ResponseCache::new(cache_ttl),
            enable_caching,
            metrics: Mutex::new(ProcessingMetrics::default()),
        }
    }

    // ── Typed operations ────────────────────────────────────────────────

    /// Handle a conversational request. Uses the caller-supplied prompt when
    /// present (the classifier builds its own), otherwise wraps the message
    /// in the chat system prompt.
    pub async fn chat(&self, request: &ConversationRequest) -> AiResponse {
        let start = Instant::now();
        let request_id = create_request_id();

        let prompt = match &request.prompt {
            Some(prompt) => prompt.clone(),
            None => {
                let preferences = request
                    .context
                    .as_ref()
                    .map(|c| c.preferences.clone())
                    .unwrap_or(serde_json::Value::Null);
                match prompts::chat_system_prompt(&preferences, &[]) {
                    Ok(system) => prompts::chat_prompt(&system, &request.message),
                    Err(error) => {
                        return self.finish(request_id, start, Err(render_error(&error)));
                    }
                }
            }
        };

        let temperature = request.temperature.or_else(|| {
            request.tuning.map(|tuning| {
                if request.classification {
                    tuning.intent_temperature
                } else {
                    tuning.dialogue_temperature
                }
            })
        });
        let overrides = Overrides {
            temperature,
            max_tokens: request.max_tokens,
        };

        let result = self
            .generate_response(&prompt, UseCase::Conversation, &request_id, &overrides)
            .await;
        self.finish(request_id, start, result)
    }

    /// Decompose a goal into suggested tasks.
    pub async fn decompose_goal(
        &self,
        request: &GoalDecompositionRequest,
    ) -> GoalDecompositionResult {
        let start = Instant::now();
        let request_id = create_request_id();

        let result = match prompts::decompose_goal_prompt(
            &request.goal_description,
            &request.context,
            request.additional_context.as_deref(),
        ) {
            Ok(prompt) => {
                self.generate_response(
                    &prompt,
                    UseCase::GoalDecomposition,
                    &request_id,
                    &Overrides::default(),
                )
                .await
            }
            Err(error) => Err(render_error(&error)),
        };

        let response = self.finish(request_id, start, result);
        let (suggested_tasks, overall_timeline) = parse_task_outline(&response.content);
        GoalDecompositionResult {
            response,
            suggested_tasks,
            overall_timeline,
        }
    }

    /// Suggest follow-up tasks for an in-flight goal.
    pub async fn generate_tasks(&self, request: &TaskGenerationRequest) -> TaskGenerationResult {
        let start = Instant::now();
        let request_id = create_request_id();

        let result = match prompts::next_tasks_prompt(&request.context) {
            Ok(prompt) => {
                self.generate_response(
                    &prompt,
                    UseCase::TaskGeneration,
                    &request_id,
                    &Overrides::default(),
                )
                .await
            }
            Err(error) => Err(render_error(&error)),
        };

        let response = self.finish(request_id, start, result);
        let (generated_tasks, _) = parse_task_outline(&response.content);
        TaskGenerationResult {
            response,
            generated_tasks,
        }
    }

    pub fn metrics(&self) -> ProcessingMetrics {
        self.metrics_mut().clone()
    }

    pub async fn sweep_cache(&self) -> usize {
        self.cache.sweep().await
    }

    /// Probe every provider in the chain with a minimal completion and report
    /// overall health alongside cache and metrics summaries.
    pub async fn health_check(&self) -> serde_json::Value {
        let mut provider_health = serde_json::Map::new();
        let mut degraded = false;

        for (provider, client) in &self.chain {
            let probe = client
                .generate_completion(
                    "Say OK if you are working.",
                    &ModelConfig::for_use_case(UseCase::Conversation, *provider).model_name,
                    8,
                    0.1,
                    Duration::from_secs(10),
                )
                .await;

            let status = match probe {
                Ok(_) => "healthy".to_string(),
                Err(error) => {
                    degraded = true;
                    format!("error: {}", sanitize_api_error(&error.to_string()))
                }
            };
            provider_health.insert(provider.to_string(), serde_json::Value::String(status));
        }

        let metrics = self.metrics();
        serde_json::json!({
            "status": if degraded { "degraded" } else { "healthy" },
            "providers": provider_health,
            "cache_size": self.cache.len().await,
            "metrics": {
                "total_requests": metrics.total_requests,
                "success_rate": metrics.success_rate(),
                "average_response_time": metrics.average_processing_time,
            },
        })
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn attempt_config(
        &self,
        use_case: UseCase,
        provider: AiProvider,
        overrides: &Overrides,
    ) -> ModelConfig {
        let mut config = ModelConfig::for_use_case(use_case, provider);
        if let Some(temperature) = overrides.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            config.max_tokens = max_tokens;
        }
        config
    }

    async fn generate_response(
        &self,
        prompt: &str,
        use_case: UseCase,
        request_id: &str,
        overrides: &Overrides,
    ) -> Result<AiResponse, ProviderError> {
        let primary = self.chain[0].0;
        let request_config = self.attempt_config(use_case, primary, overrides);

        if !self.enable_caching {
            return self.run_chain(prompt, use_case, request_id, overrides).await;
        }

        let fingerprint = ResponseCache::fingerprint(prompt, &request_config);
        if let Some(hit) = self.cached(&fingerprint, request_id).await {
            return Ok(hit);
        }

        // Miss: serialize provider work per fingerprint, then re-check —
        // a concurrent caller may have installed the entry while we waited.
        let guard = self.cache.begin_flight(&fingerprint).await;
        let lock = guard.lock().await;

        if let Some(hit) = self.cached(&fingerprint, request_id).await {
            drop(lock);
            self.cache.finish_flight(&fingerprint).await;
            return Ok(hit);
        }

        let result = self.run_chain(prompt, use_case, request_id, overrides).await;
        if let Ok(response) = &result {
            self.cache.set(&fingerprint, response.clone()).await;
        }

        drop(lock);
        self.cache.finish_flight(&fingerprint).await;
        result
    }

    async fn cached(&self, fingerprint: &str, request_id: &str) -> Option<AiResponse> {
        let mut hit = self.cache.get(fingerprint).await?;
        hit.metadata.cache_hit = true;
        hit.request_id = request_id.to_string();
        Some(hit)
    }

    async fn run_chain(
        &self,
        prompt: &str,
        use_case: UseCase,
        request_id: &str,
        overrides: &Overrides,
    ) -> Result<AiResponse, ProviderError> {
        let mut last_error = ProviderError::Unavailable {
            provider: "none".to_string(),
        };

        for (provider, client) in &self.chain {
            let config = self.attempt_config(use_case, *provider, overrides);
            match client
                .generate_completion(
                    prompt,
                    &config.model_name,
                    config.max_tokens,
                    config.temperature,
                    config.timeout(),
                )
                .await
            {
                Ok(completion) => {
                    let cost = config
                        .cost_per_token
                        .map_or(0.0, |per_token| {
                            completion.usage.total_tokens as f64 * per_token
                        });

                    return Ok(AiResponse {
                        request_id: request_id.to_string(),
                        status: ResponseStatus::Success,
                        content: sanitize_model_output(&completion.content),
                        metadata: ResponseMetadata {
                            provider: Some(*provider),
                            finish_reason: completion.finish_reason,
                            cache_hit: false,
                        },
                        token_usage: Some(completion.usage),
                        cost_estimate: cost,
                        model_used: Some(completion.model),
                        processing_time: 0.0,
                        error_message: None,
                    });
                }
                Err(error) => {
                    tracing::warn!(provider = %provider, %error, "provider attempt failed");
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    fn finish(
        &self,
        request_id: String,
        start: Instant,
        result: Result<AiResponse, ProviderError>,
    ) -> AiResponse {
        let elapsed = start.elapsed().as_secs_f64();
        match result {
            Ok(mut response) => {
                response.processing_time = elapsed;
                self.metrics_mut().record(true, elapsed, response.cost_estimate);
                response
            }
            Err(error) => {
                tracing::error!(%error, "all providers in the chain failed");
                let mut response =
                    AiResponse::error(request_id, sanitize_api_error(&error.to_string()));
                response.processing_time = elapsed;
                self.metrics_mut().record(false, elapsed, 0.0);
                response
            }
        }
    }

    fn metrics_mut(&self) -> MutexGuard<'_, ProcessingMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn render_error(error: &anyhow::Error) -> ProviderError {
    ProviderError::Transport {
        provider: "prompt".to_string(),
        message: error.to_string(),
    }
}

static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\d+\.\s+\*\*(?P<title>[^*]+)\*\*").expect("valid task-line pattern")
});

/// Pull numbered `**bold**` task titles and the overall-timeline line out of
/// a completion. Models that answer free-form simply yield empty structure.
fn parse_task_outline(content: &str) -> (Vec<String>, Option<String>) {
    let tasks = TASK_LINE
        .captures_iter(content)
        .map(|cap| cap["title"].trim().to_string())
        .collect();

    let timeline = content
        .lines()
        .find(|line| line.to_lowercase().contains("overall timeline"))
        .and_then(|line| line.split(':').nth(1))
        .map(|value| value.trim().trim_matches('*').trim().to_string())
        .filter(|value| !value.is_empty());

    (tasks, timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::models::ConversationRequest;
    use crate::providers::mock::MockClient;
    use crate::providers::response::{Completion, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderClient for CountingClient {
        async fn generate_completion(
            &self,
            _prompt: &str,
            model: &str,
            _max_tokens: u32,
            _temperature: f64,
            _timeout: Duration,
        ) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion::new("counted", TokenUsage::new(10, 5), model))
        }

        fn name(&self) -> &'static str {
            "openai"
        }
    }

    struct FailingClient;

    #[async_trait]
    impl ProviderClient for FailingClient {
        async fn generate_completion(
            &self,
            _prompt: &str,
            _model: &str,
            _max_tokens: u32,
            _temperature: f64,
            _timeout: Duration,
        ) -> Result<Completion, ProviderError> {
            Err(ProviderError::Unavailable {
                provider: "openai".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "openai"
        }
    }

    fn conversation(message: &str) -> ConversationRequest {
        ConversationRequest {
            user_id: "user-1".into(),
            message: message.into(),
            ..ConversationRequest::default()
        }
    }

    fn local_orchestrator(enable_caching: bool) -> AiOrchestrator {
        AiOrchestrator::with_chain(
            vec![(AiProvider::Local, Box::new(MockClient::new()))],
            enable_caching,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn chat_succeeds_against_local_provider() {
        let orchestrator = local_orchestrator(false);
        let response = orchestrator.chat(&conversation("hello there friend")).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.metadata.provider, Some(AiProvider::Local));
        assert!(!response.content.is_empty());
        assert!(response.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn identical_requests_hit_cache_and_call_provider_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AiOrchestrator::with_chain(
            vec![(
                AiProvider::OpenAi,
                Box::new(CountingClient {
                    calls: Arc::clone(&calls),
                }),
            )],
            true,
            Duration::from_secs(3600),
        );

        let first = orchestrator.chat(&conversation("cache me")).await;
        let second = orchestrator.chat(&conversation("cache me")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.metadata.cache_hit);
        assert!(second.metadata.cache_hit);
        assert_eq!(first.content, second.content);
    }

    #[tokio::test]
    async fn failing_primary_falls_back_to_local() {
        let orchestrator = AiOrchestrator::with_chain(
            vec![
                (AiProvider::OpenAi, Box::new(FailingClient)),
                (AiProvider::Local, Box::new(MockClient::new())),
            ],
            false,
            Duration::from_secs(3600),
        );

        let response = orchestrator.chat(&conversation("fall back please")).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.metadata.provider, Some(AiProvider::Local));
    }

    #[tokio::test]
    async fn all_providers_failing_yields_error_response() {
        let orchestrator = AiOrchestrator::with_chain(
            vec![(AiProvider::OpenAi, Box::new(FailingClient))],
            false,
            Duration::from_secs(3600),
        );

        let response = orchestrator.chat(&conversation("doomed")).await;

        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.error_message.as_deref().is_some_and(|m| !m.is_empty()));

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn cost_is_tokens_times_rate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = AiOrchestrator::with_chain(
            vec![(
                AiProvider::OpenAi,
                Box::new(CountingClient { calls }),
            )],
            false,
            Duration::from_secs(3600),
        );

        let response = orchestrator.chat(&conversation("how much")).await;

        // CountingClient reports 15 total tokens; openai conversation config
        // carries a cost per token.
        let expected = 15.0
            * ModelConfig::for_use_case(UseCase::Conversation, AiProvider::OpenAi)
                .cost_per_token
                .unwrap();
        assert!((response.cost_estimate - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn decompose_goal_parses_task_outline() {
        let orchestrator = local_orchestrator(false);
        let result = orchestrator
            .decompose_goal(&GoalDecompositionRequest {
                user_id: "user-1".into(),
                goal_description: "learn woodworking".into(),
                context: crate::prompts::GoalContext::default(),
                additional_context: None,
            })
            .await;

        assert_eq!(result.response.status, ResponseStatus::Success);
        assert_eq!(
            result.suggested_tasks,
            vec!["Research", "Planning", "Implementation"]
        );
        assert_eq!(result.overall_timeline.as_deref(), Some("3-4 weeks"));
    }

    #[tokio::test]
    async fn health_check_reports_local_healthy() {
        let orchestrator = local_orchestrator(false);
        let health = orchestrator.health_check().await;

        assert_eq!(health["status"], "healthy");
        assert_eq!(health["providers"]["local"], "healthy");
    }

    #[test]
    fn parse_task_outline_handles_free_form_text() {
        let (tasks, timeline) = parse_task_outline("just some prose without structure");
        assert!(tasks.is_empty());
        assert!(timeline.is_none());
    }
}
