use super::response::{Completion, TokenUsage};
use super::traits::{ProviderClient, with_deadline};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiClient {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: Option<String>,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAiClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let base = base_url
            .map_or("https://api.openai.com", |u| u.trim_end_matches('/'))
            .to_string();
        Self {
            cached_auth_header: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| format!("Bearer {k}")),
            base_url: base,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_request(prompt: &str, model: &str, max_tokens: u32, temperature: f64) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
        }
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let auth_header =
            self.cached_auth_header
                .as_ref()
                .ok_or_else(|| ProviderError::MissingCredentials {
                    provider: "openai".to_string(),
                })?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: "openai".to_string(),
                message: super::sanitize_api_error(&e.to_string()),
            })?;

        if !response.status().is_success() {
            return Err(super::api_error("openai", response).await);
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| ProviderError::Transport {
                provider: "openai".to_string(),
                message: format!("response JSON decode failed: {e}"),
            })?;

        Self::into_completion(chat_response, &request.model)
    }

    fn into_completion(
        chat_response: ChatResponse,
        requested_model: &str,
    ) -> Result<Completion, ProviderError> {
        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Transport {
                provider: "openai".to_string(),
                message: "no choices in response".to_string(),
            })?;

        let content = choice
            .message
            .content
            .ok_or_else(|| ProviderError::Transport {
                provider: "openai".to_string(),
                message: "empty completion content".to_string(),
            })?;

        let usage = chat_response
            .usage
            .map_or(TokenUsage::new(0, 0), |u| {
                TokenUsage::new(u.prompt_tokens, u.completion_tokens)
            });

        let model = chat_response
            .model
            .unwrap_or_else(|| requested_model.to_string());

        let mut completion = Completion::new(content, usage, model);
        if let Some(reason) = choice.finish_reason {
            completion = completion.with_finish_reason(reason);
        }
        Ok(completion)
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn generate_completion(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let request = Self::build_request(prompt, model, max_tokens, temperature);
        with_deadline(timeout, self.call_api(&request)).await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
