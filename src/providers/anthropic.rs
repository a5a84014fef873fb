use super::response::{Completion, TokenUsage};
use super::traits::{ProviderClient, with_deadline};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ResponseContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let base = base_url
            .map_or("https://api.anthropic.com", |u| u.trim_end_matches('/'))
            .to_string();
        Self {
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned),
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

    async fn call_api(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredentials {
                provider: "anthropic".to_string(),
            })?;

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: "anthropic".to_string(),
                message: super::sanitize_api_error(&e.to_string()),
            })?;

        if !response.status().is_success() {
            return Err(super::api_error("anthropic", response).await);
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| ProviderError::Transport {
                provider: "anthropic".to_string(),
                message: format!("response JSON decode failed: {e}"),
            })?;

        Self::into_completion(chat_response, &request.model)
    }

    fn into_completion(
        chat_response: ChatResponse,
        requested_model: &str,
    ) -> Result<Completion, ProviderError> {
        let content = chat_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text),
                ResponseContentBlock::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(ProviderError::Transport {
                provider: "anthropic".to_string(),
                message: "empty completion content".to_string(),
            });
        }

        let usage = chat_response
            .usage
            .map_or(TokenUsage::new(0, 0), |u| {
                TokenUsage::new(u.input_tokens, u.output_tokens)
            });

        let model = chat_response
            .model
            .unwrap_or_else(|| requested_model.to_string());

        let mut completion = Completion::new(content, usage, model);
        if let Some(reason) = chat_response.stop_reason {
            completion = completion.with_finish_reason(reason);
        }
        Ok(completion)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn generate_completion(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: model.to_string(),
            max_tokens,
            temperature,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        };
        with_deadline(timeout, self.call_api(&request)).await
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fails_without_key() {
        let client = AnthropicClient::new(None);
        let result = client
            .generate_completion(
                "hello",
                "claude-3-5-sonnet-latest",
                100,
                0.7,
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::MissingCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn maps_success_response_and_sums_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Hello!"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "model": "claude-3-5-sonnet-20241022"
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url(Some("sk-ant-test"), Some(&server.uri()));
        let completion = client
            .generate_completion(
                "hello",
                "claude-3-5-sonnet-latest",
                100,
                0.7,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.usage.prompt_tokens, 10);
        assert_eq!(completion.usage.completion_tokens, 5);
        assert_eq!(completion.usage.total_tokens, 15);
        assert_eq!(completion.finish_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn unsupported_blocks_are_skipped() {
        let json = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "answer"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        });
        let response: ChatResponse = serde_json::from_value(json).unwrap();

        let completion =
            AnthropicClient::into_completion(response, "claude-3-5-sonnet-latest").unwrap();
        assert_eq!(completion.content, "answer");
    }

    #[tokio::test]
    async fn maps_api_error_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url(Some("sk-ant-test"), Some(&server.uri()));
        let result = client
            .generate_completion(
                "hello",
                "claude-3-5-sonnet-latest",
                100,
                0.7,
                Duration::from_secs(5),
            )
            .await;

        match result {
            Err(ProviderError::Api { status, .. }) => assert_eq!(status, 529),
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
