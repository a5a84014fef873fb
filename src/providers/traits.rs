use super::response::Completion;
use crate::error::ProviderError;
use async_trait::async_trait;
use std::time::Duration;

/// Uniform completion interface over the generative-model vendors.
///
/// Implementations own their deadline: a call that exceeds `timeout` must
/// resolve to `ProviderError::Timeout` rather than hang, so the orchestrator
/// can move on to the next provider in the fallback chain.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn generate_completion(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Completion, ProviderError>;

    /// Stable vendor name used in logs and response metadata.
    fn name(&self) -> &'static str;
}

/// Bound `fut` by `timeout`, mapping elapsed deadlines to the provider error.
pub(super) async fn with_deadline<F>(
    timeout: Duration,
    fut: F,
) -> Result<Completion, ProviderError>
where
    F: std::future::Future<Output = Result<Completion, ProviderError>> + Send,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::response::TokenUsage;

    #[tokio::test]
    async fn with_deadline_passes_through_fast_futures() {
        let result = with_deadline(Duration::from_secs(5), async {
            Ok(Completion::new("ok", TokenUsage::new(1, 1), "m"))
        })
        .await;

        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn with_deadline_times_out_slow_futures() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Completion::new("late", TokenUsage::new(1, 1), "m"))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
    }
}
