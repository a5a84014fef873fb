use crate::ai::AiOrchestrator;
use crate::assistants::{AssistantService, AssistantStore};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::domain::{DomainService, SyncBackedDomainService};
use crate::gateway::AppState;
use crate::intent::{ActionDispatcher, ConversationFlowManager, IntentClassifier};
use crate::sync::{SyncEngine, SyncStore};
use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

/// Wire every service onto one SQLite pool and the configured provider chain.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let db_path = config.database_path();
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("open database {}", db_path.display()))?;

    build_state_with_pool(config, pool).await
}

/// Same wiring over a caller-supplied pool (tests use `sqlite::memory:`).
pub async fn build_state_with_pool(
    config: &Config,
    pool: sqlx::SqlitePool,
) -> Result<AppState> {
    let sync_store = Arc::new(SyncStore::new(pool.clone()).await?);
    let conversation_store = Arc::new(ConversationStore::new(pool.clone()).await?);
    let assistant_store = Arc::new(AssistantStore::new(pool).await?);

    let orchestrator = Arc::new(AiOrchestrator::from_config(config));
    let domain: Arc<dyn DomainService> =
        Arc::new(SyncBackedDomainService::new(Arc::clone(&sync_store)));

    let threshold = config.conversation.intent_confidence_threshold;
    let classifier = IntentClassifier::new(Arc::clone(&orchestrator), threshold);
    let dispatcher = ActionDispatcher::new(Arc::clone(&domain), threshold);
    let flow = Arc::new(ConversationFlowManager::new(
        classifier,
        dispatcher,
        conversation_store,
        domain,
        config.conversation.session_idle_timeout_minutes,
    ));

    let assistants = Arc::new(AssistantService::new(
        assistant_store,
        Arc::clone(&sync_store),
        config.conversation.max_assistant_profiles_per_user,
    ));
    let sync = Arc::new(SyncEngine::new(sync_store));

    Ok(AppState {
        flow,
        orchestrator,
        assistants,
        sync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn builds_state_on_in_memory_pool() {
        let config = Config::with_paths(PathBuf::new(), PathBuf::new());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let state = build_state_with_pool(&config, pool).await.unwrap();

        // Default config routes to the local mock provider.
        let health = state.orchestrator.health_check().await;
        assert_eq!(health["providers"]["local"], "healthy");
    }
}
