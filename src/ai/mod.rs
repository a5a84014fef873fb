pub mod cache;
pub mod models;
pub mod orchestrator;

pub use cache::ResponseCache;
pub use models::{
    AiResponse, AssistantTuning, ConversationRequest, GoalDecompositionRequest,
    GoalDecompositionResult, ModelConfig, ProcessingMetrics, ResponseStatus,
    TaskGenerationRequest, TaskGenerationResult, UseCase, create_request_id,
};
pub use orchestrator::AiOrchestrator;
