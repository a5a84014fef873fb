//! Axum-based HTTP gateway for the conversation, assistant and sync APIs.
//!
//! Transport concerns only: identity extraction, request shaping, error
//! mapping, body limits and timeouts. All behavior lives in the services
//! carried by [`AppState`].

mod assistants;
mod conversation;
mod sync;

use crate::ai::AiOrchestrator;
use crate::assistants::AssistantService;
use crate::error::EngineError;
use crate::intent::ConversationFlowManager;
use crate::sync::SyncEngine;
use anyhow::Result;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<ConversationFlowManager>,
    pub orchestrator: Arc<AiOrchestrator>,
    pub assistants: Arc<AssistantService>,
    pub sync: Arc<SyncEngine>,
}

/// Opaque caller identity. Authentication itself is an external collaborator;
/// the gateway only requires a stable user id.
pub(crate) fn require_user(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            let body = serde_json::json!({"detail": "missing X-User-Id header"});
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        })
}

/// Map engine errors onto the transport error envelope.
pub(crate) fn error_response(error: &EngineError) -> Response {
    let status = match error {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientPermission(_) => StatusCode::FORBIDDEN,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(%error, "request failed");
        // Never leak internals through the envelope.
        let body = serde_json::json!({"detail": "internal error"});
        return (status, Json(body)).into_response();
    }

    let body = serde_json::json!({"detail": error.to_string()});
    (status, Json(body)).into_response()
}

/// GET /health — orchestrator, cache and provider liveness.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.health_check().await)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        // ── Conversation ────────────────────────────────────────────────
        .route("/conversation/message", post(conversation::handle_message))
        .route("/conversation/classify", post(conversation::handle_classify))
        .route("/conversation/feedback", post(conversation::handle_feedback))
        .route("/conversation/sessions", get(conversation::handle_list_sessions))
        .route(
            "/conversation/sessions/{id}",
            get(conversation::handle_get_session),
        )
        .route(
            "/conversation/sessions/{id}/logs",
            get(conversation::handle_session_logs),
        )
        .route(
            "/conversation/sessions/{id}/complete",
            post(conversation::handle_complete_session),
        )
        // ── Assistants ──────────────────────────────────────────────────
        .route(
            "/assistants",
            get(assistants::handle_list).post(assistants::handle_create),
        )
        .route("/assistants/versions", get(assistants::handle_versions))
        .route(
            "/assistants/{id}",
            get(assistants::handle_get)
                .patch(assistants::handle_update)
                .delete(assistants::handle_delete),
        )
        .route("/assistants/{id}/share", post(assistants::handle_share))
        .route(
            "/assistants/{id}/permissions",
            get(assistants::handle_list_permissions),
        )
        .route(
            "/assistants/{id}/permissions/{user_id}",
            delete(assistants::handle_revoke),
        )
        .route(
            "/assistants/{id}/permission-level",
            get(assistants::handle_permission_level),
        )
        .route("/permissions/cleanup", post(assistants::handle_cleanup))
        // ── Sync ────────────────────────────────────────────────────────
        .route("/sync/batch", post(sync::handle_batch))
        .route("/sync/delta/{since}", get(sync::handle_delta))
        .route("/sync/status", get(sync::handle_status))
        .route(
            "/sync/resolve-conflict/{object_id}",
            post(sync::handle_resolve_conflict),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
}

/// Bind and serve the gateway.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
