use super::{AppState, error_response, require_user};
use crate::conversation::types::{FeedbackType, SessionStatus};
use crate::intent::{AssistantBinding, IntentKind};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct MessageBody {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    assistant_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    include_context: bool,
}

/// POST /conversation/message — the main conversational entry point.
pub(super) async fn handle_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    // Explicit assistant, else the caller's default profile.
    let profile = match &body.assistant_id {
        Some(assistant_id) => match state.assistants.get_profile(&user_id, assistant_id).await {
            Ok(profile) => Some(profile),
            Err(error) => return error_response(&error),
        },
        None => match state.assistants.default_profile(&user_id).await {
            Ok(profile) => profile,
            Err(error) => return error_response(&error),
        },
    };

    let binding = profile.as_ref().map(|p| AssistantBinding {
        tuning: p.tuning(),
        requires_confirmation: p.requires_confirmation,
    });

    match state
        .flow
        .process_message(&user_id, &body.message, body.session_id.as_deref(), binding)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ClassifyBody {
    message: String,
}

/// POST /conversation/classify — classification only, no flow management.
pub(super) async fn handle_classify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ClassifyBody>,
) -> Response {
    if let Err(response) = require_user(&headers) {
        return response;
    }

    if body.message.trim().is_empty() {
        let body = serde_json::json!({"detail": "message must not be empty"});
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let result = state
        .flow
        .classifier()
        .classify_intent(&body.message, None, None)
        .await;

    (StatusCode::OK, Json(result)).into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct FeedbackBody {
    conversation_log_id: String,
    corrected_intent: IntentKind,
    feedback_type: FeedbackType,
    #[serde(default)]
    comment: Option<String>,
}

/// POST /conversation/feedback — record a classification correction.
pub(super) async fn handle_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FeedbackBody>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let log = match state
        .flow
        .store()
        .get_log(&body.conversation_log_id, &user_id)
        .await
    {
        Ok(Some(log)) => log,
        Ok(None) => {
            let body = serde_json::json!({"detail": "conversation log not found"});
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
        Err(error) => return error_response(&error.into()),
    };

    match state
        .flow
        .store()
        .insert_feedback(
            &user_id,
            &log,
            body.corrected_intent,
            body.feedback_type,
            body.comment.as_deref(),
        )
        .await
    {
        Ok(feedback) => {
            tracing::info!(
                user_id,
                original = %feedback.original_intent,
                corrected = %feedback.corrected_intent,
                "intent feedback received"
            );
            (StatusCode::OK, Json(feedback)).into_response()
        }
        Err(error) => error_response(&error.into()),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    status: Option<String>,
}

fn default_limit() -> usize {
    20
}

/// GET /conversation/sessions — the caller's sessions, most recent first.
pub(super) async fn handle_list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SessionsQuery>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match SessionStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                let body = serde_json::json!({"detail": format!("unknown status: {raw}")});
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
        },
    };

    match state
        .flow
        .store()
        .list_sessions(&user_id, query.limit.min(100), query.offset, status)
        .await
    {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(error) => error_response(&error.into()),
    }
}

/// GET /conversation/sessions/{id}
pub(super) async fn handle_get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.flow.store().get_session(&session_id, &user_id).await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => {
            let body = serde_json::json!({"detail": "session not found"});
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(error) => error_response(&error.into()),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LogsQuery {
    #[serde(default = "default_logs_limit")]
    limit: usize,
}

fn default_logs_limit() -> usize {
    50
}

/// GET /conversation/sessions/{id}/logs — turn-by-turn log.
pub(super) async fn handle_session_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    // Session ownership gates log access.
    match state.flow.store().get_session(&session_id, &user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let body = serde_json::json!({"detail": "session not found"});
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
        Err(error) => return error_response(&error.into()),
    }

    match state
        .flow
        .store()
        .list_logs(&session_id, &user_id, query.limit.min(200))
        .await
    {
        Ok(logs) => (StatusCode::OK, Json(logs)).into_response(),
        Err(error) => error_response(&error.into()),
    }
}

/// POST /conversation/sessions/{id}/complete — terminal action.
pub(super) async fn handle_complete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.flow.complete_session(&user_id, &session_id).await {
        Ok(true) => {
            (StatusCode::OK, Json(serde_json::json!({"status": "completed"}))).into_response()
        }
        Ok(false) => {
            let body = serde_json::json!({"detail": "no active session with that id"});
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(error) => error_response(&error),
    }
}
