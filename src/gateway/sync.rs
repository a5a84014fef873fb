use super::{AppState, error_response, require_user};
use crate::sync::{BatchRequest, ObjectType};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::str::FromStr;

/// POST /sync/batch — apply client mutations in order; one result per op.
pub(super) async fn handle_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BatchRequest>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let results = state.sync.apply_batch(&user_id, &body).await;
    (StatusCode::OK, Json(results)).into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct DeltaQuery {
    /// Comma-separated object types; absent means all types.
    #[serde(default)]
    object_types: Option<String>,
}

/// GET /sync/delta/{since}?object_types=goal,task
pub(super) async fn handle_delta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(since): Path<i64>,
    Query(query): Query<DeltaQuery>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let filter = match query.object_types.as_deref() {
        None => None,
        Some(raw) => {
            let mut types = Vec::new();
            for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match ObjectType::from_str(name) {
                    Ok(object_type) => types.push(object_type),
                    Err(_) => {
                        let body =
                            serde_json::json!({"detail": format!("unknown object type: {name}")});
                        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
                    }
                }
            }
            Some(types)
        }
    };

    match state.sync.delta(&user_id, since, filter.as_deref()).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// GET /sync/status — per-type counts for observability.
pub(super) async fn handle_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.sync.status(&user_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ResolveBody {
    object_type: String,
    data: serde_json::Value,
}

/// POST /sync/resolve-conflict/{object_id} — install client-merged state.
pub(super) async fn handle_resolve_conflict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(object_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state
        .sync
        .resolve_conflict(&user_id, &object_id, &body.object_type, &body.data)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => error_response(&error),
    }
}
