use super::{AppState, error_response, require_user};
use crate::assistants::{AssistantProfileUpdate, NewAssistantProfile, PermissionLevel};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// POST /assistants
pub(super) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewAssistantProfile>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.assistants.create_profile(&user_id, &body).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// GET /assistants — owned, public and granted profiles.
pub(super) async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.assistants.list_accessible(&user_id).await {
        Ok(profiles) => (StatusCode::OK, Json(profiles)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// GET /assistants/{id}
pub(super) async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.assistants.get_profile(&user_id, &assistant_id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// PATCH /assistants/{id}
pub(super) async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
    Json(body): Json<AssistantProfileUpdate>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state
        .assistants
        .update_profile(&user_id, &assistant_id, &body)
        .await
    {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// DELETE /assistants/{id}
pub(super) async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.assistants.delete_profile(&user_id, &assistant_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ShareBody {
    target_user_id: String,
    permission_level: PermissionLevel,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// POST /assistants/{id}/share
pub(super) async fn handle_share(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
    Json(body): Json<ShareBody>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state
        .assistants
        .share(
            &assistant_id,
            &body.target_user_id,
            body.permission_level,
            &user_id,
            body.expires_at,
        )
        .await
    {
        Ok(permission) => (StatusCode::OK, Json(permission)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// DELETE /assistants/{id}/permissions/{user_id}
pub(super) async fn handle_revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((assistant_id, target_user_id)): Path<(String, String)>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state
        .assistants
        .revoke(&assistant_id, &target_user_id, &user_id)
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => {
            let body = serde_json::json!({"detail": "no permission for that user"});
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// GET /assistants/{id}/permissions — requires admin.
pub(super) async fn handle_list_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state
        .assistants
        .list_permissions(&user_id, &assistant_id)
        .await
    {
        Ok(permissions) => (StatusCode::OK, Json(permissions)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// GET /assistants/{id}/permission-level — the caller's effective level.
pub(super) async fn handle_permission_level(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assistant_id): Path<String>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.assistants.get_level(&user_id, &assistant_id).await {
        Ok(level) => (
            StatusCode::OK,
            Json(serde_json::json!({"permission_level": level})),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VersionsQuery {
    /// Comma-separated assistant ids; absent means all accessible.
    #[serde(default)]
    ids: Option<String>,
}

/// GET /assistants/versions?ids=a,b — version cursors for client sync.
pub(super) async fn handle_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VersionsQuery>,
) -> Response {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let ids: Option<Vec<String>> = query.ids.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    });

    match state.assistants.versions(&user_id, ids.as_deref()).await {
        Ok(versions) => {
            let body: Vec<serde_json::Value> = versions
                .into_iter()
                .map(|(assistant_id, version)| {
                    serde_json::json!({"assistant_id": assistant_id, "version": version})
                })
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// POST /permissions/cleanup — sweep expired grants.
pub(super) async fn handle_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_user(&headers) {
        return response;
    }

    match state.assistants.sweep_expired().await {
        Ok(removed) => (
            StatusCode::OK,
            Json(serde_json::json!({"removed": removed})),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}
