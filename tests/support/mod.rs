use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use northstar::Config;
use northstar::app::build_state_with_pool;
use northstar::gateway::router;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use tower::ServiceExt;

/// Gateway wired onto an in-memory database and the local mock provider.
pub async fn test_app() -> Router {
    let config = Config::with_paths(PathBuf::new(), PathBuf::new());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let state = build_state_with_pool(&config, pool)
        .await
        .expect("build app state");
    router(state)
}

/// Fire one request; returns status and parsed JSON body (Null when empty).
pub async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user {
        builder = builder.header("X-User-Id", user_id);
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("gateway response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");

    // Framework-level rejections (e.g. malformed enums) come back as plain
    // text; surface those as a JSON string so assertions stay uniform.
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    (status, json)
}

pub async fn post(
    app: &Router,
    uri: &str,
    user: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request(app, Method::POST, uri, Some(user), Some(body)).await
}

pub async fn get(app: &Router, uri: &str, user: &str) -> (StatusCode, serde_json::Value) {
    request(app, Method::GET, uri, Some(user), None).await
}
