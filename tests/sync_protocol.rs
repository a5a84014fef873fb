mod support;

use axum::http::StatusCode;
use support::{get, post, test_app};

fn create_goal_op(object_id: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "object_id": object_id,
        "object_type": "goal",
        "operation": "create",
        "data": {"title": title, "status": "active", "progress": 0.0},
        "version": 1
    })
}

fn batch(operations: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({"client_id": "test-client", "operations": operations})
}

#[tokio::test]
async fn batch_create_succeeds_with_server_version() {
    let app = test_app().await;

    let (status, results) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "Test Goal")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "success");
    assert_eq!(results[0]["object_id"], "goal-1");
    assert!(results[0]["new_version"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn conflict_scenario_reports_server_state_and_leaves_object() {
    let app = test_app().await;

    let (_, created) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-conflict", "Server Copy")]),
    )
    .await;
    let server_version = created[0]["new_version"].as_i64().unwrap();

    // Client claims to have seen version 5, which the server never issued.
    let (status, results) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![serde_json::json!({
            "object_id": "goal-conflict",
            "object_type": "goal",
            "operation": "update",
            "data": {"title": "Client Copy"},
            "version": 2,
            "if_match_version": 5
        })]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["status"], "conflict");
    assert_eq!(results[0]["new_version"], server_version);
    assert_eq!(results[0]["server_data"]["title"], "Server Copy");

    // The object is unchanged: a correct-version update still sees the
    // original title.
    let (_, delta) = get(&app, "/sync/delta/0", "user-1").await;
    let change = &delta["changes"][0];
    assert_eq!(change["data"]["title"], "Server Copy");
}

#[tokio::test]
async fn stale_guard_after_successful_update_conflicts_and_preserves_result() {
    let app = test_app().await;

    let (_, created) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "v0")]),
    )
    .await;
    let v0 = created[0]["new_version"].as_i64().unwrap();

    let (_, first_update) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![serde_json::json!({
            "object_id": "goal-1",
            "object_type": "goal",
            "operation": "update",
            "data": {"title": "v1"},
            "version": 2,
            "if_match_version": v0
        })]),
    )
    .await;
    assert_eq!(first_update[0]["status"], "success");
    let v1 = first_update[0]["new_version"].as_i64().unwrap();

    // Replay with the original guard: conflict, state stays at v1.
    let (_, second_update) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![serde_json::json!({
            "object_id": "goal-1",
            "object_type": "goal",
            "operation": "update",
            "data": {"title": "v2"},
            "version": 3,
            "if_match_version": v0
        })]),
    )
    .await;

    assert_eq!(second_update[0]["status"], "conflict");
    assert_eq!(second_update[0]["new_version"], v1);
    assert_eq!(second_update[0]["server_data"]["title"], "v1");
}

#[tokio::test]
async fn update_without_guard_always_proceeds() {
    let app = test_app().await;

    post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "original")]),
    )
    .await;

    let (_, results) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![serde_json::json!({
            "object_id": "goal-1",
            "object_type": "goal",
            "operation": "update",
            "data": {"title": "rewritten"},
            "version": 40
        })]),
    )
    .await;

    assert_eq!(results[0]["status"], "success");
}

#[tokio::test]
async fn unknown_object_type_is_a_per_op_error() {
    let app = test_app().await;

    let (status, results) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![
            serde_json::json!({
                "object_id": "invalid-1",
                "object_type": "invalid_type",
                "operation": "create",
                "data": {"title": "Test"},
                "version": 1
            }),
            create_goal_op("goal-after-error", "Still Applied"),
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["status"], "error");
    assert!(results[0]["error_message"]
        .as_str()
        .unwrap()
        .contains("Unknown object type"));
    assert_eq!(results[1]["status"], "success");
}

#[tokio::test]
async fn invalid_operation_fails_request_validation() {
    let app = test_app().await;

    let (status, _) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![serde_json::json!({
            "object_id": "x",
            "object_type": "goal",
            "operation": "upsert",
            "data": {},
            "version": 1
        })]),
    )
    .await;

    // Malformed enum is a transport-level rejection, not a per-op error.
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn delta_contains_each_object_once_and_advances_cursor() {
    let app = test_app().await;

    post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![
            create_goal_op("goal-1", "First"),
            create_goal_op("goal-2", "Second"),
        ]),
    )
    .await;

    let (status, page) = get(&app, "/sync/delta/0", "user-1").await;
    assert_eq!(status, StatusCode::OK);

    let changes = page["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(page["has_more"], false);

    let versions: Vec<i64> = changes
        .iter()
        .map(|c| c["version"].as_i64().unwrap())
        .collect();
    assert!(versions[0] < versions[1]);
    assert_eq!(page["current_timestamp"], versions[1]);

    // Paging from the cursor yields nothing new.
    let cursor = page["current_timestamp"].as_i64().unwrap();
    let (_, next) = get(&app, &format!("/sync/delta/{cursor}"), "user-1").await;
    assert_eq!(next["changes"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn delta_filter_restricts_types_and_rejects_unknown() {
    let app = test_app().await;

    post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![
            create_goal_op("goal-1", "A Goal"),
            serde_json::json!({
                "object_id": "task-1",
                "object_type": "task",
                "operation": "create",
                "data": {"title": "A Task"},
                "version": 1
            }),
        ]),
    )
    .await;

    let (status, page) = get(&app, "/sync/delta/0?object_types=goal", "user-1").await;
    assert_eq!(status, StatusCode::OK);
    for change in page["changes"].as_array().unwrap() {
        assert_eq!(change["object_type"], "goal");
    }

    let (status, _) = get(&app, "/sync/delta/0?object_types=widget", "user-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delta_is_owner_scoped() {
    let app = test_app().await;

    post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "Mine")]),
    )
    .await;

    let (_, page) = get(&app, "/sync/delta/0", "someone-else").await;
    assert_eq!(page["changes"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn resolve_conflict_overwrites_and_bumps() {
    let app = test_app().await;

    let (_, created) = post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "Contested")]),
    )
    .await;
    let base_version = created[0]["new_version"].as_i64().unwrap();

    let (status, resolved) = post(
        &app,
        "/sync/resolve-conflict/goal-1",
        "user-1",
        serde_json::json!({
            "object_type": "goal",
            "data": {"title": "Resolved", "progress": 100.0, "status": "completed"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");
    assert!(resolved["new_version"].as_i64().unwrap() > base_version);

    let (_, page) = get(&app, "/sync/delta/0", "user-1").await;
    assert_eq!(page["changes"][0]["data"]["title"], "Resolved");
}

#[tokio::test]
async fn resolve_conflict_on_missing_object_is_404() {
    let app = test_app().await;

    let (status, _) = post(
        &app,
        "/sync/resolve-conflict/ghost",
        "user-1",
        serde_json::json!({"object_type": "goal", "data": {}}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reports_totals_and_recent_changes() {
    let app = test_app().await;

    post(
        &app,
        "/sync/batch",
        "user-1",
        batch(vec![create_goal_op("goal-1", "Counted")]),
    )
    .await;

    let (status, body) = get(&app, "/sync/status", "user-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "user-1");
    assert_eq!(body["object_stats"]["goal"]["total_objects"], 1);
    assert_eq!(body["object_stats"]["goal"]["recent_changes"], 1);
    assert_eq!(body["object_stats"]["task"]["total_objects"], 0);
}
