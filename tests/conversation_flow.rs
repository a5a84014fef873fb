mod support;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use support::{get, post, request, test_app};

#[tokio::test]
async fn happy_path_task_creation_end_to_end() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "Remind me to buy groceries tomorrow"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent_result"]["intent"], "create_task");
    assert!(body["intent_result"]["confidence"].as_f64().unwrap() >= 0.85);
    assert_eq!(body["intent_result"]["entities"]["title"], "buy groceries");

    let tomorrow = (Utc::now().date_naive() + Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(body["intent_result"]["entities"]["due_date"], tomorrow);

    assert_eq!(body["requires_clarification"], false);
    assert!(!body["session_id"].as_str().unwrap().is_empty());

    let action = &body["next_actions"][0];
    assert_eq!(action["type"], "execute_action");
    assert_eq!(action["action"], "create_task");
    assert_eq!(action["entities"]["title"], "buy groceries");
}

#[tokio::test]
async fn low_confidence_message_requests_clarification() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "hmm"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let intent = body["intent_result"]["intent"].as_str().unwrap();
    assert!(intent == "chat_continuation" || intent == "unknown");
    assert!(body["intent_result"]["confidence"].as_f64().unwrap() < 0.85);
    assert_eq!(body["requires_clarification"], true);
    assert_eq!(body["next_actions"][0]["type"], "clarification_request");
}

#[tokio::test]
async fn empty_message_is_rejected_before_classification() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "   "}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = test_app().await;

    let (status, _) = request(
        &app,
        Method::POST,
        "/conversation/message",
        None,
        Some(serde_json::json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, Method::GET, "/sync/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn very_long_message_still_returns_a_result() {
    let app = test_app().await;
    let long_message = format!("remind me to summarize {}", "meeting notes ".repeat(1500));

    let (status, body) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": long_message}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent_result"]["intent"], "create_task");
}

#[tokio::test]
async fn classify_endpoint_returns_bare_classification() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/conversation/classify",
        "user-1",
        serde_json::json!({"message": "I want to achieve a promotion this year"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "create_goal");
    assert!(body["confidence"].as_f64().is_some());
    assert!(body.get("entities").is_some());
}

#[tokio::test]
async fn session_turns_accumulate_and_logs_match() {
    let app = test_app().await;

    let (_, first) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "I want to achieve a marathon"}),
    )
    .await;
    let session_id = first["session_id"].as_str().unwrap().to_string();

    for message in ["hmm", "Remind me to stretch"] {
        let (status, _) = post(
            &app,
            "/conversation/message",
            "user-1",
            serde_json::json!({"message": message, "session_id": session_id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, session) = get(
        &app,
        &format!("/conversation/sessions/{session_id}"),
        "user-1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["turn_count"], 3);

    let (status, logs) = get(
        &app,
        &format!("/conversation/sessions/{session_id}/logs"),
        "user-1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["turn_number"], 1);
    assert_eq!(logs[2]["turn_number"], 3);

    // successful + failed never exceeds turns.
    let successful = session["successful_intents"].as_i64().unwrap();
    let failed = session["failed_intents"].as_i64().unwrap();
    assert!(successful + failed <= 3);
}

#[tokio::test]
async fn sessions_listing_is_scoped_to_the_caller() {
    let app = test_app().await;

    post(
        &app,
        "/conversation/message",
        "user-a",
        serde_json::json!({"message": "hello there friend"}),
    )
    .await;
    post(
        &app,
        "/conversation/message",
        "user-b",
        serde_json::json!({"message": "hello there friend"}),
    )
    .await;

    let (status, sessions) = get(&app, "/conversation/sessions", "user-a").await;
    assert_eq!(status, StatusCode::OK);
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["user_id"], "user-a");
}

#[tokio::test]
async fn feedback_round_trip() {
    let app = test_app().await;

    let (_, outcome) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "how can I sleep better"}),
    )
    .await;
    let session_id = outcome["session_id"].as_str().unwrap();

    let (_, logs) = get(
        &app,
        &format!("/conversation/sessions/{session_id}/logs"),
        "user-1",
    )
    .await;
    let log_id = logs[0]["id"].as_str().unwrap();

    let (status, feedback) = post(
        &app,
        "/conversation/feedback",
        "user-1",
        serde_json::json!({
            "conversation_log_id": log_id,
            "corrected_intent": "get_advice",
            "feedback_type": "wrong_intent",
            "comment": "this was an advice request"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["corrected_intent"], "get_advice");
    assert_eq!(feedback["feedback_type"], "wrong_intent");
    assert_eq!(feedback["conversation_log_id"], log_id);
}

#[tokio::test]
async fn feedback_on_foreign_log_is_not_found() {
    let app = test_app().await;

    let (status, _) = post(
        &app,
        "/conversation/feedback",
        "user-1",
        serde_json::json!({
            "conversation_log_id": "nonexistent",
            "corrected_intent": "create_task",
            "feedback_type": "wrong_intent"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completing_a_session_makes_it_terminal() {
    let app = test_app().await;

    let (_, outcome) = post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "hello there friend"}),
    )
    .await;
    let session_id = outcome["session_id"].as_str().unwrap().to_string();

    let (status, body) = post(
        &app,
        &format!("/conversation/sessions/{session_id}/complete"),
        "user-1",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (_, session) = get(
        &app,
        &format!("/conversation/sessions/{session_id}"),
        "user-1",
    )
    .await;
    assert_eq!(session["status"], "completed");
    assert!(!session["completed_at"].is_null());

    // Completing twice finds no active session.
    let (status, _) = post(
        &app,
        &format!("/conversation/sessions/{session_id}/complete"),
        "user-1",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn executed_task_lands_in_the_sync_delta_feed() {
    let app = test_app().await;

    post(
        &app,
        "/conversation/message",
        "user-1",
        serde_json::json!({"message": "Remind me to buy groceries tomorrow"}),
    )
    .await;

    let (status, delta) = get(&app, "/sync/delta/0", "user-1").await;
    assert_eq!(status, StatusCode::OK);

    let tasks: Vec<_> = delta["changes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|change| change["object_type"] == "task")
        .collect();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["data"]["title"], "buy groceries");
}
