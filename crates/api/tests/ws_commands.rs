//! Integration tests for the WebSocket command protocol.

mod common;

use assert_matches::assert_matches;
use common::build_test_app;
use dtsfix_api::error::AppError;
use dtsfix_api::ws::commands::{dispatch, handle_text};
use dtsfix_core::task::Task;
use serde_json::{json, Value};

async fn next_json(rx: &mut tokio::sync::mpsc::Receiver<dtsfix_events::Frame>) -> Value {
    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("observer channel closed");
    serde_json::from_str(&frame).unwrap()
}

/// Skip broadcast frames until a command reply arrives.
async fn next_reply(rx: &mut tokio::sync::mpsc::Receiver<dtsfix_events::Frame>) -> Value {
    loop {
        let json = next_json(rx).await;
        if json["type"].as_str().is_some_and(|t| t.ends_with("_response") || t == "error") {
            return json;
        }
    }
}

// ---------------------------------------------------------------------------
// Test: get_state returns the full state view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_state_returns_queue_and_history() {
    let pending = Task::new("/media/a.DTS.5.1.mkv", None);
    let app = build_test_app(&[pending.clone()]).await;

    let data = dispatch(&app.state, "get_state", Value::Null).await.unwrap();

    assert_eq!(data["status"], "online");
    assert_eq!(data["queue"][0]["id"], pending.id.to_string());
    assert_eq!(data["history"].as_array().unwrap().len(), 0);
    assert!(data["activeTask"].is_null());
    assert!(data["timestamp"].as_i64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown commands are answered with an error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_command_is_rejected() {
    let app = build_test_app(&[]).await;

    let result = dispatch(&app.state, "reboot", Value::Null).await;
    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg == "unknown command: reboot");
}

// ---------------------------------------------------------------------------
// Test: Replies go to the sender only, typed `<command>_response`
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_is_sent_to_requester_only() {
    let app = build_test_app(&[]).await;
    let mut requester = app.hub.register("requester").await;
    let mut bystander = app.hub.register("bystander").await;

    handle_text(
        &app.state,
        "requester",
        r#"{"type":"cancel_task","data":{"taskId":"not-a-uuid"}}"#,
    )
    .await;

    let reply = next_reply(&mut requester).await;
    assert_eq!(reply["type"], "cancel_task_response");
    assert_eq!(reply["error"], "invalid taskId: not-a-uuid");
    assert!(reply.get("data").is_none());
    while let Ok(frame) = bystander.try_recv() {
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert!(!json["type"].as_str().unwrap().ends_with("_response"));
    }
}

// ---------------------------------------------------------------------------
// Test: Successful commands carry data and no error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_task_command_succeeds() {
    let task = Task::new("/media/a.DTS.5.1.mkv", None);
    let app = build_test_app(&[task.clone()]).await;
    let mut rx = app.hub.register("client").await;

    let text = json!({ "type": "delete_task", "data": { "taskId": task.id } }).to_string();
    handle_text(&app.state, "client", &text).await;

    let reply = next_reply(&mut rx).await;
    assert_eq!(reply["type"], "delete_task_response");
    assert_eq!(reply["data"]["message"], "task deleted");
    assert!(reply.get("error").is_none());
}

// ---------------------------------------------------------------------------
// Test: Malformed frames get an error reply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_message_gets_error_reply() {
    let app = build_test_app(&[]).await;
    let mut rx = app.hub.register("client").await;

    handle_text(&app.state, "client", "not json").await;

    let reply = next_reply(&mut rx).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["error"].as_str().unwrap().starts_with("invalid message"));
}

// ---------------------------------------------------------------------------
// Test: add_task validation errors surface in the reply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_task_command_reports_validation_error() {
    let app = build_test_app(&[]).await;
    let mut rx = app.hub.register("client").await;

    handle_text(&app.state, "client", r#"{"type":"add_task","data":{"filePath":""}}"#).await;

    let reply = next_reply(&mut rx).await;
    assert_eq!(reply["type"], "add_task_response");
    assert_eq!(reply["error"], "filePath is required");
}
