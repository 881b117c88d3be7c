//! Integration tests for the REST surface and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json};
use dtsfix_core::task::Task;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = build_test_app(&[]).await;
    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["observers"], 0);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app(&[]).await;
    let response = get(&app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app(&[]).await;
    let response = get(&app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: Static files are served as the fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_dir_is_served_as_fallback() {
    let app = build_test_app(&[]).await;
    let static_dir = app.dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>dtsfix</h1>").unwrap();

    let response = get(&app, "/index.html").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/status reports online
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reports_online() {
    let app = build_test_app(&[]).await;
    let response = get(&app, "/api/v1/status").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "online");
    assert!(json["data"]["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(json["data"]["clients"], 0);
}

// ---------------------------------------------------------------------------
// Test: Queue and history views split tasks by status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_and_history_split_by_status() {
    let pending = Task::new("/media/a.DTS.5.1.mkv", None);
    let mut failed = Task::new("/media/b.DTS.5.1.mkv", None);
    failed.fail("boom");
    let app = build_test_app(&[pending.clone(), failed.clone()]).await;

    let queue = body_json(get(&app, "/api/v1/queue").await).await;
    let queue = queue["data"].as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["id"], pending.id.to_string());
    assert_eq!(queue[0]["status"], "pending");

    let history = body_json(get(&app, "/api/v1/history").await).await;
    let history = history["data"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], failed.id.to_string());
    assert_eq!(history[0]["status"], "error");

    let active = body_json(get(&app, "/api/v1/active").await).await;
    assert!(active["data"].is_null());
}

// ---------------------------------------------------------------------------
// Test: POST /tasks rejects a missing file without creating a task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_task_rejects_missing_file() {
    let app = build_test_app(&[]).await;
    let missing = app.media_root().join("missing.DTS.5.1.mkv");

    let response = post_json(
        &app,
        "/api/v1/tasks",
        json!({ "filePath": missing.to_string_lossy() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let queue = body_json(get(&app, "/api/v1/queue").await).await;
    assert_eq!(queue["data"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Test: POST /tasks rejects an empty path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_task_requires_file_path() {
    let app = build_test_app(&[]).await;
    let response = post_json(&app, "/api/v1/tasks", json!({})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: Cancelling a task that is not active is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_inactive_task_returns_400() {
    let task = Task::new("/media/a.DTS.5.1.mkv", None);
    let app = build_test_app(&[task.clone()]).await;

    let response = post_json(&app, "/api/v1/tasks/cancel", json!({ "taskId": task.id })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(&app, "/api/v1/tasks/cancel", json!({ "taskId": "nope" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: Deleting an unknown task returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_unknown_task_returns_404() {
    let app = build_test_app(&[]).await;
    let id = dtsfix_core::types::new_task_id();

    let response = post_json(&app, "/api/v1/tasks/delete", json!({ "taskId": id })).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: Deleting a queued task removes it from the queue view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_pending_task_removes_it() {
    let task = Task::new("/media/a.DTS.5.1.mkv", None);
    let app = build_test_app(&[task.clone()]).await;

    let response = post_json(&app, "/api/v1/tasks/delete", json!({ "taskId": task.id })).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["message"], "task deleted");

    let queue = body_json(get(&app, "/api/v1/queue").await).await;
    assert_eq!(queue["data"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Test: Stale processing records can be deleted without force
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_stale_processing_task_without_force() {
    let mut task = Task::new("/media/a.DTS.5.1.mkv", None);
    task.start("/media/a.FLAC.7.1.mkv".into(), 0.0, chrono::Utc::now());
    let app = build_test_app(&[task.clone()]).await;

    let response = post_json(&app, "/api/v1/tasks/delete", json!({ "taskId": task.id })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: File search walks the media root with the default pattern
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_files_uses_default_pattern() {
    let app = build_test_app(&[]).await;
    let media = app.media_root();
    std::fs::create_dir_all(media.join("Show/Season 1")).unwrap();
    std::fs::write(media.join("Show/Season 1/Ep1.DTS-HD.MA.5.1.mkv"), b"x").unwrap();
    std::fs::write(media.join("Movie.AAC.2.0.mkv"), b"x").unwrap();
    std::fs::write(media.join("Notes.DTS.5.1.txt"), b"x").unwrap();

    let response = post_json(&app, "/api/v1/files/search", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["count"], 1);
    assert_eq!(json["data"]["files"][0]["name"], "Ep1.DTS-HD.MA.5.1.mkv");
    assert_eq!(json["data"]["defaultPattern"], r"DTS.*5\.1");

    let response = post_json(&app, "/api/v1/files/search", json!({ "pattern": "aac" })).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["count"], 1);
    assert_eq!(json["data"]["files"][0]["name"], "Movie.AAC.2.0.mkv");
}
