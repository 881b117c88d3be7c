pub mod files;
pub mod health;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                 WebSocket command and event stream
/// /status             server status and observer count (GET)
/// /queue              pending and processing tasks (GET)
/// /active             the task being converted (GET)
/// /history            completed and failed tasks (GET)
/// /tasks              admit a file (POST)
/// /tasks/cancel       cancel the active task (POST)
/// /tasks/delete       delete a task record (POST)
/// /files/search       search the media root (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/status", get(handlers::tasks::get_status))
        .route("/queue", get(handlers::tasks::get_queue))
        .route("/active", get(handlers::tasks::get_active))
        .route("/history", get(handlers::tasks::get_history))
        .nest("/tasks", tasks::router())
        .nest("/files", files::router())
}
