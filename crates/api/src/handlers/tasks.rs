use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use dtsfix_core::types::TaskId;
use dtsfix_worker::service::STATUS_ONLINE;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::handlers::parse_task_id;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTaskRequest {
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskRequest {
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskRequest {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAdded {
    pub task_id: TaskId,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageReply {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    pub timestamp: i64,
    pub clients: usize,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<DataResponse<StatusReply>> {
    Json(DataResponse {
        data: StatusReply {
            status: STATUS_ONLINE,
            timestamp: chrono::Utc::now().timestamp(),
            clients: state.hub.observer_count().await,
        },
    })
}

/// GET /api/v1/queue
///
/// Pending and processing tasks, newest first.
pub async fn get_queue(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let queue = state.service.queue().await?;
    Ok(Json(DataResponse { data: queue }))
}

/// GET /api/v1/active
///
/// The task currently being converted, or `null`.
pub async fn get_active(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.service.active_task(),
    })
}

/// GET /api/v1/history
///
/// Completed and failed tasks, newest first.
pub async fn get_history(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let history = state.service.history().await?;
    Ok(Json(DataResponse { data: history }))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Validate the file and queue a conversion. Returns 201 with the new id.
pub async fn add_task(
    State(state): State<AppState>,
    Json(input): Json<AddTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.add_task(&input.file_path).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: TaskAdded {
                task_id: task.id,
                message: "task added to queue".into(),
            },
        }),
    ))
}

/// POST /api/v1/tasks/cancel
///
/// Cancel the active conversion. 400 if the task is not the active one.
pub async fn cancel_task(
    State(state): State<AppState>,
    Json(input): Json<CancelTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let id = parse_task_id(&input.task_id)?;
    state.service.cancel_task(id).await?;
    Ok(Json(DataResponse {
        data: MessageReply {
            message: "task cancelled".into(),
        },
    }))
}

/// POST /api/v1/tasks/delete
///
/// Delete a task record. The active task needs `force: true`.
pub async fn delete_task(
    State(state): State<AppState>,
    Json(input): Json<DeleteTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let id = parse_task_id(&input.task_id)?;
    state.service.delete_task(id, input.force).await?;
    Ok(Json(DataResponse {
        data: MessageReply {
            message: "task deleted".into(),
        },
    }))
}
