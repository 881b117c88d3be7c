//! Client command protocol.
//!
//! Inbound frames are `{"type": <command>, "data": {...}}`. Each command is
//! answered to the sender only with `{"type": "<command>_response", "data"
//! | "error"}`.

use dtsfix_core::job_events::RESPONSE_SUFFIX;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::handlers::files::{SearchReply, SearchRequest};
use crate::handlers::parse_task_id;
use crate::handlers::tasks::{
    AddTaskRequest, CancelTaskRequest, DeleteTaskRequest, MessageReply, TaskAdded,
};
use crate::state::AppState;

pub const CMD_GET_STATE: &str = "get_state";
pub const CMD_SEARCH_FILES: &str = "search_files";
pub const CMD_ADD_TASK: &str = "add_task";
pub const CMD_CANCEL_TASK: &str = "cancel_task";
pub const CMD_DELETE_TASK: &str = "delete_task";

/// Reply type for frames that are not valid commands.
pub const MSG_TYPE_ERROR: &str = "error";

#[derive(Debug, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn for_command(command: &str, result: Result<Value, String>) -> Self {
        let kind = format!("{command}{RESPONSE_SUFFIX}");
        match result {
            Ok(data) => Self {
                kind,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                kind,
                data: None,
                error: Some(error),
            },
        }
    }
}

/// Parse one inbound text frame, run it and queue the reply.
pub async fn handle_text(state: &AppState, conn_id: &str, text: &str) {
    let reply = match serde_json::from_str::<Command>(text) {
        Ok(command) => {
            tracing::debug!(conn_id = %conn_id, command = %command.kind, "WebSocket command");
            let result = dispatch(state, &command.kind, command.data)
                .await
                .map_err(|e| e.classify().2);
            CommandReply::for_command(&command.kind, result)
        }
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Malformed WebSocket message");
            CommandReply {
                kind: MSG_TYPE_ERROR.into(),
                data: None,
                error: Some(format!("invalid message: {e}")),
            }
        }
    };

    if !state.hub.send_to(conn_id, &reply).await {
        tracing::debug!(conn_id = %conn_id, reply = %reply.kind, "Reply not delivered");
    }
}

/// Run a command and return its reply payload.
pub async fn dispatch(state: &AppState, kind: &str, data: Value) -> AppResult<Value> {
    let service = &state.service;
    match kind {
        CMD_GET_STATE => to_value(&service.initial_state().await?),
        CMD_SEARCH_FILES => {
            let input: SearchRequest = payload(data)?;
            let files = service.search_files(input.pattern.as_deref()).await?;
            to_value(&SearchReply::new(files))
        }
        CMD_ADD_TASK => {
            let input: AddTaskRequest = payload(data)?;
            let task = service.add_task(&input.file_path).await?;
            to_value(&TaskAdded {
                task_id: task.id,
                message: "task added to queue".into(),
            })
        }
        CMD_CANCEL_TASK => {
            let input: CancelTaskRequest = payload(data)?;
            service.cancel_task(parse_task_id(&input.task_id)?).await?;
            to_value(&MessageReply {
                message: "task cancelled".into(),
            })
        }
        CMD_DELETE_TASK => {
            let input: DeleteTaskRequest = payload(data)?;
            service
                .delete_task(parse_task_id(&input.task_id)?, input.force)
                .await?;
            to_value(&MessageReply {
                message: "task deleted".into(),
            })
        }
        other => Err(AppError::BadRequest(format!("unknown command: {other}"))),
    }
}

fn payload<T: DeserializeOwned>(data: Value) -> AppResult<T> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| AppError::BadRequest(format!("invalid data: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::InternalError(e.to_string()))
}
