//! Request handlers for the REST surface.
//!
//! Handlers delegate to [`dtsfix_worker::ConversionService`] and map
//! errors via [`AppError`](crate::error::AppError). The request and reply
//! payloads are shared with the WebSocket command dispatcher.

pub mod files;
pub mod tasks;

use dtsfix_core::types::TaskId;

use crate::error::{AppError, AppResult};

/// Parse a client-supplied task id.
pub fn parse_task_id(raw: &str) -> AppResult<TaskId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest("taskId is required".into()));
    }
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid taskId: {raw}")))
}
