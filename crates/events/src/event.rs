//! Typed hub events.
//!
//! Every event goes over the wire as `{"type": <snake_case>, "data": {...}}`
//! with camelCase payload fields.

use dtsfix_core::job_events::{
    MSG_TYPE_ACTIVE_TASK, MSG_TYPE_CONVERSION_PROGRESS, MSG_TYPE_INITIAL_STATE, MSG_TYPE_LOG,
    MSG_TYPE_QUEUE_UPDATE, MSG_TYPE_SCAN_PROGRESS,
};
use dtsfix_core::task::{Task, TaskStatus};
use dtsfix_core::types::TaskId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    InitialState(InitialState),
    #[serde(rename_all = "camelCase")]
    QueueUpdate { queue: Vec<Task> },
    #[serde(rename_all = "camelCase")]
    ActiveTask { active_task: Option<Task> },
    ConversionProgress(ProgressUpdate),
    Log(LogLine),
    #[serde(rename_all = "camelCase")]
    ScanProgress {
        progress: u8,
        message: String,
        completed: bool,
    },
}

/// Full state for a newly connected observer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    pub queue: Vec<Task>,
    pub history: Vec<Task>,
    pub active_task: Option<Task>,
    pub status: &'static str,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub task_id: TaskId,
    pub progress: u8,
    pub status: TaskStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub message: String,
    pub level: LogLevel,
}

impl HubEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::InitialState(_) => MSG_TYPE_INITIAL_STATE,
            Self::QueueUpdate { .. } => MSG_TYPE_QUEUE_UPDATE,
            Self::ActiveTask { .. } => MSG_TYPE_ACTIVE_TASK,
            Self::ConversionProgress(_) => MSG_TYPE_CONVERSION_PROGRESS,
            Self::Log(_) => MSG_TYPE_LOG,
            Self::ScanProgress { .. } => MSG_TYPE_SCAN_PROGRESS,
        }
    }

    pub fn log(message: impl Into<String>, level: LogLevel) -> Self {
        Self::Log(LogLine {
            message: message.into(),
            level,
        })
    }

    /// Serialize to the text frame sent to observers.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn frame(event: &HubEvent) -> Value {
        serde_json::from_str(&event.to_frame().unwrap()).unwrap()
    }

    #[test]
    fn test_progress_frame_shape() {
        let id = dtsfix_core::types::new_task_id();
        let event = HubEvent::ConversionProgress(ProgressUpdate {
            task_id: id,
            progress: 50,
            status: TaskStatus::Processing,
            message: "Frame: 1".into(),
        });
        let json = frame(&event);
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["type"], "conversion_progress");
        assert_eq!(json["data"]["taskId"], id.to_string());
        assert_eq!(json["data"]["progress"], 50);
        assert_eq!(json["data"]["status"], "processing");
    }

    #[test]
    fn test_active_task_null() {
        let json = frame(&HubEvent::ActiveTask { active_task: None });
        assert_eq!(json["type"], "active_task");
        assert!(json["data"]["activeTask"].is_null());
    }

    #[test]
    fn test_log_and_scan_frames() {
        let json = frame(&HubEvent::log("task added", LogLevel::Warning));
        assert_eq!(json["type"], "log");
        assert_eq!(json["data"]["level"], "warning");

        let json = frame(&HubEvent::ScanProgress {
            progress: 100,
            message: "done".into(),
            completed: true,
        });
        assert_eq!(json["type"], "scan_progress");
        assert_eq!(json["data"]["completed"], true);
    }

    #[test]
    fn test_initial_state_frame() {
        let json = frame(&HubEvent::InitialState(InitialState {
            queue: vec![],
            history: vec![],
            active_task: None,
            status: "online",
            timestamp: 1_700_000_000,
        }));
        assert_eq!(json["type"], "initial_state");
        assert_eq!(json["data"]["status"], "online");
        assert!(json["data"]["queue"].as_array().unwrap().is_empty());
        assert!(json["data"]["activeTask"].is_null());
    }
}
