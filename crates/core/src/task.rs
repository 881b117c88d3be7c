//! Conversion task record and its lifecycle transitions.
//!
//! A [`Task`] moves `pending -> processing -> completed | error`. The
//! transition methods keep the record's invariants in one place:
//! `progress == 100` only for `completed`, an output path only while
//! processing or once completed, and `started_at` / `completed_at` written
//! at most once.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{new_task_id, TaskId, Timestamp};

/// Error text stored on a task the user cancelled.
pub const CANCELLED_MESSAGE: &str = "cancelled by user";

/// Error text stored on a task that was mid-conversion when the server stopped.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

/// Highest progress value stored while a task is still processing.
/// 100 is reserved for `completed`.
const MAX_PROCESSING_PROGRESS: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `pending` and `processing` tasks are "in the queue".
    pub fn is_pending_like(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary audio stream descriptor captured when the task is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    pub codec_name: String,
    pub channel_layout: String,
    pub channels: u32,
    pub sample_rate: String,
    pub bit_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "filePath")]
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_info: Option<AudioInfo>,
    /// Source duration in seconds, 0 when unknown.
    #[serde(default)]
    pub duration: f64,
    /// Seconds of output written so far.
    #[serde(default)]
    pub current_time: f64,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Build a new `pending` task for `source_path`.
    pub fn new(source_path: impl Into<PathBuf>, audio_info: Option<AudioInfo>) -> Self {
        Self {
            id: new_task_id(),
            source_path: source_path.into(),
            output_path: None,
            status: TaskStatus::Pending,
            progress: 0,
            error: None,
            audio_info,
            duration: 0.0,
            current_time: 0.0,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_pending_like(&self) -> bool {
        self.status.is_pending_like()
    }

    /// `pending -> processing`.
    pub fn start(&mut self, output_path: PathBuf, duration: f64, now: Timestamp) {
        self.status = TaskStatus::Processing;
        self.output_path = Some(output_path);
        self.duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        self.current_time = 0.0;
        self.progress = 0;
        self.error = None;
        self.started_at.get_or_insert(now);
    }

    /// Record a progress sample. Ignored unless processing; never moves
    /// progress or the current time backwards.
    pub fn record_progress(&mut self, current_time: f64, percent: u8) {
        if self.status != TaskStatus::Processing {
            return;
        }
        if current_time.is_finite() && current_time > self.current_time {
            self.current_time = current_time;
        }
        let capped = percent.min(MAX_PROCESSING_PROGRESS);
        self.progress = self.progress.max(capped);
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, now: Timestamp) {
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.error = None;
        if self.duration > 0.0 {
            self.current_time = self.duration;
        }
        self.completed_at.get_or_insert(now);
    }

    /// Move to `error`. The output path is dropped because no usable
    /// artifact exists for a failed task.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(message.into());
        self.output_path = None;
        if self.progress >= 100 {
            self.progress = MAX_PROCESSING_PROGRESS;
        }
    }

    /// Cancellation is an `error` outcome carrying [`CANCELLED_MESSAGE`].
    pub fn cancel(&mut self) {
        self.fail(CANCELLED_MESSAGE);
    }
}
