//! Contract operations exposed to the transports.
//!
//! [`ConversionService`] validates admissions, routes cancel/delete to the
//! executor and queue, builds the state views and runs media searches. The
//! REST handlers and the WebSocket command dispatcher both call into it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dtsfix_core::error::CoreError;
use dtsfix_core::ffmpeg::FfmpegTools;
use dtsfix_core::media::{is_video_file, search_video_files, MediaFile, DEFAULT_SEARCH_PATTERN};
use dtsfix_core::task::{Task, TaskStatus};
use dtsfix_core::types::TaskId;
use dtsfix_db::StoreError;
use dtsfix_events::{BroadcastHub, InitialState, LogLevel};

use crate::executor::{ExecutorError, JobExecutor};
use crate::queue::{QueueError, QueueHandle};

/// Reported in state views while the server is up.
pub const STATUS_ONLINE: &str = "online";

impl From<ExecutorError> for CoreError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::NotActive(_) => CoreError::Validation(err.to_string()),
        }
    }
}

impl From<QueueError> for CoreError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Store(StoreError::NotFound(id)) => CoreError::task_not_found(id),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

pub struct ConversionService {
    queue: QueueHandle,
    executor: JobExecutor,
    hub: Arc<BroadcastHub>,
    tools: FfmpegTools,
    media_root: PathBuf,
}

impl ConversionService {
    pub fn new(
        queue: QueueHandle,
        executor: JobExecutor,
        hub: Arc<BroadcastHub>,
        tools: FfmpegTools,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queue,
            executor,
            hub,
            tools,
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Validate `file_path` and enqueue a pending task for it.
    ///
    /// Rejected without creating a task if the path is empty, missing, not
    /// a video container, or has no readable audio stream.
    pub async fn add_task(&self, file_path: &str) -> Result<Task, CoreError> {
        let file_path = file_path.trim();
        if file_path.is_empty() {
            return Err(CoreError::Validation("filePath is required".into()));
        }
        let path = PathBuf::from(file_path);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(CoreError::Validation(format!(
                    "not a regular file: {file_path}"
                )))
            }
            Err(_) => {
                return Err(CoreError::Validation(format!(
                    "file does not exist: {file_path}"
                )))
            }
        }

        if !is_video_file(&path) {
            return Err(CoreError::Validation(format!(
                "not a video file: {file_path}"
            )));
        }

        let audio = match self.tools.probe_audio(&path).await {
            Ok(Some(audio)) => audio,
            Ok(None) => {
                return Err(CoreError::Validation(format!(
                    "no audio stream found in {file_path}"
                )))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Audio probe failed");
                return Err(CoreError::Validation(format!(
                    "failed to read audio info: {e}"
                )));
            }
        };

        let task = Task::new(path, Some(audio));
        self.queue.submit(task.clone()).await?;
        self.hub
            .publish_log(format!("task added: {file_path}"), LogLevel::Info)
            .await;
        Ok(task)
    }

    /// Cancel the active job. Fails if `id` is not the active task.
    pub async fn cancel_task(&self, id: TaskId) -> Result<(), CoreError> {
        self.executor.cancel(id)?;
        self.hub
            .publish_log(format!("task cancelled: {id}"), LogLevel::Warning)
            .await;
        Ok(())
    }

    /// Remove a task record.
    ///
    /// The active task is only deleted with `force`, which cancels it
    /// first. A `processing` record that no job owns is stale and may be
    /// deleted freely.
    pub async fn delete_task(&self, id: TaskId, force: bool) -> Result<(), CoreError> {
        let task = self
            .queue
            .get(id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))?;

        if self.executor.is_active(id) {
            if !force {
                return Err(CoreError::Conflict(format!(
                    "task {id} is processing; use force to delete it"
                )));
            }
            if let Err(e) = self.executor.cancel(id) {
                tracing::debug!(task_id = %id, error = %e, "Task finished before forced cancel");
            }
        } else if task.status == TaskStatus::Processing {
            tracing::warn!(task_id = %id, "Deleting stale processing task");
        }

        self.queue.delete(id).await?;
        tracing::info!(task_id = %id, force, "Task deleted");
        self.hub
            .publish_log(format!("task deleted: {id}"), LogLevel::Info)
            .await;
        Ok(())
    }

    pub fn active_task(&self) -> Option<Task> {
        self.executor.active_task()
    }

    /// `pending` and `processing` tasks, newest first.
    pub async fn queue(&self) -> Result<Vec<Task>, CoreError> {
        let (queue, _) = self.split_tasks().await?;
        Ok(queue)
    }

    /// `completed` and `error` tasks, newest first.
    pub async fn history(&self) -> Result<Vec<Task>, CoreError> {
        let (_, history) = self.split_tasks().await?;
        Ok(history)
    }

    /// Full state pushed to a newly connected observer.
    pub async fn initial_state(&self) -> Result<InitialState, CoreError> {
        let (queue, history) = self.split_tasks().await?;
        Ok(InitialState {
            queue,
            history,
            active_task: self.active_task(),
            status: STATUS_ONLINE,
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    /// Search the media root for video files whose name matches `pattern`
    /// (default [`DEFAULT_SEARCH_PATTERN`]). Publishes scan start and
    /// completion events.
    pub async fn search_files(&self, pattern: Option<&str>) -> Result<Vec<MediaFile>, CoreError> {
        let pattern = pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SEARCH_PATTERN)
            .to_string();

        self.hub
            .publish_scan_progress(
                0,
                format!("scanning {} for {pattern}", self.media_root.display()),
                false,
            )
            .await;

        let root = self.media_root.clone();
        let needle = pattern.clone();
        let files = tokio::task::spawn_blocking(move || search_video_files(&root, &needle))
            .await
            .map_err(|e| CoreError::Internal(format!("media scan failed: {e}")))?;

        tracing::info!(pattern = %pattern, count = files.len(), "Media search finished");
        self.hub
            .publish_scan_progress(100, format!("found {} files", files.len()), true)
            .await;
        Ok(files)
    }

    async fn split_tasks(&self) -> Result<(Vec<Task>, Vec<Task>), CoreError> {
        let tasks = self.queue.list_all().await?;
        Ok(tasks.into_iter().partition(Task::is_pending_like))
    }
}
