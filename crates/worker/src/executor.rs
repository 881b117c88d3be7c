//! Single-slot conversion executor.
//!
//! Polls the queue for pending tasks on a fixed interval (and whenever the
//! queue signals a new admission), claims at most one at a time and drives
//! it through `claimed -> started -> running -> completed | cancelled |
//! failed`. Every state change is persisted through the [`QueueHandle`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dtsfix_core::ffmpeg::FfmpegTools;
use dtsfix_core::naming;
use dtsfix_core::progress::percent_complete;
use dtsfix_core::task::{Task, TaskStatus, INTERRUPTED_MESSAGE};
use dtsfix_core::types::TaskId;
use dtsfix_events::{BroadcastHub, LogLevel};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::process::{self, JobOutcome, JobSignal, SupervisorSettings};
use crate::queue::QueueHandle;

/// Default polling interval for the claim loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default spacing of progress events.
const DEFAULT_PROGRESS_THROTTLE: Duration = Duration::from_secs(2);

/// Default grace for stream readers after the process exits.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Buffered job signals between the stream readers and the executor.
const SIGNAL_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub progress_throttle: Duration,
    /// Upper bound on a single conversion; `None` means unlimited.
    pub job_timeout: Option<Duration>,
    pub drain_grace: Duration,
    pub tools: FfmpegTools,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_throttle: DEFAULT_PROGRESS_THROTTLE,
            job_timeout: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
            tools: FfmpegTools::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("task {0} is not active")]
    NotActive(TaskId),
}

// ---------------------------------------------------------------------------
// Active slot
// ---------------------------------------------------------------------------

struct ActiveJob {
    task: Task,
    cancel: CancellationToken,
}

/// The one job that may be running. Claim is a check-and-set under a single
/// lock; the lock is never held across an await.
#[derive(Default)]
struct ActiveSlot {
    inner: Mutex<Option<ActiveJob>>,
}

impl ActiveSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Occupy the slot with `task` if it is free.
    fn try_claim(&self, task: &Task) -> Option<CancellationToken> {
        let mut slot = self.lock();
        if slot.is_some() {
            return None;
        }
        let cancel = CancellationToken::new();
        *slot = Some(ActiveJob {
            task: task.clone(),
            cancel: cancel.clone(),
        });
        Some(cancel)
    }

    fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    fn snapshot(&self) -> Option<Task> {
        self.lock().as_ref().map(|job| job.task.clone())
    }

    fn refresh(&self, task: &Task) {
        if let Some(job) = self.lock().as_mut().filter(|job| job.task.id == task.id) {
            job.task = task.clone();
        }
    }

    fn cancel(&self, id: TaskId) -> Result<(), ExecutorError> {
        match self.lock().as_ref() {
            Some(job) if job.task.id == id => {
                job.cancel.cancel();
                Ok(())
            }
            _ => Err(ExecutorError::NotActive(id)),
        }
    }

    fn cancel_active(&self) -> Option<TaskId> {
        self.lock().as_ref().map(|job| {
            job.cancel.cancel();
            job.task.id
        })
    }

    fn release(&self, id: TaskId) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|job| job.task.id == id) {
            *slot = None;
        }
    }
}

/// Frees the slot when the job ends, however it ends.
struct ClaimGuard {
    slot: Arc<ActiveSlot>,
    id: TaskId,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.slot.release(self.id);
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Background conversion executor.
///
/// Cheap to clone; clones share the active slot.
#[derive(Clone)]
pub struct JobExecutor {
    queue: QueueHandle,
    hub: Arc<BroadcastHub>,
    config: Arc<ExecutorConfig>,
    slot: Arc<ActiveSlot>,
}

impl JobExecutor {
    pub fn new(queue: QueueHandle, hub: Arc<BroadcastHub>, config: ExecutorConfig) -> Self {
        Self {
            queue,
            hub,
            config: Arc::new(config),
            slot: Arc::new(ActiveSlot::default()),
        }
    }

    /// Run the claim loop until the cancellation token is triggered.
    ///
    /// Tasks left `processing` by a previous run are failed first. On
    /// shutdown the active job is cancelled and awaited.
    pub async fn run(&self, cancel: CancellationToken) {
        self.recover_interrupted().await;

        let admitted = self.queue.admission_signal();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job executor started",
        );

        let mut current: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job executor shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                _ = admitted.notified() => {}
            }
            if let Some(handle) = self.try_claim().await {
                current = Some(handle);
            }
        }

        if let Some(task_id) = self.slot.cancel_active() {
            tracing::info!(task_id = %task_id, "Cancelling active job for shutdown");
        }
        if let Some(handle) = current {
            let limit = self.config.drain_grace * 2;
            if tokio::time::timeout(limit, handle).await.is_err() {
                tracing::warn!("Active job did not finish before shutdown deadline");
            }
        }
    }

    /// Claim the oldest pending task if the slot is free and spawn its job.
    pub async fn try_claim(&self) -> Option<JoinHandle<()>> {
        if self.slot.is_occupied() {
            return None;
        }

        let pending = match self.queue.list_pending_like().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list pending tasks");
                return None;
            }
        };
        let task = pending
            .into_iter()
            .find(|t| t.status == TaskStatus::Pending)?;

        let cancel = self.slot.try_claim(&task)?;
        let guard = ClaimGuard {
            slot: Arc::clone(&self.slot),
            id: task.id,
        };
        tracing::info!(task_id = %task.id, path = %task.source_path.display(), "Task claimed");

        let executor = self.clone();
        Some(tokio::spawn(executor.run_job(task, cancel, guard)))
    }

    /// Cancel the active job. Fails unless `id` is the active task.
    pub fn cancel(&self, id: TaskId) -> Result<(), ExecutorError> {
        self.slot.cancel(id)?;
        tracing::info!(task_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Snapshot of the task currently being converted.
    pub fn active_task(&self) -> Option<Task> {
        self.slot.snapshot()
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.slot.snapshot().is_some_and(|t| t.id == id)
    }

    /// Fail `processing` records that no job owns. Returns how many were
    /// recovered.
    pub async fn recover_interrupted(&self) -> usize {
        let tasks = match self.queue.list_pending_like().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list tasks for recovery");
                return 0;
            }
        };

        let mut recovered = 0;
        for mut task in tasks {
            if task.status != TaskStatus::Processing || self.is_active(task.id) {
                continue;
            }
            task.fail(INTERRUPTED_MESSAGE);
            match self.queue.update(task.clone()).await {
                Ok(()) => {
                    tracing::warn!(task_id = %task.id, "Recovered interrupted task");
                    recovered += 1;
                }
                Err(e) => {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to recover interrupted task");
                }
            }
        }
        recovered
    }

    async fn run_job(self, task: Task, cancel: CancellationToken, guard: ClaimGuard) {
        let task_id = task.id;
        if let Some(task) = self.execute(task, &cancel).await {
            self.finish(&task).await;
        }

        drop(guard);
        self.hub.publish_active(None).await;
        self.queue.admission_signal().notify_one();
        tracing::debug!(task_id = %task_id, "Job slot released");
    }

    /// Drive one claimed task to a terminal state. Returns `None` if the
    /// job was abandoned before it started.
    async fn execute(&self, mut task: Task, cancel: &CancellationToken) -> Option<Task> {
        let task_id = task.id;
        tracing::info!(task_id = %task_id, path = %task.source_path.display(), "Conversion starting");
        if let Some(audio) = &task.audio_info {
            tracing::info!(
                task_id = %task_id,
                codec = %audio.codec_name,
                layout = %audio.channel_layout,
                channels = audio.channels,
                sample_rate = %audio.sample_rate,
                "Source audio",
            );
        }

        // ffprobe is bounded by the tools' timeout and killed when this
        // future is dropped on cancel.
        let source = task.source_path.clone();
        let probed = tokio::select! {
            _ = cancel.cancelled() => {
                task.cancel();
                tracing::warn!(task_id = %task_id, "Conversion cancelled before start");
                self.hub
                    .publish_progress(task_id, task.progress, TaskStatus::Error, "conversion cancelled")
                    .await;
                return Some(task);
            }
            probed = self.config.tools.probe_duration(&source) => probed,
        };
        let duration = match probed {
            Ok(secs) => {
                tracing::info!(task_id = %task_id, duration_secs = secs, "Source duration probed");
                secs
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Could not probe duration, percent disabled");
                0.0
            }
        };

        let output_path = match naming::generate_output_path(&task.source_path).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Could not choose output path");
                task.fail(format!("failed to choose output path: {e}"));
                self.hub
                    .publish_progress(task_id, 0, TaskStatus::Error, "conversion failed")
                    .await;
                return Some(task);
            }
        };

        // Started.
        task.start(output_path.clone(), duration, chrono::Utc::now());
        if let Err(e) = self.queue.update(task.clone()).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to persist job start, abandoning");
            return None;
        }
        self.slot.refresh(&task);
        self.hub
            .publish_progress(task_id, 0, TaskStatus::Processing, "conversion started")
            .await;
        self.hub.publish_active(Some(task.clone())).await;

        // Running.
        let command = self
            .config
            .tools
            .conversion_command(&task.source_path, &output_path);
        let settings = SupervisorSettings {
            throttle: self.config.progress_throttle,
            timeout: self.config.job_timeout,
            drain_grace: self.config.drain_grace,
        };
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let (outcome, ()) = tokio::join!(
            process::supervise(command, cancel, &settings, tx),
            self.consume_signals(&mut task, rx),
        );

        match outcome {
            JobOutcome::Succeeded => {
                task.complete(chrono::Utc::now());
                tracing::info!(
                    task_id = %task_id,
                    output = %output_path.display(),
                    "Conversion completed",
                );
                self.check_output(task_id, &output_path).await;
                self.backup_source(task_id, &task.source_path).await;
                self.hub
                    .publish_progress(task_id, 100, TaskStatus::Completed, "conversion completed")
                    .await;
            }
            JobOutcome::Cancelled => {
                task.cancel();
                tracing::warn!(task_id = %task_id, "Conversion cancelled");
                remove_partial_output(task_id, &output_path).await;
                self.hub
                    .publish_progress(task_id, task.progress, TaskStatus::Error, "conversion cancelled")
                    .await;
            }
            JobOutcome::TimedOut(limit) => {
                task.fail(format!("conversion timed out after {}s", limit.as_secs()));
                tracing::error!(task_id = %task_id, timeout_secs = limit.as_secs(), "Conversion timed out");
                remove_partial_output(task_id, &output_path).await;
                self.publish_failure(&task).await;
            }
            JobOutcome::Failed(message) => {
                tracing::error!(task_id = %task_id, error = %message, "Conversion failed");
                task.fail(message);
                remove_partial_output(task_id, &output_path).await;
                self.publish_failure(&task).await;
            }
        }

        Some(task)
    }

    /// Fold supervisor signals into the task and forward them to observers.
    /// Ends when both stream readers are done.
    async fn consume_signals(&self, task: &mut Task, mut rx: mpsc::Receiver<JobSignal>) {
        let mut percent: u8 = 0;
        while let Some(signal) = rx.recv().await {
            match signal {
                JobSignal::Progress {
                    current_time,
                    summary,
                } => {
                    let current = current_time.unwrap_or(task.current_time);
                    percent = percent.max(percent_complete(current, task.duration));
                    task.record_progress(current, percent);
                    self.slot.refresh(task);
                    tracing::debug!(
                        task_id = %task.id,
                        percent,
                        current_secs = current,
                        duration_secs = task.duration,
                        "Conversion progress",
                    );

                    if let Err(e) = self.queue.update(task.clone()).await {
                        tracing::warn!(task_id = %task.id, error = %e, "Failed to persist progress");
                    }
                    self.hub
                        .publish_progress(task.id, percent, TaskStatus::Processing, summary)
                        .await;
                }
                JobSignal::Diagnostics(text) => {
                    self.hub.publish_log(text, LogLevel::Info).await;
                }
            }
        }
    }

    async fn publish_failure(&self, task: &Task) {
        let message = match &task.error {
            Some(error) => format!("conversion failed: {error}"),
            None => "conversion failed".to_string(),
        };
        self.hub
            .publish_progress(task.id, task.progress, TaskStatus::Error, message)
            .await;
    }

    async fn check_output(&self, task_id: TaskId, output: &Path) {
        match tokio::fs::try_exists(output).await {
            Ok(true) => {
                tracing::info!(task_id = %task_id, output = %output.display(), "Output file present");
            }
            Ok(false) => {
                tracing::error!(task_id = %task_id, output = %output.display(), "Output file missing after conversion");
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, output = %output.display(), error = %e, "Could not check output file");
            }
        }
    }

    async fn backup_source(&self, task_id: TaskId, source: &Path) {
        match naming::rename_to_backup(source).await {
            Ok(backup) => {
                tracing::info!(task_id = %task_id, backup = %backup.display(), "Source renamed to backup");
            }
            Err(e) => {
                let source_exists = tokio::fs::try_exists(source).await.unwrap_or(false);
                tracing::error!(
                    task_id = %task_id,
                    source = %source.display(),
                    source_exists,
                    error = %e,
                    "Failed to rename source to backup",
                );
            }
        }
    }

    /// Persist the terminal state. The queue republishes the snapshot.
    async fn finish(&self, task: &Task) {
        match self.queue.update(task.clone()).await {
            Ok(()) => {
                tracing::info!(task_id = %task.id, status = %task.status, "Task finished");
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, status = %task.status, error = %e, "Failed to persist final task state");
            }
        }
    }
}

async fn remove_partial_output(task_id: TaskId, output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {
            tracing::info!(task_id = %task_id, output = %output.display(), "Removed partial output");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(task_id = %task_id, output = %output.display(), error = %e, "Failed to remove partial output");
        }
    }
}
