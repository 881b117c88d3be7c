//! Task queue coordinator.
//!
//! All store mutations go through one [`QueueCoordinator`] loop, fed by a
//! bounded command channel. [`QueueHandle`] is the cheap, cloneable front
//! door: `submit` returns once the creation request is enqueued, while
//! `update` and `delete` wait for the loop to apply them. Reads go straight
//! to the store.

use std::sync::Arc;
use std::time::Duration;

use dtsfix_core::task::Task;
use dtsfix_core::types::TaskId;
use dtsfix_db::{StoreError, TaskStore};
use dtsfix_events::BroadcastHub;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;

/// Default bound on queued mutation commands.
const DEFAULT_CAPACITY: usize = 100;

/// Default interval between full queue snapshots.
const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Commands buffered before `submit` starts waiting.
    pub capacity: usize,
    /// How often the full task list is republished.
    pub snapshot_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task queue is shut down")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type QueueResult<T> = Result<T, QueueError>;

enum QueueCommand {
    Create(Task),
    Update {
        task: Task,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Delete {
        id: TaskId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Handle for submitting work to the coordinator and reading the store.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<QueueCommand>,
    store: Arc<dyn TaskStore>,
    admitted: Arc<Notify>,
}

impl QueueHandle {
    /// Enqueue a new task. Waits while the command channel is full.
    pub async fn submit(&self, task: Task) -> QueueResult<()> {
        self.tx
            .send(QueueCommand::Create(task))
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Persist a mutated task and republish the queue.
    pub async fn update(&self, task: Task) -> QueueResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Update { task, reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)??;
        Ok(())
    }

    /// Remove a task record and republish the queue.
    pub async fn delete(&self, id: TaskId) -> QueueResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Delete { id, reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)??;
        Ok(())
    }

    pub async fn get(&self, id: TaskId) -> QueueResult<Option<Task>> {
        Ok(self.store.get(id).await?)
    }

    /// Newest first, bounded.
    pub async fn list_all(&self) -> QueueResult<Vec<Task>> {
        Ok(self.store.list_all().await?)
    }

    /// `pending` and `processing` tasks, oldest first.
    pub async fn list_pending_like(&self) -> QueueResult<Vec<Task>> {
        Ok(self.store.list_pending_like().await?)
    }

    /// Signalled each time a new task has been persisted.
    pub fn admission_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.admitted)
    }
}

/// The single writer of the task store.
pub struct QueueCoordinator {
    store: Arc<dyn TaskStore>,
    hub: Arc<BroadcastHub>,
    rx: mpsc::Receiver<QueueCommand>,
    admitted: Arc<Notify>,
    snapshot_interval: Duration,
}

impl QueueCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        hub: Arc<BroadcastHub>,
        config: QueueConfig,
    ) -> (Self, QueueHandle) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let admitted = Arc::new(Notify::new());
        let handle = QueueHandle {
            tx,
            store: Arc::clone(&store),
            admitted: Arc::clone(&admitted),
        };
        let coordinator = Self {
            store,
            hub,
            rx,
            admitted,
            snapshot_interval: config.snapshot_interval,
        };
        (coordinator, handle)
    }

    /// Run the coordinator loop until the cancellation token is triggered.
    ///
    /// Commands already queued at shutdown are still applied.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.snapshot_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            snapshot_interval_ms = self.snapshot_interval.as_millis() as u64,
            "Queue coordinator started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue coordinator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.broadcast_snapshot().await;
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            tracing::info!("All queue handles dropped, coordinator stopping");
                            break;
                        }
                    }
                }
            }
        }

        self.rx.close();
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd).await;
        }
    }

    async fn handle(&self, cmd: QueueCommand) {
        match cmd {
            QueueCommand::Create(task) => {
                let task_id = task.id;
                match self.store.create(&task).await {
                    Ok(()) => {
                        tracing::info!(task_id = %task_id, path = %task.source_path.display(), "Task queued");
                        self.admitted.notify_one();
                        self.broadcast_snapshot().await;
                    }
                    Err(e) => {
                        tracing::error!(task_id = %task_id, error = %e, "Failed to persist new task");
                    }
                }
            }
            QueueCommand::Update { task, reply } => {
                let result = self.store.update(&task).await;
                match &result {
                    Ok(()) => self.broadcast_snapshot().await,
                    Err(e) => {
                        tracing::error!(task_id = %task.id, error = %e, "Failed to persist task update");
                    }
                }
                let _ = reply.send(result);
            }
            QueueCommand::Delete { id, reply } => {
                let result = self.store.delete(id).await;
                match &result {
                    Ok(()) => self.broadcast_snapshot().await,
                    Err(e) => {
                        tracing::warn!(task_id = %id, error = %e, "Failed to delete task");
                    }
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn broadcast_snapshot(&self) {
        match self.store.list_all().await {
            Ok(tasks) => {
                self.hub.publish_queue(tasks).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load tasks for queue snapshot");
            }
        }
    }
}
