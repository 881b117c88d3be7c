//! Task persistence port.

use async_trait::async_trait;
use dtsfix_core::task::Task;
use dtsfix_core::types::TaskId;

/// Maximum number of tasks returned by [`TaskStore::list_all`].
pub const LIST_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} already exists")]
    Duplicate(TaskId),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value persistence of [`Task`] records keyed by id.
///
/// Mutations (`create`, `update`, `delete`) are only issued from the queue
/// coordinator's loop; reads may come from anywhere.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the id
    /// is taken.
    async fn create(&self, task: &Task) -> StoreResult<()>;

    /// Replace an existing record. Fails with [`StoreError::NotFound`]
    /// rather than inserting.
    async fn update(&self, task: &Task) -> StoreResult<()>;

    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// Newest first, at most [`LIST_LIMIT`] records.
    async fn list_all(&self) -> StoreResult<Vec<Task>>;

    /// `pending` and `processing` records, oldest first.
    async fn list_pending_like(&self) -> StoreResult<Vec<Task>>;

    async fn delete(&self, id: TaskId) -> StoreResult<()>;

    /// Make every acknowledged mutation durable.
    async fn flush(&self) -> StoreResult<()>;
}

/// Sort newest first and truncate to [`LIST_LIMIT`].
pub(crate) fn newest_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    tasks.truncate(LIST_LIMIT);
    tasks
}

/// Keep pending-like records, oldest first.
pub(crate) fn pending_oldest_first(tasks: impl IntoIterator<Item = Task>) -> Vec<Task> {
    let mut pending: Vec<Task> = tasks.into_iter().filter(Task::is_pending_like).collect();
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    pending
}
