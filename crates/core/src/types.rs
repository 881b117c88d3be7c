/// Task identifiers are UUIDv7, so they sort by creation time.
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh task identifier.
///
/// `Uuid::now_v7` is monotonic within a process, so two tasks created in the
/// same millisecond still order by creation.
pub fn new_task_id() -> TaskId {
    uuid::Uuid::now_v7()
}
