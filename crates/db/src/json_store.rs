//! [`TaskStore`] backed by a single pretty-printed JSON file.
//!
//! The whole map is rewritten on every mutation: serialized to a sibling
//! temp file, then renamed over the real one. A crash mid-write leaves the
//! previous file intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dtsfix_core::task::Task;
use dtsfix_core::types::TaskId;
use tokio::sync::{Mutex, RwLock};

use crate::store::{newest_first, pending_oldest_first, StoreError, StoreResult, TaskStore};

pub struct JsonTaskStore {
    path: PathBuf,
    tasks: RwLock<BTreeMap<TaskId, Task>>,
    /// Serializes file writes so they land in mutation order.
    write_lock: Mutex<()>,
}

impl JsonTaskStore {
    /// Open the store at `path`, creating the parent directory. A missing
    /// file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tasks = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), count = tasks.len(), "Task store opened");

        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current map to disk. The map lock is released before any
    /// file I/O.
    async fn persist(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let bytes = {
            let tasks = self.tasks.read().await;
            serde_json::to_vec_pretty(&*tasks)?
        };

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn create(&self, task: &Task) -> StoreResult<()> {
        {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(&task.id) {
                return Err(StoreError::Duplicate(task.id));
            }
            tasks.insert(task.id, task.clone());
        }
        self.persist().await
    }

    async fn update(&self, task: &Task) -> StoreResult<()> {
        {
            let mut tasks = self.tasks.write().await;
            let slot = tasks.get_mut(&task.id).ok_or(StoreError::NotFound(task.id))?;
            *slot = task.clone();
        }
        self.persist().await
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<Task>> {
        let all = self.tasks.read().await.values().cloned().collect();
        Ok(newest_first(all))
    }

    async fn list_pending_like(&self) -> StoreResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(pending_oldest_first(tasks.values().cloned()))
    }

    async fn delete(&self, id: TaskId) -> StoreResult<()> {
        {
            let mut tasks = self.tasks.write().await;
            tasks.remove(&id).ok_or(StoreError::NotFound(id))?;
        }
        self.persist().await
    }

    async fn flush(&self) -> StoreResult<()> {
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dtsfix_core::task::TaskStatus;

    async fn open_temp() -> (tempfile::TempDir, JsonTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("data/tasks.json"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let (_dir, store) = open_temp().await;
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.path().parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_create_get_and_duplicate() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("/m/a.mkv", None);
        store.create(&task).await.unwrap();

        assert_eq!(store.get(task.id).await.unwrap(), Some(task.clone()));
        assert_matches!(store.create(&task).await, Err(StoreError::Duplicate(id)) if id == task.id);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("/m/a.mkv", None);
        assert_matches!(store.update(&task).await, Err(StoreError::NotFound(_)));
        assert!(store.get(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("/m/a.mkv", None);
        store.create(&task).await.unwrap();
        store.delete(task.id).await.unwrap();
        assert!(store.get(task.id).await.unwrap().is_none());
        assert_matches!(store.delete(task.id).await, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_orders() {
        let (_dir, store) = open_temp().await;
        let a = Task::new("/m/a.mkv", None);
        let b = Task::new("/m/b.mkv", None);
        let mut c = Task::new("/m/c.mkv", None);
        c.fail("boom");
        for t in [&a, &b, &c] {
            store.create(t).await.unwrap();
        }

        let all: Vec<TaskId> = store.list_all().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all, vec![c.id, b.id, a.id]);

        let pending: Vec<TaskId> = store
            .list_pending_like()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(pending, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_list_all_is_bounded() {
        let (_dir, store) = open_temp().await;
        for i in 0..(crate::store::LIST_LIMIT + 5) {
            store.create(&Task::new(format!("/m/{i}.mkv"), None)).await.unwrap();
        }
        assert_eq!(store.list_all().await.unwrap().len(), crate::store::LIST_LIMIT);
    }

    #[tokio::test]
    async fn test_reopen_restores_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let mut task = Task::new("/m/a.mkv", None);
        {
            let store = JsonTaskStore::open(&path).await.unwrap();
            store.create(&task).await.unwrap();
            task.fail("boom");
            store.update(&task).await.unwrap();
            store.flush().await.unwrap();
        }

        let reopened = JsonTaskStore::open(&path).await.unwrap();
        let loaded = reopened.get(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Error);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_open_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_matches!(
            JsonTaskStore::open(&path).await.err(),
            Some(StoreError::Serde(_))
        );
    }
}
