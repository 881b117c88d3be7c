use std::collections::HashMap;
use std::sync::Arc;

use dtsfix_core::task::{Task, TaskStatus};
use dtsfix_core::types::{TaskId, Timestamp};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::event::{HubEvent, LogLevel, ProgressUpdate};

/// A serialized frame shared by every observer it is delivered to.
pub type Frame = Arc<str>;

/// Outbound frames buffered per observer before new ones are dropped.
pub const OBSERVER_BUFFER: usize = 256;

/// Metadata for a single registered observer.
pub struct Observer {
    /// Channel sender for outbound frames to this observer.
    pub sender: mpsc::Sender<Frame>,
    /// When this observer registered.
    pub connected_at: Timestamp,
}

/// Fans hub events out to every live observer.
///
/// Publishing never waits on an observer: each one has a bounded queue
/// drained by its own writer task. A full queue drops the frame for that
/// observer only; a closed queue unregisters the observer.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct BroadcastHub {
    observers: RwLock<HashMap<String, Observer>>,
}

impl BroadcastHub {
    /// Create a new hub with no observers.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an observer.
    ///
    /// Returns the receiver half of its frame channel so the caller can
    /// forward frames to the connection's sink. Re-registering an id
    /// replaces the previous observer.
    pub async fn register(&self, id: impl Into<String>) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let observer = Observer {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        let id = id.into();
        let count = {
            let mut observers = self.observers.write().await;
            observers.insert(id.clone(), observer);
            observers.len()
        };
        tracing::info!(observer_id = %id, count, "Observer registered");
        rx
    }

    /// Remove an observer by id. Unknown ids are a no-op.
    pub async fn unregister(&self, id: &str) {
        let mut observers = self.observers.write().await;
        if let Some(observer) = observers.remove(id) {
            let connected_secs = (chrono::Utc::now() - observer.connected_at).num_seconds();
            tracing::info!(
                observer_id = %id,
                connected_secs,
                count = observers.len(),
                "Observer unregistered",
            );
        }
    }

    /// Serialize `event` once and deliver it to every observer.
    ///
    /// Returns the number of observers the frame was queued for.
    pub async fn publish(&self, event: &HubEvent) -> usize {
        let frame: Frame = match event.to_frame() {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(event_type = event.event_type(), error = %e, "Failed to serialize hub event");
                return 0;
            }
        };
        self.publish_frame(frame).await
    }

    async fn publish_frame(&self, frame: Frame) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let observers = self.observers.read().await;
            for (id, observer) in observers.iter() {
                match observer.sender.try_send(Arc::clone(&frame)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(observer_id = %id, "Observer queue full, dropping frame");
                    }
                    Err(TrySendError::Closed(_)) => dead.push(id.clone()),
                }
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers.write().await;
            for id in dead {
                // The id may have been re-registered in between.
                if observers.get(&id).is_some_and(|o| o.sender.is_closed()) {
                    observers.remove(&id);
                    tracing::debug!(observer_id = %id, "Removed closed observer");
                }
            }
        }

        delivered
    }

    /// Send a payload to a single observer. Returns `false` if the observer
    /// is unknown or cannot take the frame.
    pub async fn send_to<T: Serialize>(&self, id: &str, payload: &T) -> bool {
        let frame: Frame = match serde_json::to_string(payload) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(observer_id = %id, error = %e, "Failed to serialize direct message");
                return false;
            }
        };
        let observers = self.observers.read().await;
        match observers.get(id) {
            Some(observer) => observer.sender.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Return the current number of registered observers.
    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Drop every observer. Their receivers see the channel close, which
    /// ends their writer tasks.
    ///
    /// Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut observers = self.observers.write().await;
        let count = observers.len();
        observers.clear();
        tracing::info!(count, "Closed all observers");
    }

    // -----------------------------------------------------------------------
    // Typed helpers
    // -----------------------------------------------------------------------

    pub async fn publish_queue(&self, queue: Vec<Task>) -> usize {
        self.publish(&HubEvent::QueueUpdate { queue }).await
    }

    pub async fn publish_active(&self, active_task: Option<Task>) -> usize {
        self.publish(&HubEvent::ActiveTask { active_task }).await
    }

    pub async fn publish_progress(
        &self,
        task_id: TaskId,
        progress: u8,
        status: TaskStatus,
        message: impl Into<String>,
    ) -> usize {
        self.publish(&HubEvent::ConversionProgress(ProgressUpdate {
            task_id,
            progress,
            status,
            message: message.into(),
        }))
        .await
    }

    pub async fn publish_log(&self, message: impl Into<String>, level: LogLevel) -> usize {
        self.publish(&HubEvent::log(message, level)).await
    }

    pub async fn publish_scan_progress(
        &self,
        progress: u8,
        message: impl Into<String>,
        completed: bool,
    ) -> usize {
        self.publish(&HubEvent::ScanProgress {
            progress,
            message: message.into(),
            completed,
        })
        .await
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
