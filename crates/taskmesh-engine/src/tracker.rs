//! Active operation tracking and per-operation timeouts.
//!
//! Each registered operation arms a timer. When the timer fires before the
//! operation is unregistered, the task is dropped from tracking and a
//! timeout event is emitted; the engine reacts by running an out-of-band
//! detection pass. This is how deadlocks are discovered that a graph scan
//! alone would miss, e.g. a worker that silently hung without declaring a
//! dependency.
//!
//! Invariant: at most one active operation per task. Re-registering replaces
//! the previous entry and disarms its timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use taskmesh_core::{OperationKind, TaskId};

/// An operation currently in flight for one task.
#[derive(Debug)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    pub started_at: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl ActiveOperation {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Tracks in-flight operations and arms a timeout per entry.
pub struct OperationTracker {
    active: Arc<DashMap<TaskId, ActiveOperation>>,
    timeout: Duration,
    events: mpsc::UnboundedSender<TaskId>,
    generation: AtomicU64,
}

impl OperationTracker {
    /// Create a tracker with the given per-operation timeout.
    ///
    /// Returns the tracker and the receiver of timeout events (one task id
    /// per fired timeout).
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<TaskId>) {
        let (events, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            active: Arc::new(DashMap::new()),
            timeout,
            events,
            generation: AtomicU64::new(0),
        };
        (tracker, rx)
    }

    /// Register an operation for a task and arm its timeout.
    ///
    /// Replaces (and disarms) any previous entry for the same task.
    pub fn register(&self, task_id: TaskId, kind: OperationKind) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let timer = {
            let active = Arc::clone(&self.active);
            let events = self.events.clone();
            let task_id = task_id.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;

                // Only fire for the entry this timer was armed for.
                let removed = active.remove_if(&task_id, |_, op| op.generation == generation);
                if removed.is_some() {
                    debug!(task_id = %task_id, timeout_ms = timeout.as_millis() as u64,
                        "operation timed out");
                    let _ = events.send(task_id);
                }
            })
        };

        let operation = ActiveOperation {
            kind,
            started_at: Instant::now(),
            generation,
            timer: Some(timer),
        };

        if let Some(mut previous) = self.active.insert(task_id, operation) {
            previous.disarm();
        }
    }

    /// Unregister an operation, disarming its timer.
    ///
    /// Returns the elapsed duration of the operation when one was active.
    pub fn unregister(&self, task_id: &TaskId) -> Option<Duration> {
        let (_, mut operation) = self.active.remove(task_id)?;
        operation.disarm();
        Some(operation.started_at.elapsed())
    }

    /// Whether a task currently has an in-flight operation.
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.active.contains_key(task_id)
    }

    /// Number of in-flight operations.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Snapshot of active operations as (task id, kind) pairs.
    pub fn snapshot(&self) -> Vec<(TaskId, OperationKind)> {
        self.active
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().kind))
            .collect()
    }

    /// Disarm and drop all entries.
    pub fn clear(&self) {
        for mut entry in self.active.iter_mut() {
            entry.value_mut().disarm();
        }
        self.active.clear();
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let (tracker, _rx) = OperationTracker::new(Duration::from_secs(10));

        tracker.register("t1".to_string(), OperationKind::Execute);
        assert!(tracker.is_active(&"t1".to_string()));
        assert_eq!(tracker.active_count(), 1);

        let duration = tracker.unregister(&"t1".to_string());
        assert!(duration.is_some());
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_one_entry_per_task() {
        let (tracker, _rx) = OperationTracker::new(Duration::from_secs(10));

        tracker.register("t1".to_string(), OperationKind::Create);
        tracker.register("t1".to_string(), OperationKind::Execute);

        assert_eq!(tracker.active_count(), 1);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].1, OperationKind::Execute);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_and_unregisters() {
        let (tracker, mut rx) = OperationTracker::new(Duration::from_millis(100));

        tracker.register("slow".to_string(), OperationKind::Execute);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, "slow");
        assert!(!tracker.is_active(&"slow".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_disarms_timeout() {
        let (tracker, mut rx) = OperationTracker::new(Duration::from_millis(100));

        tracker.register("fast".to_string(), OperationKind::Execute);
        tracker.unregister(&"fast".to_string());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_entry_does_not_fire_stale_timeout() {
        let (tracker, mut rx) = OperationTracker::new(Duration::from_millis(100));

        tracker.register("t1".to_string(), OperationKind::Create);
        // Replace just before the first timer would fire.
        tokio::time::sleep(Duration::from_millis(60)).await;
        tracker.register("t1".to_string(), OperationKind::Execute);

        // Stale timer horizon passes; only the new timer may fire later.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(tracker.is_active(&"t1".to_string()));
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.recv().await.unwrap(), "t1");
    }
}
