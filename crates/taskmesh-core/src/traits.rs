//! Collaborator trait seams.
//!
//! The engine depends on exactly two external collaborators: a task store
//! that supplies fresh snapshots before each detection pass, and a mutation
//! service through which all task changes flow. Both are assumed to succeed
//! or fail atomically per call.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::task::{Task, TaskId, TaskPriority, TaskStatus};

/// Mutation entry points the engine calls back into.
#[async_trait]
pub trait TaskMutationService: Send + Sync {
    /// Set a task's status.
    async fn update_task_status(&self, task_id: &TaskId, status: TaskStatus) -> EngineResult<()>;

    /// Set a task's priority.
    async fn update_task_priority(
        &self,
        task_id: &TaskId,
        priority: TaskPriority,
    ) -> EngineResult<()>;
}

/// Supplies the current task set, called fresh before each detection pass.
#[async_trait]
pub trait TaskSnapshotProvider: Send + Sync {
    /// Return a snapshot of all known tasks.
    async fn get_all_tasks(&self) -> EngineResult<Vec<Task>>;
}
