//! Error taxonomy for the taskmesh engine.
//!
//! Errors inside a single resolution strategy are contained to that strategy
//! and reported as a failed application; errors inside the overall
//! coordinator flow are caught at the top level and become a failed
//! execution result. Callers never receive an unhandled panic.

use thiserror::Error;

use crate::types::task::TaskId;

/// Convenience alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the deadlock engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A dependency rule is malformed for its declared kind.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A strategy name is not in the known set. Logged and treated as a
    /// resolution failure; never crashes the pass.
    #[error("unknown resolution strategy: {name}")]
    UnknownStrategy { name: String },

    /// The task mutation collaborator rejected a callback.
    #[error("mutation of task {task_id} failed: {reason}")]
    Mutation { task_id: TaskId, reason: String },

    /// An operation exceeded its registered timeout. Not surfaced to
    /// callers; this triggers a new detection pass.
    #[error("operation on task {task_id} timed out after {timeout_ms}ms")]
    Timeout { task_id: TaskId, timeout_ms: u64 },

    /// A cycle member is absent from the current task snapshot.
    #[error("task {task_id} is not present in the snapshot")]
    MissingTask { task_id: TaskId },

    /// The snapshot provider failed.
    #[error("task snapshot unavailable: {reason}")]
    Snapshot { reason: String },

    /// The request or engine was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// Invalid engine state or configuration.
    #[error("engine state error: {message}")]
    State { message: String },
}
