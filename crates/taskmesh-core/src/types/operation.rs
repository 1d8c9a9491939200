//! Execution request and result types for the coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::task::{TaskId, TaskPriority, TaskStatus};

/// Kind of operation a caller requests for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Execute,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Execute => write!(f, "execute"),
        }
    }
}

/// A caller request handled by the execution coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: TaskId,
    pub operation: OperationKind,
    /// Requested status for create/update pass-throughs.
    #[serde(default)]
    pub new_status: Option<TaskStatus>,
    /// Requested priority for create/update pass-throughs.
    #[serde(default)]
    pub new_priority: Option<TaskPriority>,
    /// Explicit dependencies declared with this request.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl ExecutionRequest {
    /// Build a request with no payload.
    pub fn new(task_id: impl Into<TaskId>, operation: OperationKind) -> Self {
        Self {
            task_id: task_id.into(),
            operation,
            new_status: None,
            new_priority: None,
            dependencies: Vec::new(),
        }
    }

    /// Attach a requested status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    /// Attach a requested priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.new_priority = Some(priority);
        self
    }

    /// Attach explicit dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Outcome of one coordinated execution request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub success: bool,
    pub operation: OperationKind,
    pub execution_time_ms: u64,
    pub deadlock_detected: bool,
    pub priority_rebalanced: bool,
    /// Priority after optional rebalancing, if known.
    pub final_priority: Option<TaskPriority>,
    /// Error message for failed requests.
    pub error: Option<String>,
}

/// A priority adjustment proposed or applied by the rebalancer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityChange {
    pub task_id: TaskId,
    pub old_priority: TaskPriority,
    pub new_priority: TaskPriority,
    pub reason: String,
}
