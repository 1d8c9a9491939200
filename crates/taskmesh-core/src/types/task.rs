//! Task snapshot types.
//!
//! Tasks are owned by the external task store; the engine only reads
//! snapshots of them and requests mutations through the collaborator traits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a task, assigned by the external task store.
pub type TaskId = String;

/// Priority of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    /// Numeric weight used for priority comparisons (low=1, medium=2, high=3).
    pub fn weight(self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
        }
    }

    /// The next priority up, saturating at `High`.
    pub fn boosted(self) -> Self {
        match self {
            TaskPriority::Low => TaskPriority::Medium,
            TaskPriority::Medium | TaskPriority::High => TaskPriority::High,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// Read-only snapshot of a task as supplied by the task store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Current priority.
    pub priority: TaskPriority,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Explicitly declared dependency links (ordered, no duplicates).
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Create a task snapshot with no declared dependencies.
    pub fn new(id: impl Into<TaskId>, priority: TaskPriority, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            priority,
            status,
            dependencies: Vec::new(),
        }
    }

    /// Add explicit dependency links.
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }
}
