//! Dependency rules and per-task resource constraints.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::task::{TaskId, TaskPriority, TaskStatus};

/// Which condition a dependency rule waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Waits for another task to reach a given priority.
    PriorityBased,
    /// Waits for another task to reach a given status.
    StatusBased,
    /// Waits for both priority and status simultaneously.
    Combined,
}

/// A declared wait condition owned by one task.
///
/// Registered by callers; never auto-expires. A rule of kind `Combined`
/// must carry both a required priority and a required status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    /// The task that owns (waits because of) this rule.
    pub task_id: TaskId,
    /// What the rule waits on.
    pub kind: DependencyKind,
    /// Required priority of the blocking task, if priority-based or combined.
    pub required_priority: Option<TaskPriority>,
    /// Required status of the blocking task, if status-based or combined.
    pub required_status: Option<TaskStatus>,
    /// Rule strength in `[0, 1]`; weaker rules are released first.
    pub strength: f64,
    /// Timeout budget for waits induced by this rule.
    pub timeout_ms: u64,
}

impl DependencyRule {
    /// Create a priority-based rule.
    pub fn priority_based(task_id: impl Into<TaskId>, required: TaskPriority) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::PriorityBased,
            required_priority: Some(required),
            required_status: None,
            strength: 1.0,
            timeout_ms: 10_000,
        }
    }

    /// Create a status-based rule.
    pub fn status_based(task_id: impl Into<TaskId>, required: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::StatusBased,
            required_priority: None,
            required_status: Some(required),
            strength: 1.0,
            timeout_ms: 10_000,
        }
    }

    /// Create a combined rule requiring both priority and status.
    pub fn combined(
        task_id: impl Into<TaskId>,
        priority: TaskPriority,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::Combined,
            required_priority: Some(priority),
            required_status: Some(status),
            strength: 1.0,
            timeout_ms: 10_000,
        }
    }

    /// Set the rule strength.
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    /// Check the invariants for the declared kind.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` when a required field is missing for
    /// the declared kind or the strength is out of range.
    pub fn validate(&self) -> EngineResult<()> {
        match self.kind {
            DependencyKind::PriorityBased if self.required_priority.is_none() => {
                return Err(EngineError::Validation {
                    message: format!(
                        "priority-based rule for task {} is missing required_priority",
                        self.task_id
                    ),
                });
            }
            DependencyKind::StatusBased if self.required_status.is_none() => {
                return Err(EngineError::Validation {
                    message: format!(
                        "status-based rule for task {} is missing required_status",
                        self.task_id
                    ),
                });
            }
            DependencyKind::Combined
                if self.required_priority.is_none() || self.required_status.is_none() =>
            {
                return Err(EngineError::Validation {
                    message: format!(
                        "combined rule for task {} requires both required_priority and required_status",
                        self.task_id
                    ),
                });
            }
            _ => {}
        }

        if !(0.0..=1.0).contains(&self.strength) {
            return Err(EngineError::Validation {
                message: format!(
                    "rule strength {} for task {} is outside [0, 1]",
                    self.strength, self.task_id
                ),
            });
        }

        Ok(())
    }
}

/// Resource constraints attached to a task's execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConstraints {
    /// Maximum concurrent operations the task may hold.
    pub max_concurrency: usize,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retry budget for collaborator mutations.
    pub max_retries: u32,
    /// Base backoff between retries in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ResourceConstraints {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}
