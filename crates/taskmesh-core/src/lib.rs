//! Taskmesh Core - Fundamental types and traits for the taskmesh engine.
//!
//! This crate provides the data model shared by the deadlock detection and
//! resolution engine and its external collaborators: task snapshots,
//! dependency rules, detected cycles, resolution strategies, operation and
//! pressure types, the error taxonomy, and the collaborator trait seams.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use traits::{TaskMutationService, TaskSnapshotProvider};
pub use types::{
    CycleMember, CycleType, DeadlockCycle, DependencyKind, DependencyRule, DetectionResult,
    ExecutionRequest, ExecutionResult, OperationKind, PressureLevel, PressureMetrics,
    PriorityChange, ResolutionStrategy, ResourceConstraints, Severity, Task, TaskId, TaskPriority,
    TaskStatus,
};
