//! Core data types for the taskmesh engine.
//!
//! This module contains the structures exchanged between the engine and its
//! collaborators:
//! - `Task`: read-only task snapshot owned by the task store
//! - `DependencyRule`: declared wait condition between tasks
//! - `DeadlockCycle` / `DetectionResult`: output of one detection pass
//! - `ResolutionStrategy`: the known resolution techniques
//! - `ExecutionRequest` / `ExecutionResult`: coordinator request surface
//! - `PressureMetrics`: resource utilization snapshot

pub mod cycle;
pub mod dependency;
pub mod operation;
pub mod pressure;
pub mod task;

pub use cycle::{CycleMember, CycleType, DeadlockCycle, DetectionResult, ResolutionStrategy, Severity};
pub use dependency::{DependencyKind, DependencyRule, ResourceConstraints};
pub use operation::{ExecutionRequest, ExecutionResult, OperationKind, PriorityChange};
pub use pressure::{PressureLevel, PressureMetrics};
pub use task::{Task, TaskId, TaskPriority, TaskStatus};
