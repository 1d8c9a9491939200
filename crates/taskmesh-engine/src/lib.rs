//! Taskmesh Engine - dependency-aware deadlock detection and resolution.
//!
//! The engine watches a fleet of in-flight tasks that may wait on each other
//! through declared dependency rules. It builds a waits-for graph from fresh
//! task snapshots, detects cycles with a colored depth-first search,
//! classifies each cycle by dominant dependency flavor and severity, and
//! applies resolution strategies (priority inheritance, forced status
//! transitions, rollback, dependency breaking) through a mutation
//! collaborator so that workers never stall indefinitely.
//!
//! Supporting machinery:
//! - Per-operation timeouts that trigger out-of-band detection passes
//! - A periodic supervisor running detection while operations are active
//! - A resource pressure monitor gating proactive priority rebalancing
//! - Anti-thrashing cooldowns around automated priority changes
//! - A bounded history feeding cycle-type and timing statistics

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod engine;
pub mod graph;
pub mod history;
pub mod levels;
pub mod pressure;
pub mod registry;
pub mod resolution;
pub mod tracker;

mod rebalance;

pub use cancel::Cancellation;
pub use config::EngineConfig;
pub use coordinator::ExecutionCoordinator;
pub use engine::DeadlockEngine;
pub use history::{DeadlockHistoryEntry, History};
pub use levels::{ComplexDependency, DependencyLink, LevelRelation, LevelStore};
pub use pressure::PressureMonitor;
pub use rebalance::Rebalancer;
pub use registry::DependencyRegistry;
pub use tracker::OperationTracker;

// Re-export the shared data model for convenience.
pub use taskmesh_core::{
    CycleMember, CycleType, DeadlockCycle, DependencyKind, DependencyRule, DetectionResult,
    EngineError, EngineResult, ExecutionRequest, ExecutionResult, OperationKind, PressureLevel,
    PressureMetrics, PriorityChange, ResolutionStrategy, ResourceConstraints, Severity, Task,
    TaskId, TaskMutationService, TaskPriority, TaskSnapshotProvider, TaskStatus,
};
