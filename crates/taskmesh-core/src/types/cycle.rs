//! Detected deadlock cycles and resolution strategy names.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::task::{TaskId, TaskPriority, TaskStatus};

/// Dominant dependency flavor of a detected cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleType {
    /// Priority requirements dominate the cycle.
    PriorityInversion,
    /// Status requirements dominate the cycle.
    StatusWait,
    /// Neither flavor dominates.
    MixedDependency,
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleType::PriorityInversion => write!(f, "priority-inversion"),
            CycleType::StatusWait => write!(f, "status-wait"),
            CycleType::MixedDependency => write!(f, "mixed-dependency"),
        }
    }
}

/// Severity classification of a detected cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One task participating in a cycle, with the tasks it was waiting for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMember {
    pub task_id: TaskId,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Outgoing waits-for edges of this member inside the graph.
    pub waiting_for: BTreeSet<TaskId>,
}

/// A simple cycle discovered during one detection pass.
///
/// Ephemeral: cycles are recomputed fresh on every pass and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockCycle {
    /// Unique id for this detection of the cycle.
    pub cycle_id: String,
    /// Members in path order.
    pub members: Vec<CycleMember>,
    pub cycle_type: CycleType,
    pub severity: Severity,
    /// Heuristic resolution cost in milliseconds; orders strategies, not a
    /// measured time.
    pub estimated_resolution_ms: u64,
}

impl DeadlockCycle {
    /// Number of member tasks.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the cycle has no members (never produced by detection).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member ids in path order.
    pub fn member_ids(&self) -> Vec<TaskId> {
        self.members.iter().map(|m| m.task_id.clone()).collect()
    }
}

/// Result of one full detection pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub has_deadlock: bool,
    pub cycles: Vec<DeadlockCycle>,
    /// Union of the member ids of all cycles.
    pub conflicting_tasks: BTreeSet<TaskId>,
    /// Deterministic prevention suggestions, de-duplicated.
    pub prevention_actions: Vec<String>,
    /// Candidate strategies across all cycles, de-duplicated.
    pub resolution_strategies: Vec<ResolutionStrategy>,
    /// Sum of the per-cycle estimates.
    pub total_resolution_ms: u64,
}

/// A known resolution technique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    PriorityInheritance,
    PriorityDonation,
    StatusForceTransition,
    ConditionalDependencyRelease,
    DependencyBreaking,
    CircularWaitElimination,
    TaskRollback,
    ResourcePreemption,
    TimeoutBasedRecovery,
    VictimSelection,
    ResourceReallocation,
    GracefulDegradation,
}

impl ResolutionStrategy {
    /// The wire name of the strategy.
    pub fn name(self) -> &'static str {
        match self {
            ResolutionStrategy::PriorityInheritance => "priority-inheritance",
            ResolutionStrategy::PriorityDonation => "priority-donation",
            ResolutionStrategy::StatusForceTransition => "status-force-transition",
            ResolutionStrategy::ConditionalDependencyRelease => "conditional-dependency-release",
            ResolutionStrategy::DependencyBreaking => "dependency-breaking",
            ResolutionStrategy::CircularWaitElimination => "circular-wait-elimination",
            ResolutionStrategy::TaskRollback => "task-rollback",
            ResolutionStrategy::ResourcePreemption => "resource-preemption",
            ResolutionStrategy::TimeoutBasedRecovery => "timeout-based-recovery",
            ResolutionStrategy::VictimSelection => "victim-selection",
            ResolutionStrategy::ResourceReallocation => "resource-reallocation",
            ResolutionStrategy::GracefulDegradation => "graceful-degradation",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority-inheritance" => Ok(ResolutionStrategy::PriorityInheritance),
            "priority-donation" => Ok(ResolutionStrategy::PriorityDonation),
            "status-force-transition" => Ok(ResolutionStrategy::StatusForceTransition),
            "conditional-dependency-release" => Ok(ResolutionStrategy::ConditionalDependencyRelease),
            "dependency-breaking" => Ok(ResolutionStrategy::DependencyBreaking),
            "circular-wait-elimination" => Ok(ResolutionStrategy::CircularWaitElimination),
            "task-rollback" => Ok(ResolutionStrategy::TaskRollback),
            "resource-preemption" => Ok(ResolutionStrategy::ResourcePreemption),
            "timeout-based-recovery" => Ok(ResolutionStrategy::TimeoutBasedRecovery),
            "victim-selection" => Ok(ResolutionStrategy::VictimSelection),
            "resource-reallocation" => Ok(ResolutionStrategy::ResourceReallocation),
            "graceful-degradation" => Ok(ResolutionStrategy::GracefulDegradation),
            other => Err(EngineError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_strategy_name_round_trip() {
        let strategies = [
            ResolutionStrategy::PriorityInheritance,
            ResolutionStrategy::TaskRollback,
            ResolutionStrategy::VictimSelection,
        ];
        for strategy in strategies {
            assert_eq!(strategy.name().parse::<ResolutionStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_unknown_strategy_is_error() {
        let err = "cosmic-ray-mitigation".parse::<ResolutionStrategy>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy { .. }));
    }
}
