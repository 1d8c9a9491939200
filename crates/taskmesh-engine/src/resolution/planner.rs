//! Deterministic strategy and prevention tables.

use taskmesh_core::{CycleType, DeadlockCycle, ResolutionStrategy, Severity};

/// Candidate strategies for one cycle, keyed on type and severity.
///
/// Order is significant (preferred first); de-duplicated with set semantics
/// preserving first insertion.
pub fn strategies_for(cycle: &DeadlockCycle) -> Vec<ResolutionStrategy> {
    let mut strategies = Vec::new();

    let by_type: &[ResolutionStrategy] = match cycle.cycle_type {
        CycleType::PriorityInversion => &[
            ResolutionStrategy::PriorityInheritance,
            ResolutionStrategy::PriorityDonation,
        ],
        CycleType::StatusWait => &[
            ResolutionStrategy::StatusForceTransition,
            ResolutionStrategy::ConditionalDependencyRelease,
        ],
        CycleType::MixedDependency => &[
            ResolutionStrategy::DependencyBreaking,
            ResolutionStrategy::CircularWaitElimination,
        ],
    };
    push_unique(&mut strategies, by_type);

    if cycle.severity >= Severity::High {
        push_unique(
            &mut strategies,
            &[
                ResolutionStrategy::TaskRollback,
                ResolutionStrategy::ResourcePreemption,
            ],
        );
    }

    strategies
}

/// Prevention suggestions for one cycle, keyed on type and severity.
pub fn prevention_for(cycle: &DeadlockCycle) -> Vec<String> {
    let mut actions: Vec<&str> = match cycle.cycle_type {
        CycleType::PriorityInversion => {
            vec!["apply-priority-ceilings", "review-priority-assignments"]
        }
        CycleType::StatusWait => vec!["add-status-timeouts", "stagger-status-transitions"],
        CycleType::MixedDependency => {
            vec!["simplify-dependency-rules", "enforce-acquisition-ordering"]
        }
    };

    if cycle.severity >= Severity::High {
        actions.push("reduce-task-concurrency");
    }

    actions.into_iter().map(str::to_string).collect()
}

/// Select the single strategy applied to one cycle.
///
/// Critical severity always rolls back; otherwise the dominant flavor picks
/// its classic remedy, and mixed cycles fall back to timed recovery.
pub fn select_strategy(cycle: &DeadlockCycle) -> ResolutionStrategy {
    if cycle.severity == Severity::Critical {
        return ResolutionStrategy::TaskRollback;
    }
    match cycle.cycle_type {
        CycleType::PriorityInversion => ResolutionStrategy::PriorityInheritance,
        CycleType::StatusWait => ResolutionStrategy::StatusForceTransition,
        CycleType::MixedDependency => ResolutionStrategy::TimeoutBasedRecovery,
    }
}

/// Aggregate prevention and strategy lists over all cycles of a pass.
pub fn plan(cycles: &[DeadlockCycle]) -> (Vec<String>, Vec<ResolutionStrategy>) {
    let mut prevention: Vec<String> = Vec::new();
    let mut strategies: Vec<ResolutionStrategy> = Vec::new();

    for cycle in cycles {
        for action in prevention_for(cycle) {
            if !prevention.contains(&action) {
                prevention.push(action);
            }
        }
        push_unique(&mut strategies, &strategies_for(cycle));
    }

    (prevention, strategies)
}

/// Fallback chain applied over unresolved tasks after primary resolution
/// partially fails.
pub const FALLBACK_CHAIN: [ResolutionStrategy; 4] = [
    ResolutionStrategy::VictimSelection,
    ResolutionStrategy::PriorityInheritance,
    ResolutionStrategy::ResourceReallocation,
    ResolutionStrategy::GracefulDegradation,
];

fn push_unique(target: &mut Vec<ResolutionStrategy>, source: &[ResolutionStrategy]) {
    for strategy in source {
        if !target.contains(strategy) {
            target.push(*strategy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::{CycleMember, TaskPriority, TaskStatus};

    fn cycle(cycle_type: CycleType, severity: Severity) -> DeadlockCycle {
        let members = vec![CycleMember {
            task_id: "a".to_string(),
            priority: TaskPriority::Low,
            status: TaskStatus::Todo,
            waiting_for: Default::default(),
        }];
        DeadlockCycle {
            cycle_id: "test".to_string(),
            members,
            cycle_type,
            severity,
            estimated_resolution_ms: 1000,
        }
    }

    #[test]
    fn test_critical_always_selects_rollback() {
        for cycle_type in [
            CycleType::PriorityInversion,
            CycleType::StatusWait,
            CycleType::MixedDependency,
        ] {
            assert_eq!(
                select_strategy(&cycle(cycle_type, Severity::Critical)),
                ResolutionStrategy::TaskRollback
            );
        }
    }

    #[test]
    fn test_medium_priority_inversion_selects_inheritance() {
        assert_eq!(
            select_strategy(&cycle(CycleType::PriorityInversion, Severity::Medium)),
            ResolutionStrategy::PriorityInheritance
        );
    }

    #[test]
    fn test_status_wait_selects_force_transition() {
        assert_eq!(
            select_strategy(&cycle(CycleType::StatusWait, Severity::Low)),
            ResolutionStrategy::StatusForceTransition
        );
    }

    #[test]
    fn test_mixed_selects_timeout_recovery() {
        assert_eq!(
            select_strategy(&cycle(CycleType::MixedDependency, Severity::Medium)),
            ResolutionStrategy::TimeoutBasedRecovery
        );
    }

    #[test]
    fn test_high_severity_adds_rollback_and_preemption() {
        let strategies = strategies_for(&cycle(CycleType::PriorityInversion, Severity::High));
        assert_eq!(
            strategies,
            vec![
                ResolutionStrategy::PriorityInheritance,
                ResolutionStrategy::PriorityDonation,
                ResolutionStrategy::TaskRollback,
                ResolutionStrategy::ResourcePreemption,
            ]
        );
    }

    #[test]
    fn test_plan_deduplicates_across_cycles() {
        let cycles = vec![
            cycle(CycleType::StatusWait, Severity::Low),
            cycle(CycleType::StatusWait, Severity::Low),
        ];
        let (prevention, strategies) = plan(&cycles);
        assert_eq!(
            strategies,
            vec![
                ResolutionStrategy::StatusForceTransition,
                ResolutionStrategy::ConditionalDependencyRelease,
            ]
        );
        assert_eq!(prevention.len(), 2);
    }
}
