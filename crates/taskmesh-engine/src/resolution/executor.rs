//! Strategy application against the task-mutation collaborator.
//!
//! Mutation failures are contained per call: the failing task is logged,
//! sibling mutations in the same strategy still run, and the strategy
//! reports failure. Mutations already applied are not rolled back
//! (best-effort, not transactional).

use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, warn};

use taskmesh_core::{
    DeadlockCycle, ResolutionStrategy, TaskMutationService, TaskPriority, TaskStatus,
};

use crate::cancel::Cancellation;
use crate::rebalance::Rebalancer;
use crate::registry::DependencyRegistry;
use crate::resolution::planner;
use crate::tracker::OperationTracker;

/// Applies resolution strategies to detected cycles.
pub struct ResolutionExecutor<'a> {
    pub mutator: &'a dyn TaskMutationService,
    pub registry: &'a DependencyRegistry,
    pub tracker: &'a OperationTracker,
    pub rebalancer: &'a Rebalancer,
    pub cancel: &'a Cancellation,
    /// Upper bound of the timeout-based-recovery wait.
    pub recovery_wait_cap_ms: u64,
    /// Pause between fallback strategies.
    pub fallback_pause_ms: u64,
}

impl ResolutionExecutor<'_> {
    /// Apply one strategy to one cycle. Returns whether every mutation the
    /// strategy attempted succeeded.
    pub async fn apply(&self, cycle: &DeadlockCycle, strategy: ResolutionStrategy) -> bool {
        debug!(
            cycle_id = %cycle.cycle_id,
            strategy = %strategy,
            members = cycle.len(),
            "applying resolution strategy"
        );

        match strategy {
            ResolutionStrategy::PriorityInheritance => self.priority_inheritance(cycle).await,
            ResolutionStrategy::PriorityDonation => self.priority_donation(cycle).await,
            ResolutionStrategy::StatusForceTransition => self.status_force_transition(cycle).await,
            ResolutionStrategy::TimeoutBasedRecovery => self.timeout_based_recovery(cycle).await,
            ResolutionStrategy::TaskRollback => self.task_rollback(cycle).await,
            ResolutionStrategy::DependencyBreaking
            | ResolutionStrategy::CircularWaitElimination => self.dependency_breaking(cycle),
            ResolutionStrategy::ConditionalDependencyRelease => self.conditional_release(cycle),
            ResolutionStrategy::ResourcePreemption => self.resource_preemption(cycle).await,
            ResolutionStrategy::VictimSelection => self.victim_selection(cycle),
            ResolutionStrategy::ResourceReallocation => {
                // Placeholder effect: give other work a chance to progress.
                tokio::task::yield_now().await;
                true
            }
            ResolutionStrategy::GracefulDegradation => true,
        }
    }

    /// Apply a strategy by wire name. An unknown name is logged and treated
    /// as a resolution failure; it never crashes the pass.
    pub async fn apply_named(&self, cycle: &DeadlockCycle, name: &str) -> bool {
        match ResolutionStrategy::from_str(name) {
            Ok(strategy) => self.apply(cycle, strategy).await,
            Err(error) => {
                warn!(%error, "skipping unknown resolution strategy");
                false
            }
        }
    }

    /// Run the fallback chain over a cycle whose primary resolution failed.
    ///
    /// Strategies run in order with a cancellable pause between them to
    /// avoid hammering the collaborator; the chain stops at the first
    /// success.
    pub async fn fallback(&self, cycle: &DeadlockCycle) -> bool {
        for (index, strategy) in planner::FALLBACK_CHAIN.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return false;
            }
            if index > 0
                && self
                    .cancel
                    .sleep(Duration::from_millis(self.fallback_pause_ms))
                    .await
                    .is_err()
            {
                return false;
            }

            if self.apply(cycle, *strategy).await {
                info!(cycle_id = %cycle.cycle_id, strategy = %strategy, "fallback strategy succeeded");
                return true;
            }
        }
        false
    }

    /// Raise every member to the numerically-highest member priority.
    async fn priority_inheritance(&self, cycle: &DeadlockCycle) -> bool {
        let Some(target) = cycle.members.iter().map(|m| m.priority).max_by_key(|p| p.weight())
        else {
            return false;
        };

        let mut all_ok = true;
        for member in cycle.members.iter().filter(|m| m.priority != target) {
            all_ok &= self.set_priority(&member.task_id, target).await;
        }
        all_ok
    }

    /// Donate high priority to all members when one already holds it;
    /// otherwise fall back to inheritance.
    async fn priority_donation(&self, cycle: &DeadlockCycle) -> bool {
        let has_high = cycle.members.iter().any(|m| m.priority == TaskPriority::High);
        if !has_high {
            return Box::pin(self.priority_inheritance(cycle)).await;
        }

        let mut all_ok = true;
        for member in cycle
            .members
            .iter()
            .filter(|m| m.priority != TaskPriority::High)
        {
            all_ok &= self.set_priority(&member.task_id, TaskPriority::High).await;
        }
        all_ok
    }

    /// Complete every in-progress member to break the wait.
    async fn status_force_transition(&self, cycle: &DeadlockCycle) -> bool {
        let mut all_ok = true;
        for member in cycle
            .members
            .iter()
            .filter(|m| m.status == TaskStatus::InProgress)
        {
            all_ok &= self.set_status(&member.task_id, TaskStatus::Done).await;
        }
        all_ok
    }

    /// Wait out the estimate (capped), then force the transition.
    async fn timeout_based_recovery(&self, cycle: &DeadlockCycle) -> bool {
        let wait_ms = cycle.estimated_resolution_ms.min(self.recovery_wait_cap_ms);
        if self.cancel.sleep(Duration::from_millis(wait_ms)).await.is_err() {
            return false;
        }
        self.status_force_transition(cycle).await
    }

    /// Roll every member back to todo, releasing all holds.
    async fn task_rollback(&self, cycle: &DeadlockCycle) -> bool {
        let mut all_ok = true;
        for member in &cycle.members {
            all_ok &= self.set_status(&member.task_id, TaskStatus::Todo).await;
        }
        all_ok
    }

    /// Delete every dependency rule owned by a member.
    fn dependency_breaking(&self, cycle: &DeadlockCycle) -> bool {
        for member in &cycle.members {
            let removed = self.registry.remove_task(&member.task_id);
            if removed > 0 {
                debug!(task_id = %member.task_id, removed, "dependency rules removed");
            }
        }
        true
    }

    /// Release the weakest-strength rule of each member.
    fn conditional_release(&self, cycle: &DeadlockCycle) -> bool {
        let mut released_any = false;
        for member in &cycle.members {
            if let Some(rule) = self.registry.release_weakest(&member.task_id) {
                debug!(
                    task_id = %member.task_id,
                    strength = rule.strength,
                    "weakest dependency rule released"
                );
                released_any = true;
            }
        }
        released_any
    }

    /// Preempt the lowest-priority member by rolling it back to todo.
    async fn resource_preemption(&self, cycle: &DeadlockCycle) -> bool {
        let Some(victim) = lowest_priority_member(cycle) else {
            return false;
        };
        self.set_status(&victim, TaskStatus::Todo).await
    }

    /// Drop the lowest-priority member from active tracking, with a cooldown
    /// so it is not immediately retried.
    fn victim_selection(&self, cycle: &DeadlockCycle) -> bool {
        let Some(victim) = lowest_priority_member(cycle) else {
            return false;
        };

        self.tracker.unregister(&victim);
        self.rebalancer.stamp(&victim);
        info!(task_id = %victim, "victim selected and dropped from active tracking");
        true
    }

    async fn set_priority(&self, task_id: &str, priority: TaskPriority) -> bool {
        match self
            .mutator
            .update_task_priority(&task_id.to_string(), priority)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(task_id = %task_id, %error, "priority mutation failed");
                false
            }
        }
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus) -> bool {
        match self
            .mutator
            .update_task_status(&task_id.to_string(), status)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(task_id = %task_id, %error, "status mutation failed");
                false
            }
        }
    }
}

/// Lowest-priority member id, ties broken by id for determinism.
fn lowest_priority_member(cycle: &DeadlockCycle) -> Option<taskmesh_core::TaskId> {
    cycle
        .members
        .iter()
        .min_by(|a, b| {
            a.priority
                .weight()
                .cmp(&b.priority.weight())
                .then_with(|| a.task_id.cmp(&b.task_id))
        })
        .map(|m| m.task_id.clone())
}
