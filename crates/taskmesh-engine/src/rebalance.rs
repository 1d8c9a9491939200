//! Proactive priority rebalancing with anti-thrashing cooldowns.
//!
//! The rebalancer decides per task whether priority should be temporarily
//! adjusted to relieve pressure or break ties. Every programmatic priority
//! change stamps a cooldown entry; within the window the same task is never
//! rebalanced again. The cooldown check and reservation are a single atomic
//! map operation, not a check-then-act pair.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use taskmesh_core::{
    PressureLevel, PriorityChange, Task, TaskId, TaskMutationService,
};

use crate::levels::LevelStore;
use crate::pressure::PressureMonitor;

/// Declared-dependency count above which a task is always a rebalance
/// candidate.
const DEPENDENCY_FANOUT_THRESHOLD: usize = 3;

/// Decides and applies temporary priority adjustments.
#[derive(Debug)]
pub struct Rebalancer {
    cooldowns: DashMap<TaskId, Instant>,
    cooldown: Duration,
}

impl Rebalancer {
    /// Create a rebalancer with the given cooldown window.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldowns: DashMap::new(),
            cooldown,
        }
    }

    /// Whether a task should be rebalanced right now.
    ///
    /// False inside the cooldown window; true under high or critical
    /// pressure; true when the task declares more than
    /// `DEPENDENCY_FANOUT_THRESHOLD` dependencies; false otherwise.
    pub fn should_rebalance(&self, task: &Task, pressure: PressureLevel) -> bool {
        if self.in_cooldown(&task.id) {
            return false;
        }
        if pressure >= PressureLevel::High {
            return true;
        }
        task.dependencies.len() > DEPENDENCY_FANOUT_THRESHOLD
    }

    /// Whether a task is inside its cooldown window. Expired entries are
    /// removed lazily.
    pub fn in_cooldown(&self, task_id: &TaskId) -> bool {
        match self.cooldowns.entry(task_id.clone()) {
            Entry::Occupied(entry) if *entry.get() > Instant::now() => true,
            Entry::Occupied(entry) => {
                entry.remove();
                false
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Atomically check the cooldown and reserve the window when clear.
    ///
    /// Returns false when the task is still cooling down.
    pub fn try_reserve(&self, task_id: &TaskId) -> bool {
        let now = Instant::now();
        match self.cooldowns.entry(task_id.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(now + self.cooldown);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + self.cooldown);
                true
            }
        }
    }

    /// Stamp a cooldown unconditionally (used after victim selection).
    pub fn stamp(&self, task_id: &TaskId) {
        self.cooldowns
            .insert(task_id.clone(), Instant::now() + self.cooldown);
    }

    /// Clear a task's cooldown entry.
    pub fn clear(&self, task_id: &TaskId) {
        self.cooldowns.remove(task_id);
    }

    /// Rebalance the given tasks.
    ///
    /// Delegates the priority decision to the level store, applies accepted
    /// changes through the mutation service, and stamps a cooldown per
    /// changed task. Tasks still cooling down are skipped.
    pub async fn rebalance(
        &self,
        task_ids: &[TaskId],
        tasks: &[Task],
        levels: &LevelStore,
        mutator: &dyn TaskMutationService,
        monitor: &PressureMonitor,
    ) -> Vec<PriorityChange> {
        monitor.set_rebalancing(true);

        let mut applied = Vec::new();
        for change in levels.propose_changes(task_ids, tasks) {
            if !self.try_reserve(&change.task_id) {
                debug!(task_id = %change.task_id, "rebalance skipped, task cooling down");
                continue;
            }

            match mutator
                .update_task_priority(&change.task_id, change.new_priority)
                .await
            {
                Ok(()) => {
                    debug!(
                        task_id = %change.task_id,
                        old = %change.old_priority,
                        new = %change.new_priority,
                        reason = %change.reason,
                        "priority rebalanced"
                    );
                    applied.push(change);
                }
                Err(error) => {
                    warn!(task_id = %change.task_id, %error, "priority rebalance failed");
                }
            }
        }

        monitor.set_rebalancing(false);
        applied
    }
}
