//! Dependency rule registry.
//!
//! Stores declared dependency rules per task together with the resource
//! constraints attached to a task's execution. Rules have a caller-driven
//! lifecycle: they never auto-expire and are only removed explicitly or by
//! the dependency-breaking resolution strategy.

use std::collections::HashMap;

use dashmap::DashMap;

use taskmesh_core::{DependencyRule, EngineResult, ResourceConstraints, TaskId};

/// Registry of declared dependency rules and per-task resource constraints.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    rules: DashMap<TaskId, Vec<DependencyRule>>,
    constraints: DashMap<TaskId, ResourceConstraints>,
}

impl DependencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency rule for its owning task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` when the rule is malformed for its
    /// declared kind.
    pub fn register(&self, rule: DependencyRule) -> EngineResult<()> {
        rule.validate()?;
        self.rules.entry(rule.task_id.clone()).or_default().push(rule);
        Ok(())
    }

    /// Rules owned by one task.
    pub fn rules_for(&self, task_id: &TaskId) -> Vec<DependencyRule> {
        self.rules
            .get(task_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Consistent copy of all rules, taken once per detection pass.
    pub fn snapshot(&self) -> HashMap<TaskId, Vec<DependencyRule>> {
        self.rules
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Remove every rule owned by a task. Returns how many were removed.
    pub fn remove_task(&self, task_id: &TaskId) -> usize {
        self.rules
            .remove(task_id)
            .map(|(_, rules)| rules.len())
            .unwrap_or(0)
    }

    /// Remove the weakest-strength rule owned by a task, if any.
    pub fn release_weakest(&self, task_id: &TaskId) -> Option<DependencyRule> {
        let mut entry = self.rules.get_mut(task_id)?;
        let rules = entry.value_mut();
        let weakest = rules
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.strength.total_cmp(&b.strength))
            .map(|(index, _)| index)?;
        Some(rules.remove(weakest))
    }

    /// Attach resource constraints to a task.
    pub fn set_constraints(&self, task_id: impl Into<TaskId>, constraints: ResourceConstraints) {
        self.constraints.insert(task_id.into(), constraints);
    }

    /// Constraints for a task, defaulted when none were registered.
    pub fn constraints_for(&self, task_id: &TaskId) -> ResourceConstraints {
        self.constraints
            .get(task_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Number of tasks with at least one rule.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::{TaskPriority, TaskStatus};

    #[test]
    fn test_register_and_snapshot() {
        let registry = DependencyRegistry::new();
        registry
            .register(DependencyRule::priority_based("t1", TaskPriority::High))
            .unwrap();
        registry
            .register(DependencyRule::status_based("t1", TaskStatus::Done))
            .unwrap();

        assert_eq!(registry.rules_for(&"t1".to_string()).len(), 2);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&"t1".to_string()].len(), 2);
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let registry = DependencyRegistry::new();
        let mut rule = DependencyRule::priority_based("t1", TaskPriority::High);
        rule.required_priority = None;

        assert!(registry.register(rule).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_task_breaks_dependencies() {
        let registry = DependencyRegistry::new();
        registry
            .register(DependencyRule::priority_based("t1", TaskPriority::High))
            .unwrap();
        registry
            .register(DependencyRule::status_based("t1", TaskStatus::InProgress))
            .unwrap();

        assert_eq!(registry.remove_task(&"t1".to_string()), 2);
        assert!(registry.rules_for(&"t1".to_string()).is_empty());
    }

    #[test]
    fn test_release_weakest_rule_first() {
        let registry = DependencyRegistry::new();
        registry
            .register(
                DependencyRule::priority_based("t1", TaskPriority::High).with_strength(0.9),
            )
            .unwrap();
        registry
            .register(DependencyRule::status_based("t1", TaskStatus::Done).with_strength(0.2))
            .unwrap();

        let released = registry.release_weakest(&"t1".to_string()).unwrap();
        assert_eq!(released.strength, 0.2);
        assert_eq!(registry.rules_for(&"t1".to_string()).len(), 1);
    }

    #[test]
    fn test_constraints_default_when_missing() {
        let registry = DependencyRegistry::new();
        let constraints = registry.constraints_for(&"nope".to_string());
        assert_eq!(constraints.max_retries, 3);
    }
}
