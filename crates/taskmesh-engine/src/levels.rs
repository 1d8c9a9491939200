//! Dependency levels and cross-level priority proposals.
//!
//! A task's level is `1 + max(level of its dependencies)`, recursively; a
//! task with no dependencies is level 0. Computation is memoized per call
//! and guarded with a visiting set: re-entering a node through a dependency
//! cycle yields level 0 for that node instead of recursing forever.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskmesh_core::{PriorityChange, Task, TaskId, TaskPriority};

/// Relation of a dependency's level to its owner's level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelRelation {
    Same,
    Higher,
    Lower,
}

impl LevelRelation {
    /// Classify a dependency's level relative to the owner's.
    pub fn of(owner_level: usize, dependency_level: usize) -> Self {
        match dependency_level.cmp(&owner_level) {
            std::cmp::Ordering::Equal => LevelRelation::Same,
            std::cmp::Ordering::Greater => LevelRelation::Higher,
            std::cmp::Ordering::Less => LevelRelation::Lower,
        }
    }
}

/// One dependency link annotated with level information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyLink {
    pub target: TaskId,
    pub level: usize,
    pub relation: LevelRelation,
    pub strength: f64,
}

/// A task's computed dependency level and annotated links.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexDependency {
    pub task_id: TaskId,
    pub level: usize,
    /// Generated node label for external graph tooling.
    pub node_label: String,
    pub links: Vec<DependencyLink>,
}

/// Stores per-task level entries and proposes cross-level priority changes.
#[derive(Debug, Default)]
pub struct LevelStore {
    entries: DashMap<TaskId, ComplexDependency>,
}

impl LevelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or refresh) a task's level entry from declared dependencies
    /// and the current snapshot.
    pub fn register(
        &self,
        task_id: &TaskId,
        declared: &[TaskId],
        tasks: &[Task],
    ) -> ComplexDependency {
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let mut memo: HashMap<TaskId, usize> = HashMap::new();
        let mut visiting: HashSet<TaskId> = HashSet::new();

        let level = declared
            .iter()
            .map(|dep| compute_level(dep, &by_id, &mut memo, &mut visiting))
            .max()
            .map(|deepest| deepest + 1)
            .unwrap_or(0);

        let links = declared
            .iter()
            .map(|dep| {
                let dep_level = compute_level(dep, &by_id, &mut memo, &mut visiting);
                DependencyLink {
                    target: dep.clone(),
                    level: dep_level,
                    relation: LevelRelation::of(level, dep_level),
                    strength: 1.0 / (1.0 + level.abs_diff(dep_level) as f64),
                }
            })
            .collect();

        let entry = ComplexDependency {
            task_id: task_id.clone(),
            level,
            node_label: format!("dep-node-{}", Uuid::new_v4()),
            links,
        };
        self.entries.insert(task_id.clone(), entry.clone());
        entry
    }

    /// The stored entry for a task, if any.
    pub fn get(&self, task_id: &TaskId) -> Option<ComplexDependency> {
        self.entries.get(task_id).map(|e| e.value().clone())
    }

    /// Compute a task's level from the snapshot alone.
    pub fn level_of(&self, task_id: &TaskId, tasks: &[Task]) -> usize {
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        compute_level(task_id, &by_id, &mut memo, &mut visiting)
    }

    /// Drop a task's entry.
    pub fn remove(&self, task_id: &TaskId) {
        self.entries.remove(task_id);
    }

    /// Propose priority changes for the given tasks.
    ///
    /// A task with at least one dependent in the snapshot and priority below
    /// high is proposed a one-step boost; proposals are ordered by task id
    /// for determinism.
    pub fn propose_changes(&self, task_ids: &[TaskId], tasks: &[Task]) -> Vec<PriorityChange> {
        let mut dependents: HashMap<&TaskId, usize> = HashMap::new();
        for task in tasks {
            for dep in &task.dependencies {
                *dependents.entry(dep).or_default() += 1;
            }
        }

        let mut sorted_ids: Vec<&TaskId> = task_ids.iter().collect();
        sorted_ids.sort();
        sorted_ids.dedup();

        let mut changes = Vec::new();
        for id in sorted_ids {
            let Some(task) = tasks.iter().find(|t| &t.id == id) else {
                continue;
            };
            let blocked = dependents.get(id).copied().unwrap_or(0);
            if blocked > 0 && task.priority < TaskPriority::High {
                changes.push(PriorityChange {
                    task_id: id.clone(),
                    old_priority: task.priority,
                    new_priority: task.priority.boosted(),
                    reason: format!("blocking {} dependent task(s)", blocked),
                });
            }
        }
        changes
    }
}

/// Recursive level computation with memoization and a cycle guard.
fn compute_level(
    task_id: &TaskId,
    by_id: &HashMap<&TaskId, &Task>,
    memo: &mut HashMap<TaskId, usize>,
    visiting: &mut HashSet<TaskId>,
) -> usize {
    if let Some(&level) = memo.get(task_id) {
        return level;
    }
    // Cycle guard: a re-entered node contributes level 0.
    if !visiting.insert(task_id.clone()) {
        return 0;
    }

    let level = match by_id.get(task_id) {
        Some(task) if !task.dependencies.is_empty() => {
            1 + task
                .dependencies
                .iter()
                .map(|dep| compute_level(dep, by_id, memo, visiting))
                .max()
                .unwrap_or(0)
        }
        _ => 0,
    };

    visiting.remove(task_id);
    memo.insert(task_id.clone(), level);
    level
}
