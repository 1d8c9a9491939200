//! Cycle detection over the waits-for graph.
//!
//! Colored depth-first search with an explicit path stack. An edge back into
//! the gray set yields the cycle `path[index_of(target)..]`. The search
//! continues after recording a cycle, so a single pass may report multiple
//! overlapping cycles; this is intentional and not deduplicated, because
//! independent wait chains may share a task.

mod classify;

pub use classify::{classify_severity, classify_type, estimate_resolution_ms};

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use taskmesh_core::{
    CycleMember, DeadlockCycle, DependencyRule, DetectionResult, Task, TaskId,
};

use crate::graph::{build_waits_for, WaitsForGraph};
use crate::resolution::planner;

/// Run one full detection pass over a task snapshot and rule snapshot.
///
/// Builds the waits-for graph, extracts and classifies cycles, and attaches
/// the planner's prevention/strategy lists.
pub fn run_pass(tasks: &[Task], rules: &HashMap<TaskId, Vec<DependencyRule>>) -> DetectionResult {
    let graph = build_waits_for(tasks, rules);
    let cycles = detect_cycles(&graph, tasks, rules);

    let conflicting_tasks: BTreeSet<TaskId> = cycles
        .iter()
        .flat_map(|cycle| cycle.member_ids())
        .collect();

    let total_resolution_ms = cycles.iter().map(|c| c.estimated_resolution_ms).sum();
    let (prevention_actions, resolution_strategies) = planner::plan(&cycles);

    if !cycles.is_empty() {
        debug!(
            cycles = cycles.len(),
            conflicting = conflicting_tasks.len(),
            "detection pass found deadlock"
        );
    }

    DetectionResult {
        has_deadlock: !cycles.is_empty(),
        cycles,
        conflicting_tasks,
        prevention_actions,
        resolution_strategies,
        total_resolution_ms,
    }
}

/// Detect every simple cycle reachable from unvisited nodes.
pub fn detect_cycles(
    graph: &WaitsForGraph,
    tasks: &[Task],
    rules: &HashMap<TaskId, Vec<DependencyRule>>,
) -> Vec<DeadlockCycle> {
    let tasks_by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();

    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut on_stack: HashSet<TaskId> = HashSet::new();
    let mut path: Vec<TaskId> = Vec::new();
    let mut raw_cycles: Vec<Vec<TaskId>> = Vec::new();

    // Deterministic traversal order.
    let mut roots: Vec<&TaskId> = graph.keys().collect();
    roots.sort();

    for root in roots {
        if !visited.contains(root) {
            dfs(root, graph, &mut visited, &mut on_stack, &mut path, &mut raw_cycles);
        }
    }

    raw_cycles
        .into_iter()
        .map(|member_ids| build_cycle(&member_ids, graph, &tasks_by_id, rules))
        .collect()
}

fn dfs(
    node: &TaskId,
    graph: &WaitsForGraph,
    visited: &mut HashSet<TaskId>,
    on_stack: &mut HashSet<TaskId>,
    path: &mut Vec<TaskId>,
    raw_cycles: &mut Vec<Vec<TaskId>>,
) {
    visited.insert(node.clone());
    on_stack.insert(node.clone());
    path.push(node.clone());

    if let Some(neighbors) = graph.get(node) {
        for next in neighbors {
            if !visited.contains(next) {
                dfs(next, graph, visited, on_stack, path, raw_cycles);
            } else if on_stack.contains(next) {
                // Back edge: the cycle is the path suffix starting at `next`.
                if let Some(start) = path.iter().position(|id| id == next) {
                    raw_cycles.push(path[start..].to_vec());
                }
            }
        }
    }

    path.pop();
    on_stack.remove(node);
}

/// Assemble and classify one cycle from its member ids in path order.
fn build_cycle(
    member_ids: &[TaskId],
    graph: &WaitsForGraph,
    tasks_by_id: &HashMap<&TaskId, &Task>,
    rules: &HashMap<TaskId, Vec<DependencyRule>>,
) -> DeadlockCycle {
    let members: Vec<CycleMember> = member_ids
        .iter()
        .filter_map(|id| tasks_by_id.get(id).map(|task| (id, *task)))
        .map(|(id, task)| CycleMember {
            task_id: id.clone(),
            priority: task.priority,
            status: task.status,
            waiting_for: graph
                .get(id)
                .map(|edges| edges.iter().cloned().collect())
                .unwrap_or_default(),
        })
        .collect();

    let cycle_type = classify_type(&members, rules);
    let severity = classify_severity(&members);
    let estimated_resolution_ms = estimate_resolution_ms(&members);

    DeadlockCycle {
        cycle_id: Uuid::new_v4().to_string(),
        members,
        cycle_type,
        severity,
        estimated_resolution_ms,
    }
}
