//! Waits-for graph construction.
//!
//! The graph is derived fresh on every detection pass from the dependency
//! rule snapshot matched against the current task set, plus any explicit
//! dependency links the tasks declare. An edge `T -> C` means task T's
//! progress is blocked on task C reaching some state.

use std::collections::HashMap;

use taskmesh_core::{DependencyKind, DependencyRule, Task, TaskId};

/// Adjacency map of the waits-for graph.
pub type WaitsForGraph = HashMap<TaskId, Vec<TaskId>>;

/// Build the waits-for graph for one detection pass.
///
/// Pure function of the snapshot: for each task T and each rule owned by T,
/// every other task C whose current priority/status matches the rule's
/// requirement contributes an edge `T -> C` (a combined rule adds a single
/// edge when both requirements match simultaneously). Explicit dependency
/// links add `T -> C` edges for targets present in the snapshot. Absent
/// rules produce no edges; edges are never duplicated.
pub fn build_waits_for(tasks: &[Task], rules: &HashMap<TaskId, Vec<DependencyRule>>) -> WaitsForGraph {
    let mut graph: WaitsForGraph = HashMap::new();

    for task in tasks {
        let edges = graph.entry(task.id.clone()).or_default();

        if let Some(task_rules) = rules.get(&task.id) {
            for rule in task_rules {
                for candidate in tasks.iter().filter(|c| c.id != task.id) {
                    if rule_matches(rule, candidate) && !edges.contains(&candidate.id) {
                        edges.push(candidate.id.clone());
                    }
                }
            }
        }

        for dependency in &task.dependencies {
            let exists = tasks.iter().any(|c| &c.id == dependency);
            if exists && dependency != &task.id && !edges.contains(dependency) {
                edges.push(dependency.clone());
            }
        }
    }

    graph
}

/// Whether a candidate task currently satisfies a rule's wait condition.
fn rule_matches(rule: &DependencyRule, candidate: &Task) -> bool {
    match rule.kind {
        DependencyKind::PriorityBased => rule.required_priority == Some(candidate.priority),
        DependencyKind::StatusBased => rule.required_status == Some(candidate.status),
        DependencyKind::Combined => {
            rule.required_priority == Some(candidate.priority)
                && rule.required_status == Some(candidate.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::{TaskPriority, TaskStatus};

    fn task(id: &str, priority: TaskPriority, status: TaskStatus) -> Task {
        Task::new(id, priority, status)
    }

    #[test]
    fn test_priority_rule_edges() {
        let tasks = vec![
            task("a", TaskPriority::Low, TaskStatus::Todo),
            task("b", TaskPriority::High, TaskStatus::Todo),
            task("c", TaskPriority::High, TaskStatus::Done),
        ];
        let mut rules = HashMap::new();
        rules.insert(
            "a".to_string(),
            vec![DependencyRule::priority_based("a", TaskPriority::High)],
        );

        let graph = build_waits_for(&tasks, &rules);
        let edges = &graph[&"a".to_string()];
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&"b".to_string()));
        assert!(edges.contains(&"c".to_string()));
        assert!(graph[&"b".to_string()].is_empty());
    }

    #[test]
    fn test_combined_rule_adds_single_edge() {
        let tasks = vec![
            task("a", TaskPriority::Low, TaskStatus::Todo),
            task("b", TaskPriority::High, TaskStatus::InProgress),
        ];
        let mut rules = HashMap::new();
        rules.insert(
            "a".to_string(),
            vec![DependencyRule::combined(
                "a",
                TaskPriority::High,
                TaskStatus::InProgress,
            )],
        );

        let graph = build_waits_for(&tasks, &rules);
        assert_eq!(graph[&"a".to_string()], vec!["b".to_string()]);
    }

    #[test]
    fn test_combined_rule_requires_both_to_match() {
        let tasks = vec![
            task("a", TaskPriority::Low, TaskStatus::Todo),
            task("b", TaskPriority::High, TaskStatus::Done),
        ];
        let mut rules = HashMap::new();
        rules.insert(
            "a".to_string(),
            vec![DependencyRule::combined(
                "a",
                TaskPriority::High,
                TaskStatus::InProgress,
            )],
        );

        let graph = build_waits_for(&tasks, &rules);
        assert!(graph[&"a".to_string()].is_empty());
    }

    #[test]
    fn test_explicit_dependency_links() {
        let tasks = vec![
            task("a", TaskPriority::Low, TaskStatus::Todo).with_dependencies(vec![
                "b".to_string(),
                "ghost".to_string(),
            ]),
            task("b", TaskPriority::Low, TaskStatus::Todo),
        ];
        let rules = HashMap::new();

        let graph = build_waits_for(&tasks, &rules);
        // Links to tasks absent from the snapshot are skipped.
        assert_eq!(graph[&"a".to_string()], vec!["b".to_string()]);
    }

    #[test]
    fn test_no_rules_no_edges() {
        let tasks = vec![
            task("a", TaskPriority::High, TaskStatus::InProgress),
            task("b", TaskPriority::High, TaskStatus::InProgress),
        ];
        let graph = build_waits_for(&tasks, &HashMap::new());
        assert!(graph.values().all(|edges| edges.is_empty()));
    }

    #[test]
    fn test_duplicate_edges_collapsed() {
        let tasks = vec![
            task("a", TaskPriority::Low, TaskStatus::Todo).with_dependencies(vec!["b".to_string()]),
            task("b", TaskPriority::High, TaskStatus::Todo),
        ];
        let mut rules = HashMap::new();
        rules.insert(
            "a".to_string(),
            vec![
                DependencyRule::priority_based("a", TaskPriority::High),
                DependencyRule::priority_based("a", TaskPriority::High),
            ],
        );

        let graph = build_waits_for(&tasks, &rules);
        assert_eq!(graph[&"a".to_string()], vec!["b".to_string()]);
    }
}
