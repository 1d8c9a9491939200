//! Cycle classification: type, severity, and resolution-cost estimate.

use std::collections::HashMap;

use taskmesh_core::{CycleMember, CycleType, DependencyRule, Severity, TaskId, TaskPriority, TaskStatus};

/// Classify a cycle by its dominant dependency flavor.
///
/// Counts rule mentions of `required_priority` vs `required_status` across
/// the member tasks (a combined rule mentions both). Priority mentions more
/// than twice the status mentions mean priority-inversion; the symmetric
/// case means status-wait; anything else is mixed.
pub fn classify_type(
    members: &[CycleMember],
    rules: &HashMap<TaskId, Vec<DependencyRule>>,
) -> CycleType {
    let mut priority_mentions = 0usize;
    let mut status_mentions = 0usize;

    for member in members {
        if let Some(member_rules) = rules.get(&member.task_id) {
            for rule in member_rules {
                if rule.required_priority.is_some() {
                    priority_mentions += 1;
                }
                if rule.required_status.is_some() {
                    status_mentions += 1;
                }
            }
        }
    }

    if priority_mentions > status_mentions * 2 {
        CycleType::PriorityInversion
    } else if status_mentions > priority_mentions * 2 {
        CycleType::StatusWait
    } else {
        CycleType::MixedDependency
    }
}

/// Classify a cycle's severity from its member mix.
///
/// `critical` when the high-priority ratio exceeds 0.7 or the in-progress
/// ratio exceeds 0.8; `high` above 0.4/0.5; `medium` above 0.2/0.3;
/// otherwise `low`.
pub fn classify_severity(members: &[CycleMember]) -> Severity {
    if members.is_empty() {
        return Severity::Low;
    }

    let len = members.len() as f64;
    let high_priority_ratio = members
        .iter()
        .filter(|m| m.priority == TaskPriority::High)
        .count() as f64
        / len;
    let in_progress_ratio = members
        .iter()
        .filter(|m| m.status == TaskStatus::InProgress)
        .count() as f64
        / len;

    if high_priority_ratio > 0.7 || in_progress_ratio > 0.8 {
        Severity::Critical
    } else if high_priority_ratio > 0.4 || in_progress_ratio > 0.5 {
        Severity::High
    } else if high_priority_ratio > 0.2 || in_progress_ratio > 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Heuristic resolution cost in milliseconds.
///
/// `1000ms * 1.5^(len-1) * priority_factor`, where the factor starts at 1
/// and adds 0.5 per high-priority member and 0.25 per medium-priority
/// member, floored to integer milliseconds. This orders and compares
/// strategies; it is not a measured time.
pub fn estimate_resolution_ms(members: &[CycleMember]) -> u64 {
    if members.is_empty() {
        return 0;
    }

    let mut priority_factor = 1.0f64;
    for member in members {
        match member.priority {
            TaskPriority::High => priority_factor += 0.5,
            TaskPriority::Medium => priority_factor += 0.25,
            TaskPriority::Low => {}
        }
    }

    let growth = 1.5f64.powi(members.len() as i32 - 1);
    (1000.0 * growth * priority_factor).floor() as u64
}
