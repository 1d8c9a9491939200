//! Deadlock-aware execution coordination.
//!
//! Every request flows through the same pipeline: register declared
//! dependencies, run a detection pass over a fresh snapshot, resolve any
//! cycles found, optionally rebalance priorities, then perform the
//! operation itself under timeout tracking. Errors never cross the public
//! boundary as panics or `Err`; they are folded into the returned
//! [`ExecutionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use taskmesh_core::{
    EngineError, EngineResult, ExecutionRequest, ExecutionResult, OperationKind,
    ResourceConstraints, Task, TaskPriority, TaskStatus,
};

use crate::detector;
use crate::engine::EngineShared;

/// Outcome of the internal pipeline, folded into the public result.
struct FlowOutcome {
    deadlock_detected: bool,
    priority_rebalanced: bool,
    final_priority: Option<TaskPriority>,
}

/// Runs requests through detection, resolution, rebalancing and execution.
pub struct ExecutionCoordinator {
    shared: Arc<EngineShared>,
}

impl ExecutionCoordinator {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Execute one request end to end.
    ///
    /// Never panics and never returns `Err`: any pipeline failure is
    /// reported through `success: false` and the `error` field.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let task_id = request.task_id.clone();
        let operation = request.operation;

        let outcome = self.run(&request).await;

        // The tracker entry is removed on both paths; a failed request must
        // not leave a timeout armed.
        let tracked = self.shared.tracker.unregister(&task_id);
        if let Some(elapsed) = tracked {
            self.shared.history.record_completion(elapsed);
        }

        let execution_time_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(flow) => ExecutionResult {
                task_id,
                success: true,
                operation,
                execution_time_ms,
                deadlock_detected: flow.deadlock_detected,
                priority_rebalanced: flow.priority_rebalanced,
                final_priority: flow.final_priority,
                error: None,
            },
            Err(error) => {
                warn!(task_id = %task_id, %operation, %error, "request failed");
                ExecutionResult {
                    task_id,
                    success: false,
                    operation,
                    execution_time_ms,
                    deadlock_detected: matches!(error, EngineError::State { .. }),
                    priority_rebalanced: false,
                    final_priority: None,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn run(&self, request: &ExecutionRequest) -> EngineResult<FlowOutcome> {
        let shared = &self.shared;
        shared.cancel.ensure_active()?;

        // Phase 1: register declared dependencies before detection so the
        // pass sees them.
        let tasks = shared.snapshot.get_all_tasks().await?;
        if !request.dependencies.is_empty() {
            shared
                .levels
                .register(&request.task_id, &request.dependencies, &tasks);
        }

        // Operations on existing tasks require the task in the snapshot.
        let exists = tasks.iter().any(|t| t.id == request.task_id);
        if !exists && request.operation != OperationKind::Create {
            return Err(EngineError::MissingTask {
                task_id: request.task_id.clone(),
            });
        }

        // Phase 2: detection over fresh state.
        let detection = detector::run_pass(&tasks, &shared.registry.snapshot());
        let deadlock_detected = detection.has_deadlock;

        // Phase 3: resolution.
        if deadlock_detected {
            let resolved_all = shared.resolve_cycles(&detection).await;
            if request.operation == OperationKind::Execute && !resolved_all {
                return Err(EngineError::State {
                    message: format!(
                        "deadlock involving {} task(s) could not be resolved",
                        detection.conflicting_tasks.len()
                    ),
                });
            }
        }

        // Phase 4: proactive rebalancing, gated by pressure and cooldowns.
        let mut priority_rebalanced = false;
        let mut final_priority = request.new_priority;
        if let Some(task) = tasks.iter().find(|t| t.id == request.task_id) {
            let pressure = shared.pressure.current().pressure_level;
            if shared.rebalancer.should_rebalance(task, pressure) {
                let changes = shared
                    .rebalancer
                    .rebalance(
                        std::slice::from_ref(&request.task_id),
                        &tasks,
                        &shared.levels,
                        shared.mutator.as_ref(),
                        &shared.pressure,
                    )
                    .await;
                if let Some(change) = changes.last() {
                    priority_rebalanced = true;
                    final_priority = Some(change.new_priority);
                }
            }
        }

        // Phase 5: the operation itself, under timeout tracking.
        shared
            .tracker
            .register(request.task_id.clone(), request.operation);
        self.dispatch(request, &tasks).await?;

        Ok(FlowOutcome {
            deadlock_detected,
            priority_rebalanced,
            final_priority,
        })
    }

    /// Apply the requested operation through the mutation collaborator.
    async fn dispatch(&self, request: &ExecutionRequest, tasks: &[Task]) -> EngineResult<()> {
        let shared = &self.shared;
        let constraints = shared.registry.constraints_for(&request.task_id);

        match request.operation {
            OperationKind::Create | OperationKind::Update => {
                if let Some(status) = request.new_status {
                    self.set_status_with_retry(&request.task_id, status, &constraints)
                        .await?;
                }
                if let Some(priority) = request.new_priority {
                    self.set_priority_with_retry(&request.task_id, priority, &constraints)
                        .await?;
                }
                Ok(())
            }
            OperationKind::Delete => {
                // All engine-side state for the task is dropped with it.
                let removed = shared.registry.remove_task(&request.task_id);
                shared.levels.remove(&request.task_id);
                shared.rebalancer.clear(&request.task_id);
                debug!(task_id = %request.task_id, rules_removed = removed, "task state cleared");
                Ok(())
            }
            OperationKind::Execute => {
                // Detection and resolution already ran; an executing task
                // that is still todo is moved to in-progress.
                let still_todo = tasks
                    .iter()
                    .any(|t| t.id == request.task_id && t.status == TaskStatus::Todo);
                if still_todo {
                    self.set_status_with_retry(
                        &request.task_id,
                        TaskStatus::InProgress,
                        &constraints,
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    async fn set_status_with_retry(
        &self,
        task_id: &str,
        status: TaskStatus,
        constraints: &ResourceConstraints,
    ) -> EngineResult<()> {
        let mut attempt = 0;
        loop {
            match self
                .shared
                .mutator
                .update_task_status(&task_id.to_string(), status)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) => {
                    attempt += 1;
                    if attempt > constraints.max_retries {
                        return Err(error);
                    }
                    self.backoff(task_id, attempt, constraints, &error).await?;
                }
            }
        }
    }

    async fn set_priority_with_retry(
        &self,
        task_id: &str,
        priority: TaskPriority,
        constraints: &ResourceConstraints,
    ) -> EngineResult<()> {
        let mut attempt = 0;
        loop {
            match self
                .shared
                .mutator
                .update_task_priority(&task_id.to_string(), priority)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) => {
                    attempt += 1;
                    if attempt > constraints.max_retries {
                        return Err(error);
                    }
                    self.backoff(task_id, attempt, constraints, &error).await?;
                }
            }
        }
    }

    async fn backoff(
        &self,
        task_id: &str,
        attempt: u32,
        constraints: &ResourceConstraints,
        error: &EngineError,
    ) -> EngineResult<()> {
        let delay = retry_delay(
            constraints.retry_backoff_ms,
            attempt,
            self.shared.config.retry_backoff_max_ms,
        );
        warn!(
            task_id = %task_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            %error,
            "mutation failed, retrying"
        );
        self.shared.cancel.sleep(delay).await
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped.
fn retry_delay(base_ms: u64, attempt: u32, cap_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exp).min(cap_ms);
    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use parking_lot::Mutex;
    use taskmesh_core::{
        DependencyRule, TaskId, TaskMutationService, TaskSnapshotProvider,
    };

    /// In-memory task store serving as both snapshot provider and mutator.
    #[derive(Default)]
    struct MemoryStore {
        tasks: Mutex<HashMap<TaskId, Task>>,
        status_failures: AtomicU32,
    }

    impl MemoryStore {
        fn with_tasks(tasks: Vec<Task>) -> Arc<Self> {
            let store = Self::default();
            *store.tasks.lock() = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
            Arc::new(store)
        }

        fn task(&self, id: &str) -> Option<Task> {
            self.tasks.lock().get(id).cloned()
        }
    }

    #[async_trait]
    impl TaskSnapshotProvider for MemoryStore {
        async fn get_all_tasks(&self) -> EngineResult<Vec<Task>> {
            Ok(self.tasks.lock().values().cloned().collect())
        }
    }

    #[async_trait]
    impl TaskMutationService for MemoryStore {
        async fn update_task_status(&self, task_id: &TaskId, status: TaskStatus) -> EngineResult<()> {
            if self.status_failures.load(Ordering::Relaxed) > 0 {
                self.status_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(EngineError::Mutation {
                    task_id: task_id.clone(),
                    reason: "transient".to_string(),
                });
            }
            let mut tasks = self.tasks.lock();
            let task = tasks.entry(task_id.clone()).or_insert_with(|| {
                Task::new(task_id.clone(), TaskPriority::Medium, TaskStatus::Todo)
            });
            task.status = status;
            Ok(())
        }

        async fn update_task_priority(
            &self,
            task_id: &TaskId,
            priority: TaskPriority,
        ) -> EngineResult<()> {
            let mut tasks = self.tasks.lock();
            let task = tasks.entry(task_id.clone()).or_insert_with(|| {
                Task::new(task_id.clone(), TaskPriority::Medium, TaskStatus::Todo)
            });
            task.priority = priority;
            Ok(())
        }
    }

    fn coordinator(store: Arc<MemoryStore>, config: EngineConfig) -> ExecutionCoordinator {
        let (shared, _events) = EngineShared::new(config, store.clone(), store);
        ExecutionCoordinator::new(shared)
    }

    #[tokio::test]
    async fn test_create_passes_payload_through() {
        let store = MemoryStore::with_tasks(vec![]);
        let coordinator = coordinator(store.clone(), EngineConfig::default());

        let result = coordinator
            .execute(
                ExecutionRequest::new("t1", OperationKind::Create)
                    .with_status(TaskStatus::Todo)
                    .with_priority(TaskPriority::High),
            )
            .await;

        assert!(result.success);
        assert!(!result.deadlock_detected);
        let task = store.task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::High);
    }

    #[tokio::test]
    async fn test_update_missing_task_fails() {
        let store = MemoryStore::with_tasks(vec![]);
        let coordinator = coordinator(store, EngineConfig::default());

        let result = coordinator
            .execute(ExecutionRequest::new("ghost", OperationKind::Update).with_status(TaskStatus::Done))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_execute_resolves_mutual_wait_cycle() {
        // a and b hold each other in progress through explicit links.
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["b".to_string()]),
            Task::new("b", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["a".to_string()]),
        ]);
        let coordinator = coordinator(store.clone(), EngineConfig::default());

        let result = coordinator
            .execute(ExecutionRequest::new("a", OperationKind::Execute))
            .await;

        assert!(result.success);
        assert!(result.deadlock_detected);
        // No member of the cycle is left in progress.
        for id in ["a", "b"] {
            assert_ne!(store.task(id).unwrap().status, TaskStatus::InProgress);
        }
    }

    #[tokio::test]
    async fn test_transient_mutation_failure_retried() {
        let store = MemoryStore::with_tasks(vec![Task::new(
            "t1",
            TaskPriority::Low,
            TaskStatus::Todo,
        )]);
        store.status_failures.store(2, Ordering::Relaxed);
        let coordinator = coordinator(store.clone(), EngineConfig::default());

        let result = coordinator
            .execute(ExecutionRequest::new("t1", OperationKind::Update).with_status(TaskStatus::Done))
            .await;

        assert!(result.success);
        assert_eq!(store.task("t1").unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_reports_error() {
        let store = MemoryStore::with_tasks(vec![Task::new(
            "t1",
            TaskPriority::Low,
            TaskStatus::Todo,
        )]);
        store.status_failures.store(10, Ordering::Relaxed);
        let coordinator = coordinator(store, EngineConfig::default());

        let result = coordinator
            .execute(ExecutionRequest::new("t1", OperationKind::Update).with_status(TaskStatus::Done))
            .await;

        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_delete_clears_engine_state() {
        let store = MemoryStore::with_tasks(vec![Task::new(
            "t1",
            TaskPriority::Low,
            TaskStatus::Todo,
        )]);
        let coordinator = coordinator(store, EngineConfig::default());
        coordinator
            .shared
            .registry
            .register(DependencyRule::priority_based("t1", TaskPriority::High))
            .unwrap();

        let result = coordinator
            .execute(ExecutionRequest::new("t1", OperationKind::Delete))
            .await;

        assert!(result.success);
        assert!(coordinator.shared.registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_engine_rejects_requests() {
        let store = MemoryStore::with_tasks(vec![]);
        let coordinator = coordinator(store, EngineConfig::default());
        coordinator.shared.cancel.cancel();

        let result = coordinator
            .execute(ExecutionRequest::new("t1", OperationKind::Create))
            .await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_declared_dependencies_register_levels() {
        let store = MemoryStore::with_tasks(vec![
            Task::new("base", TaskPriority::Low, TaskStatus::Todo),
            Task::new("t1", TaskPriority::Low, TaskStatus::Todo),
        ]);
        let coordinator = coordinator(store, EngineConfig::default());

        let result = coordinator
            .execute(
                ExecutionRequest::new("t1", OperationKind::Update)
                    .with_status(TaskStatus::InProgress)
                    .with_dependencies(vec!["base".to_string()]),
            )
            .await;

        assert!(result.success);
        let entry = coordinator.shared.levels.get(&"t1".to_string()).unwrap();
        assert_eq!(entry.level, 1);
        assert_eq!(entry.links.len(), 1);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(50, 1, 2_000), Duration::from_millis(50));
        assert_eq!(retry_delay(50, 2, 2_000), Duration::from_millis(100));
        assert_eq!(retry_delay(50, 3, 2_000), Duration::from_millis(200));
        assert_eq!(retry_delay(50, 10, 2_000), Duration::from_millis(2_000));
    }
}
