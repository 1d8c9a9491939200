//! Engine facade and background supervision.
//!
//! [`DeadlockEngine`] owns the shared state (registry, tracker, levels,
//! rebalancer, history, pressure monitor) and three background loops:
//!
//! - a timeout consumer that runs an out-of-band detection pass whenever a
//!   tracked operation times out
//! - a periodic supervisor that runs detection while operations are active
//! - a pressure loop that recomputes resource utilization
//!
//! The engine is dependency injected: callers hand it a snapshot provider
//! and a mutation service, and there is no process-wide singleton. All
//! loops stop through the shared cancellation handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taskmesh_core::{
    DependencyRule, DetectionResult, EngineError, EngineResult, ExecutionRequest, ExecutionResult,
    OperationKind, PressureMetrics, ResourceConstraints, TaskId, TaskMutationService,
    TaskSnapshotProvider,
};

use crate::cancel::Cancellation;
use crate::config::EngineConfig;
use crate::coordinator::ExecutionCoordinator;
use crate::detector;
use crate::history::{DeadlockHistoryEntry, History};
use crate::levels::LevelStore;
use crate::pressure::PressureMonitor;
use crate::rebalance::Rebalancer;
use crate::registry::DependencyRegistry;
use crate::resolution::{planner, ResolutionExecutor};
use crate::tracker::OperationTracker;

/// State shared between the facade, the coordinator and background loops.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) registry: DependencyRegistry,
    pub(crate) tracker: OperationTracker,
    pub(crate) levels: LevelStore,
    pub(crate) rebalancer: Rebalancer,
    pub(crate) history: History,
    pub(crate) pressure: PressureMonitor,
    pub(crate) snapshot: Arc<dyn TaskSnapshotProvider>,
    pub(crate) mutator: Arc<dyn TaskMutationService>,
    pub(crate) cancel: Cancellation,
}

impl EngineShared {
    pub(crate) fn new(
        config: EngineConfig,
        snapshot: Arc<dyn TaskSnapshotProvider>,
        mutator: Arc<dyn TaskMutationService>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TaskId>) {
        let (tracker, timeout_events) =
            OperationTracker::new(Duration::from_millis(config.operation_timeout_ms));

        let shared = Arc::new(Self {
            registry: DependencyRegistry::new(),
            tracker,
            levels: LevelStore::new(),
            rebalancer: Rebalancer::new(Duration::from_millis(config.rebalance_cooldown_ms)),
            history: History::new(config.history_capacity),
            pressure: PressureMonitor::new(config.system_capacity),
            snapshot,
            mutator,
            cancel: Cancellation::new(),
            config,
        });
        (shared, timeout_events)
    }

    /// Resolve every cycle in a detection result, falling back when the
    /// selected strategy fails. Returns whether all cycles resolved.
    pub(crate) async fn resolve_cycles(&self, detection: &DetectionResult) -> bool {
        let executor = ResolutionExecutor {
            mutator: self.mutator.as_ref(),
            registry: &self.registry,
            tracker: &self.tracker,
            rebalancer: &self.rebalancer,
            cancel: &self.cancel,
            recovery_wait_cap_ms: self.config.recovery_wait_cap_ms,
            fallback_pause_ms: self.config.fallback_pause_ms,
        };

        let mut resolved_all = true;
        for cycle in &detection.cycles {
            let strategy = planner::select_strategy(cycle);
            let started = std::time::Instant::now();

            let mut resolved = executor.apply(cycle, strategy).await;
            if !resolved {
                info!(cycle_id = %cycle.cycle_id, strategy = %strategy,
                    "primary strategy failed, running fallback chain");
                resolved = executor.fallback(cycle).await;
            }

            self.history.record_deadlock(
                cycle.cycle_type,
                started.elapsed().as_millis() as u64,
                strategy,
            );

            if resolved {
                debug!(cycle_id = %cycle.cycle_id, "cycle resolved");
            } else {
                warn!(cycle_id = %cycle.cycle_id, "cycle could not be resolved");
                resolved_all = false;
            }
        }
        resolved_all
    }

    /// One detection pass over fresh state, resolving anything found.
    async fn detect_and_resolve(&self) -> EngineResult<DetectionResult> {
        let tasks = self.snapshot.get_all_tasks().await?;
        let detection = detector::run_pass(&tasks, &self.registry.snapshot());
        if detection.has_deadlock {
            self.resolve_cycles(&detection).await;
        }
        Ok(detection)
    }

    fn refresh_pressure(&self) -> PressureMetrics {
        self.pressure.recompute(
            self.tracker.active_count(),
            self.history.completed_count(),
            self.history.average_execution_ms(),
        )
    }
}

/// Dependency-aware deadlock detection and resolution engine.
pub struct DeadlockEngine {
    shared: Arc<EngineShared>,
    coordinator: ExecutionCoordinator,
    timeout_events: Mutex<Option<mpsc::UnboundedReceiver<TaskId>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl DeadlockEngine {
    /// Create an engine over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::State` when the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        snapshot: Arc<dyn TaskSnapshotProvider>,
        mutator: Arc<dyn TaskMutationService>,
    ) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|message| EngineError::State { message })?;

        if config.enable_tracing {
            // Another subscriber may already be installed; that is fine.
            let _ = tracing_subscriber::fmt().try_init();
        }

        let (shared, timeout_events) = EngineShared::new(config, snapshot, mutator);
        Ok(Self {
            coordinator: ExecutionCoordinator::new(Arc::clone(&shared)),
            shared,
            timeout_events: Mutex::new(Some(timeout_events)),
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the background loops. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        let Some(mut timeout_events) = self.timeout_events.lock().take() else {
            return;
        };

        let mut loops = self.loops.lock();

        // Timeout consumer: each fired timeout triggers an out-of-band pass.
        let shared = Arc::clone(&self.shared);
        loops.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    event = timeout_events.recv() => {
                        let Some(task_id) = event else { break };
                        warn!(task_id = %task_id, "operation timeout, running detection pass");
                        if let Err(error) = shared.detect_and_resolve().await {
                            warn!(%error, "timeout-triggered detection pass failed");
                        }
                    }
                }
            }
        }));

        // Supervisor: periodic detection while operations are in flight.
        let shared = Arc::clone(&self.shared);
        loops.push(tokio::spawn(async move {
            let interval = Duration::from_millis(shared.config.supervisor_interval_ms);
            loop {
                if shared.cancel.sleep(interval).await.is_err() {
                    break;
                }
                if shared.tracker.active_count() == 0 {
                    continue;
                }
                if let Err(error) = shared.detect_and_resolve().await {
                    warn!(%error, "supervisor detection pass failed");
                }
            }
        }));

        // Pressure loop: periodic utilization refresh.
        let shared = Arc::clone(&self.shared);
        loops.push(tokio::spawn(async move {
            let interval = Duration::from_millis(shared.config.pressure_interval_ms);
            loop {
                if shared.cancel.sleep(interval).await.is_err() {
                    break;
                }
                shared.refresh_pressure();
            }
        }));

        info!("deadlock engine started");
    }

    /// Stop the background loops and drop all tracked operations.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.tracker.clear();
        for handle in self.loops.lock().drain(..) {
            handle.abort();
        }
        info!("deadlock engine stopped");
    }

    /// Execute one request through the full pipeline.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.coordinator.execute(request).await
    }

    /// Run a detection pass without resolving anything.
    pub async fn detect(&self) -> EngineResult<DetectionResult> {
        let tasks = self.shared.snapshot.get_all_tasks().await?;
        Ok(detector::run_pass(&tasks, &self.shared.registry.snapshot()))
    }

    /// Run a detection pass and resolve every cycle found.
    pub async fn detect_and_resolve(&self) -> EngineResult<DetectionResult> {
        self.shared.detect_and_resolve().await
    }

    /// Resolve the cycles of an existing detection result.
    ///
    /// Returns whether every cycle resolved.
    pub async fn resolve(&self, detection: &DetectionResult) -> bool {
        self.shared.resolve_cycles(detection).await
    }

    /// Register a dependency rule.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` for a malformed rule.
    pub fn register_dependency(&self, rule: DependencyRule) -> EngineResult<()> {
        self.shared.registry.register(rule)
    }

    /// Attach resource constraints to a task.
    pub fn set_constraints(&self, task_id: impl Into<TaskId>, constraints: ResourceConstraints) {
        self.shared.registry.set_constraints(task_id, constraints);
    }

    /// Recompute and return the current pressure metrics.
    pub fn metrics(&self) -> PressureMetrics {
        self.shared.refresh_pressure()
    }

    /// Retained deadlock history, oldest first.
    pub fn deadlock_history(&self) -> Vec<DeadlockHistoryEntry> {
        self.shared.history.entries()
    }

    /// Aggregate history statistics.
    pub fn history(&self) -> &History {
        &self.shared.history
    }

    /// Snapshot of in-flight operations.
    pub fn active_operations(&self) -> Vec<(TaskId, OperationKind)> {
        self.shared.tracker.snapshot()
    }
}

impl Drop for DeadlockEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use taskmesh_core::{Task, TaskPriority, TaskStatus};

    #[derive(Default)]
    struct MemoryStore {
        tasks: Mutex<HashMap<TaskId, Task>>,
    }

    impl MemoryStore {
        fn with_tasks(tasks: Vec<Task>) -> Arc<Self> {
            let store = Self::default();
            *store.tasks.lock() = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
            Arc::new(store)
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
            if let Some(task) = self.tasks.lock().get_mut(task_id) {
                task.status = status;
            }
            Ok(())
        }

        async fn update_task_priority(
            &self,
            task_id: &TaskId,
            priority: TaskPriority,
        ) -> EngineResult<()> {
            if let Some(task) = self.tasks.lock().get_mut(task_id) {
                task.priority = priority;
            }
            Ok(())
        }
    }

    fn engine(store: Arc<MemoryStore>) -> DeadlockEngine {
        DeadlockEngine::new(EngineConfig::default(), store.clone(), store).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = MemoryStore::with_tasks(vec![]);
        let config = EngineConfig::default().with_system_capacity(0);
        assert!(DeadlockEngine::new(config, store.clone(), store).is_err());
    }

    #[tokio::test]
    async fn test_detect_clean_fleet() {
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Low, TaskStatus::Todo),
            Task::new("b", TaskPriority::Low, TaskStatus::Todo),
        ]);
        let engine = engine(store);

        let detection = engine.detect().await.unwrap();
        assert!(!detection.has_deadlock);
    }

    #[tokio::test]
    async fn test_detect_and_resolve_records_history() {
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["b".to_string()]),
            Task::new("b", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["a".to_string()]),
        ]);
        let engine = engine(store);

        let detection = engine.detect_and_resolve().await.unwrap();
        assert!(detection.has_deadlock);
        assert!(!engine.deadlock_history().is_empty());
    }

    #[tokio::test]
    async fn test_status_wait_three_cycle_force_transitioned() {
        // a -> b -> c -> a through status-based rules; two members are in
        // progress, so severity stays below critical and the selected
        // strategy is a forced transition.
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Low, TaskStatus::InProgress),
            Task::new("b", TaskPriority::Low, TaskStatus::InProgress),
            Task::new("c", TaskPriority::Low, TaskStatus::Todo),
        ]);
        let engine = engine(store.clone());
        engine
            .register_dependency(DependencyRule::status_based("a", TaskStatus::InProgress))
            .unwrap();
        engine
            .register_dependency(DependencyRule::status_based("b", TaskStatus::Todo))
            .unwrap();
        engine
            .register_dependency(DependencyRule::status_based("c", TaskStatus::InProgress))
            .unwrap();

        let detection = engine.detect_and_resolve().await.unwrap();
        assert!(detection.has_deadlock);
        assert_eq!(
            detection.cycles[0].cycle_type,
            taskmesh_core::CycleType::StatusWait
        );
        assert!(detection
            .resolution_strategies
            .contains(&taskmesh_core::ResolutionStrategy::StatusForceTransition));

        // No member of the wait is left in progress.
        let tasks = store.tasks.lock().clone();
        assert!(tasks.values().all(|t| t.status != TaskStatus::InProgress));
    }

    #[tokio::test]
    async fn test_metrics_track_active_operations() {
        let store = MemoryStore::with_tasks(vec![]);
        let engine = engine(store);

        let metrics = engine.metrics();
        assert_eq!(metrics.active_operations, 0);
        assert_eq!(metrics.resource_utilization, 0.0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_shutdown_stops_loops() {
        let store = MemoryStore::with_tasks(vec![]);
        let engine = engine(store);

        engine.start();
        engine.start();
        assert_eq!(engine.loops.lock().len(), 3);

        engine.shutdown();
        assert!(engine.shared.cancel.is_cancelled());
        assert!(engine.loops.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_detection_pass() {
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["b".to_string()]),
            Task::new("b", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["a".to_string()]),
        ]);
        let config = EngineConfig::default().with_operation_timeout_ms(50);
        let engine = DeadlockEngine::new(config, store.clone(), store).unwrap();
        engine.start();

        engine.shared.tracker.register("a".to_string(), OperationKind::Execute);
        // Let the timeout fire and the consumer run its pass.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert!(!engine.shared.tracker.is_active(&"a".to_string()));
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_runs_detection_only_while_active() {
        let store = MemoryStore::with_tasks(vec![
            Task::new("a", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["b".to_string()]),
            Task::new("b", TaskPriority::Medium, TaskStatus::InProgress)
                .with_dependencies(vec!["a".to_string()]),
        ]);
        let engine = engine(store.clone());
        engine.start();

        // No operation in flight: ticks pass without running a pass, even
        // though the store already holds a cycle.
        tokio::time::sleep(Duration::from_millis(6_000)).await;
        tokio::task::yield_now().await;
        assert!(engine.deadlock_history().is_empty());

        // With an operation active, the next tick detects and resolves
        // without any explicit detect call.
        engine
            .shared
            .tracker
            .register("a".to_string(), OperationKind::Execute);
        tokio::time::sleep(Duration::from_millis(6_000)).await;
        tokio::task::yield_now().await;

        assert!(!engine.deadlock_history().is_empty());
        let tasks = store.tasks.lock().clone();
        assert!(tasks.values().all(|t| t.status != TaskStatus::InProgress));
        engine.shutdown();
    }
}
