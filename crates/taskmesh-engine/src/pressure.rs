//! Resource pressure monitoring.
//!
//! Recomputes utilization and pressure level on a fixed interval from the
//! active-operation count against the fixed system capacity, plus the
//! rolling average execution time of completed operations. Explicitly
//! constructed per engine; there is no process-wide singleton.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use taskmesh_core::{PressureLevel, PressureMetrics};

/// Computes and caches the current pressure metrics.
pub struct PressureMonitor {
    system_capacity: usize,
    metrics: Mutex<PressureMetrics>,
    rebalancing_active: AtomicBool,
}

impl PressureMonitor {
    /// Create a monitor for a fixed system capacity.
    pub fn new(system_capacity: usize) -> Self {
        Self {
            system_capacity: system_capacity.max(1),
            metrics: Mutex::new(PressureMetrics::default()),
            rebalancing_active: AtomicBool::new(false),
        }
    }

    /// Recompute metrics from the current counters.
    ///
    /// `active` is the in-flight operation count, `completed` the total of
    /// finished operations, `average_execution_ms` the rolling average
    /// duration of completions.
    pub fn recompute(
        &self,
        active: usize,
        completed: usize,
        average_execution_ms: f64,
    ) -> PressureMetrics {
        let utilization = active as f64 / self.system_capacity as f64;
        let level = PressureLevel::from_utilization(utilization);

        let metrics = PressureMetrics {
            total_tasks: completed + active,
            active_operations: active,
            resource_utilization: utilization,
            pressure_level: level,
            rebalancing_active: self.rebalancing_active.load(Ordering::Relaxed),
            average_execution_ms,
        };

        if level >= PressureLevel::High {
            debug!(
                utilization = utilization,
                level = %level,
                "resource pressure elevated"
            );
        }

        *self.metrics.lock() = metrics.clone();
        metrics
    }

    /// The most recently computed metrics.
    pub fn current(&self) -> PressureMetrics {
        self.metrics.lock().clone()
    }

    /// Mark the rebalancer as active or idle.
    pub fn set_rebalancing(&self, active: bool) {
        self.rebalancing_active.store(active, Ordering::Relaxed);
    }

    /// The fixed capacity used for utilization.
    pub fn system_capacity(&self) -> usize {
        self.system_capacity
    }
}
