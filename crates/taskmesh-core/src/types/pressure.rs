//! Resource pressure metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse utilization tier gating proactive rebalancing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    /// Classify a utilization ratio (`active / capacity`).
    ///
    /// Thresholds: `< 0.4` low, `[0.4, 0.7)` medium, `[0.7, 0.9)` high,
    /// `>= 0.9` critical.
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization >= 0.9 {
            PressureLevel::Critical
        } else if utilization >= 0.7 {
            PressureLevel::High
        } else if utilization >= 0.4 {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureLevel::Low => write!(f, "low"),
            PressureLevel::Medium => write!(f, "medium"),
            PressureLevel::High => write!(f, "high"),
            PressureLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Snapshot of system utilization, recomputed on a fixed interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PressureMetrics {
    /// Completed plus active operation count.
    pub total_tasks: usize,
    /// Operations currently in flight.
    pub active_operations: usize,
    /// `active_operations / system_capacity`.
    pub resource_utilization: f64,
    pub pressure_level: PressureLevel,
    /// True while the rebalancer is applying changes.
    pub rebalancing_active: bool,
    /// Rolling average duration of completed operations.
    pub average_execution_ms: f64,
}

impl Default for PressureMetrics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            active_operations: 0,
            resource_utilization: 0.0,
            pressure_level: PressureLevel::Low,
            rebalancing_active: false,
            average_execution_ms: 0.0,
        }
    }
}
