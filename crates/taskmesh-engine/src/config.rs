//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the deadlock engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed system capacity used for utilization (`active / capacity`).
    pub system_capacity: usize,

    /// Default timeout armed per registered operation.
    pub operation_timeout_ms: u64,

    /// Interval of the periodic detection supervisor.
    pub supervisor_interval_ms: u64,

    /// Interval of the resource pressure monitor.
    pub pressure_interval_ms: u64,

    /// Cooldown after an automated priority change on a task.
    pub rebalance_cooldown_ms: u64,

    /// Upper bound of the timeout-based-recovery wait.
    pub recovery_wait_cap_ms: u64,

    /// Pause between fallback strategies to avoid hammering the collaborator.
    pub fallback_pause_ms: u64,

    /// Capacity of the deadlock history ring buffer.
    pub history_capacity: usize,

    /// Default retry budget for collaborator mutations.
    pub max_retries: u32,

    /// Base backoff between mutation retries.
    pub retry_backoff_ms: u64,

    /// Backoff cap.
    pub retry_backoff_max_ms: u64,

    /// Install a `tracing` subscriber on engine construction.
    pub enable_tracing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_capacity: 10,
            operation_timeout_ms: 10_000,
            supervisor_interval_ms: 5_000,
            pressure_interval_ms: 2_000,
            rebalance_cooldown_ms: 2_000,
            recovery_wait_cap_ms: 5_000,
            fallback_pause_ms: 100,
            history_capacity: 1_000,
            max_retries: 3,
            retry_backoff_ms: 50,
            retry_backoff_max_ms: 2_000,
            enable_tracing: false,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// Returns a description of the first invalid field, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.system_capacity == 0 {
            return Err("system_capacity must be greater than 0".to_string());
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".to_string());
        }
        if self.operation_timeout_ms == 0 {
            return Err("operation_timeout_ms must be greater than 0".to_string());
        }
        if self.supervisor_interval_ms == 0 || self.pressure_interval_ms == 0 {
            return Err("background intervals must be greater than 0".to_string());
        }
        if self.retry_backoff_ms > self.retry_backoff_max_ms {
            return Err("retry_backoff_ms must not exceed retry_backoff_max_ms".to_string());
        }
        Ok(())
    }

    /// Set the system capacity.
    pub fn with_system_capacity(mut self, capacity: usize) -> Self {
        self.system_capacity = capacity;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.operation_timeout_ms = timeout_ms;
        self
    }

    /// Set the rebalance cooldown.
    pub fn with_rebalance_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.rebalance_cooldown_ms = cooldown_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = EngineConfig::default().with_system_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let config = EngineConfig {
            retry_backoff_ms: 5_000,
            retry_backoff_max_ms: 1_000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
