//! Bounded deadlock and execution history.
//!
//! The source-of-record grows append-only; here both logs are ring buffers
//! with a fixed retention so a long-lived engine cannot grow without bound.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use taskmesh_core::{CycleType, ResolutionStrategy};

/// Rolling window of completed-operation durations.
const DURATION_WINDOW: usize = 256;

/// One resolved (or attempted) deadlock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeadlockHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub cycle_type: CycleType,
    pub resolution_ms: u64,
    pub strategy: ResolutionStrategy,
}

#[derive(Debug, Default)]
struct HistoryInner {
    deadlocks: VecDeque<DeadlockHistoryEntry>,
    durations: VecDeque<u64>,
    completed: usize,
}

/// Bounded history of deadlocks and operation completions.
#[derive(Debug)]
pub struct History {
    inner: Mutex<HistoryInner>,
    capacity: usize,
}

impl History {
    /// Create a history retaining at most `capacity` deadlock entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistoryInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Append a deadlock entry, evicting the oldest at capacity.
    pub fn record_deadlock(
        &self,
        cycle_type: CycleType,
        resolution_ms: u64,
        strategy: ResolutionStrategy,
    ) {
        let entry = DeadlockHistoryEntry {
            timestamp: Utc::now(),
            cycle_type,
            resolution_ms,
            strategy,
        };

        let mut inner = self.inner.lock();
        if inner.deadlocks.len() == self.capacity {
            inner.deadlocks.pop_front();
        }
        inner.deadlocks.push_back(entry);
    }

    /// Record a completed operation's duration.
    pub fn record_completion(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.completed += 1;
        if inner.durations.len() == DURATION_WINDOW {
            inner.durations.pop_front();
        }
        inner.durations.push_back(duration.as_millis() as u64);
    }

    /// Total completed operations observed.
    pub fn completed_count(&self) -> usize {
        self.inner.lock().completed
    }

    /// Number of retained deadlock entries.
    pub fn len(&self) -> usize {
        self.inner.lock().deadlocks.len()
    }

    /// True when no deadlocks have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().deadlocks.is_empty()
    }

    /// The cycle type recorded most often, ties broken arbitrarily.
    pub fn most_common_cycle_type(&self) -> Option<CycleType> {
        let inner = self.inner.lock();
        let mut counts: HashMap<CycleType, usize> = HashMap::new();
        for entry in &inner.deadlocks {
            *counts.entry(entry.cycle_type).or_default() += 1;
        }
        counts.into_iter().max_by_key(|(_, count)| *count).map(|(t, _)| t)
    }

    /// Mean resolution time across retained deadlock entries.
    pub fn average_resolution_ms(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.deadlocks.is_empty() {
            return 0.0;
        }
        let sum: u64 = inner.deadlocks.iter().map(|e| e.resolution_ms).sum();
        sum as f64 / inner.deadlocks.len() as f64
    }

    /// Mean execution time over the rolling completion window.
    pub fn average_execution_ms(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.durations.is_empty() {
            return 0.0;
        }
        let sum: u64 = inner.durations.iter().sum();
        sum as f64 / inner.durations.len() as f64
    }

    /// Copy of the retained deadlock entries, oldest first.
    pub fn entries(&self) -> Vec<DeadlockHistoryEntry> {
        self.inner.lock().deadlocks.iter().cloned().collect()
    }
}
