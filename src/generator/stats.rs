//! Per-loop counters.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters of one scenario loop.
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    completed: AtomicU64,
    failed_calls: AtomicU64,
}

impl LoopStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_calls(&self, count: u64) {
        self.failed_calls.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStatsSnapshot {
    /// Ticks started.
    pub ticks: u64,
    /// Scenarios whose every call succeeded.
    pub completed: u64,
    pub failed_calls: u64,
}

/// Counters of every loop, by loop name.
#[derive(Debug, Default)]
pub struct GeneratorStats {
    loops: DashMap<String, Arc<LoopStats>>,
}

impl GeneratorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_loop(&self, name: &str) -> Arc<LoopStats> {
        self.loops.entry(name.to_string()).or_default().clone()
    }

    pub fn get(&self, name: &str) -> LoopStatsSnapshot {
        self.loops.get(name).map(|s| s.snapshot()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, LoopStatsSnapshot> {
        self.loops
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_loop() {
        let stats = GeneratorStats::new();
        let users = stats.for_loop("users");
        users.record_tick();
        users.record_tick();
        users.record_completed();
        stats.for_loop("orders").record_failed_calls(3);

        assert_eq!(
            stats.get("users"),
            LoopStatsSnapshot {
                ticks: 2,
                completed: 1,
                failed_calls: 0
            }
        );
        assert_eq!(stats.get("orders").failed_calls, 3);
        assert_eq!(stats.get("health"), LoopStatsSnapshot::default());
        assert_eq!(stats.snapshot().len(), 2);
    }
}
