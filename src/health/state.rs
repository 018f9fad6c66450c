//! Node health state machine.
//!
//! # States
//! - Unknown: never probed
//! - Healthy: last probes answered `/health` with 2xx
//! - Unhealthy: consecutive failures reached the threshold
//!
//! # State Transitions
//! ```text
//! Unknown → Healthy:   first success
//! Unknown → Unhealthy: consecutive failures >= unhealthy_threshold
//! Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Counters reset on the opposite outcome
//! - Transitions are logged

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl HealthState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Health of one node as seen by a prober.
#[derive(Debug)]
pub struct NodeHealth {
    name: String,
    state: AtomicU8,
    consecutive_successes: AtomicUsize,
    consecutive_failures: AtomicUsize,
}

impl NodeHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_successes: AtomicUsize::new(0),
            consecutive_failures: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == HealthState::Healthy
    }

    fn transition(&self, to: HealthState) {
        let from = HealthState::from_u8(self.state.swap(to as u8, Ordering::Relaxed));
        if from != to {
            tracing::info!(node = %self.name, from = ?from, to = ?to, "Node health changed");
        }
    }

    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;

        match self.state() {
            HealthState::Healthy => {}
            HealthState::Unknown => self.transition(HealthState::Healthy),
            HealthState::Unhealthy => {
                if successes >= healthy_threshold {
                    self.transition(HealthState::Healthy);
                }
            }
        }
    }

    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if self.state() != HealthState::Unhealthy && failures >= unhealthy_threshold {
            self.transition(HealthState::Unhealthy);
        }
    }
}

/// Health of every probed node, by service name.
#[derive(Debug)]
pub struct HealthRegistry {
    nodes: DashMap<String, Arc<NodeHealth>>,
    healthy_threshold: usize,
    unhealthy_threshold: usize,
}

impl HealthRegistry {
    pub fn new(healthy_threshold: usize, unhealthy_threshold: usize) -> Self {
        Self {
            nodes: DashMap::new(),
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    fn node(&self, name: &str) -> Arc<NodeHealth> {
        self.nodes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NodeHealth::new(name)))
            .clone()
    }

    pub fn record(&self, name: &str, healthy: bool) {
        let node = self.node(name);
        if healthy {
            node.mark_success(self.healthy_threshold);
        } else {
            node.mark_failure(self.unhealthy_threshold);
        }
    }

    pub fn state(&self, name: &str) -> HealthState {
        self.nodes.get(name).map(|n| n.state()).unwrap_or(HealthState::Unknown)
    }

    /// Snapshot sorted by node name.
    pub fn snapshot(&self) -> Vec<(String, HealthState)> {
        let mut all: Vec<_> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(1, 2)
    }
}
