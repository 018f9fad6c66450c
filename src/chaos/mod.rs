//! Fault injection.
//!
//! # Responsibilities
//! - Hold the per-endpoint latency window and failure probability
//! - Draw a simulated delay and a Bernoulli failure for each request
//!
//! # Design Decisions
//! - One policy per process, consulted by endpoint name, so generator
//!   traffic and external traffic see identical behaviour
//! - Built-in table with config overrides; unknown endpoints are never
//!   delayed and never fail
//! - `mode = off` and `mode = always_fail` make tests deterministic

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{ChaosConfig, ChaosMode, EndpointChaosConfig};

/// Occasional extra delay on top of the regular window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SlowPath {
    probability: f64,
    min_ms: u64,
    max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EndpointChaos {
    window: EndpointChaosConfig,
    slow_path: Option<SlowPath>,
}

fn window(min_latency_ms: u64, max_latency_ms: u64, failure_rate: f64) -> EndpointChaos {
    EndpointChaos {
        window: EndpointChaosConfig {
            min_latency_ms,
            max_latency_ms,
            failure_rate,
        },
        slow_path: None,
    }
}

fn builtin_table() -> HashMap<String, EndpointChaos> {
    let mut table = HashMap::new();
    let mut add = |name: &str, chaos: EndpointChaos| {
        table.insert(name.to_string(), chaos);
    };

    // identity
    add("login", window(0, 0, 0.15));
    add("get_profile", window(100, 300, 0.0));
    add("update_preferences", window(100, 400, 0.08));
    add("search_users", window(50, 250, 0.05));
    add("refresh_token", window(0, 0, 0.12));

    // catalog
    add("list_products", window(50, 350, 0.05));
    add("search_products", window(100, 600, 0.0));
    add("product_favorites", window(50, 250, 0.0));
    add("get_inventory", window(20, 120, 0.0));
    add(
        "trending",
        EndpointChaos {
            slow_path: Some(SlowPath {
                probability: 0.2,
                min_ms: 200,
                max_ms: 700,
            }),
            ..window(0, 0, 0.08)
        },
    );
    add("record_view", window(0, 0, 0.05));
    add("by_category", window(50, 200, 0.06));
    add("update_price", window(0, 0, 0.10));

    // orders
    add("process_payment", window(500, 2500, 0.15));
    add("cancel_order", window(0, 0, 0.15));
    add("tracking", window(0, 0, 0.08));
    add("refund", window(0, 0, 0.12));
    add("analytics", window(100, 400, 0.07));

    table
}

/// Per-endpoint fault injection policy.
#[derive(Debug, Clone)]
pub struct ChaosPolicy {
    mode: ChaosMode,
    latency_scale: f64,
    endpoints: HashMap<String, EndpointChaos>,
}

impl ChaosPolicy {
    pub fn from_config(config: &ChaosConfig) -> Self {
        let mut endpoints = builtin_table();
        for (name, over) in &config.endpoints {
            endpoints
                .entry(name.clone())
                .and_modify(|e| e.window = *over)
                .or_insert(EndpointChaos {
                    window: *over,
                    slow_path: None,
                });
        }

        Self {
            mode: config.mode,
            latency_scale: config.latency_scale,
            endpoints,
        }
    }

    /// Policy that never delays and never fails.
    pub fn disabled() -> Self {
        Self {
            mode: ChaosMode::Off,
            latency_scale: 0.0,
            endpoints: HashMap::new(),
        }
    }

    pub fn mode(&self) -> ChaosMode {
        self.mode
    }

    /// Draw the simulated latency for one request.
    pub fn draw_latency(&self, endpoint: &str) -> Duration {
        if self.mode != ChaosMode::Random || self.latency_scale == 0.0 {
            return Duration::ZERO;
        }
        let Some(chaos) = self.endpoints.get(endpoint) else {
            return Duration::ZERO;
        };

        let mut rng = rand::thread_rng();
        let mut ms = draw_window(&mut rng, chaos.window.min_latency_ms, chaos.window.max_latency_ms);
        if let Some(slow) = chaos.slow_path {
            if rng.gen_bool(slow.probability) {
                ms += draw_window(&mut rng, slow.min_ms, slow.max_ms);
            }
        }

        Duration::from_millis((ms as f64 * self.latency_scale).round() as u64)
    }

    /// Sleep for the drawn latency and return it.
    pub async fn delay(&self, endpoint: &str) -> Duration {
        let latency = self.draw_latency(endpoint);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        latency
    }

    /// Bernoulli draw against the endpoint's failure rate.
    pub fn should_fail(&self, endpoint: &str) -> bool {
        let Some(chaos) = self.endpoints.get(endpoint) else {
            return false;
        };
        let rate = chaos.window.failure_rate;
        match self.mode {
            ChaosMode::Off => false,
            ChaosMode::AlwaysFail => rate > 0.0,
            ChaosMode::Random => rate > 0.0 && rand::thread_rng().gen_bool(rate.min(1.0)),
        }
    }
}

fn draw_window(rng: &mut impl Rng, min_ms: u64, max_ms: u64) -> u64 {
    if max_ms > min_ms {
        rng.gen_range(min_ms..=max_ms)
    } else {
        min_ms
    }
}
