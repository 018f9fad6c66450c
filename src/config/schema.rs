//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mesh.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for every tracemart process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MeshConfig {
    /// Bind addresses of the three service nodes.
    pub nodes: NodesConfig,

    /// Base URLs used to reach peer nodes.
    pub peers: PeersConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Fault injection settings.
    pub chaos: ChaosConfig,

    /// Workload generator settings.
    pub generator: GeneratorConfig,

    /// Periodic activity log simulators.
    pub activity: ActivityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener addresses for the service nodes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodesConfig {
    /// Bind address of the identity node (e.g., "0.0.0.0:8081").
    pub identity_bind: String,

    /// Bind address of the catalog node.
    pub catalog_bind: String,

    /// Bind address of the order-aggregator node.
    pub orders_bind: String,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            identity_bind: "0.0.0.0:8081".to_string(),
            catalog_bind: "0.0.0.0:8082".to_string(),
            orders_bind: "0.0.0.0:8083".to_string(),
        }
    }
}

/// Where each node can be reached by its peers and by the generator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeersConfig {
    pub identity_url: String,
    pub catalog_url: String,
    pub orders_url: String,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            identity_url: "http://127.0.0.1:8081".to_string(),
            catalog_url: "http://127.0.0.1:8082".to_string(),
            orders_url: "http://127.0.0.1:8083".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Server-side request timeout in seconds.
    pub request_secs: u64,

    /// Timeout for node-to-node calls in milliseconds.
    pub upstream_ms: u64,

    /// Timeout for generator-issued calls in milliseconds.
    pub generator_request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_ms: 5_000,
            generator_request_ms: 30_000,
        }
    }
}

/// How the chaos policy behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosMode {
    /// No injected latency, no injected failures.
    Off,
    /// Latency and failures drawn from the per-endpoint table.
    Random,
    /// Every endpoint with a failure rate fails, no latency.
    AlwaysFail,
}

/// Fault injection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub mode: ChaosMode,

    /// Multiplier applied to every injected delay (0.0 disables latency).
    pub latency_scale: f64,

    /// Per-endpoint overrides of the built-in table.
    pub endpoints: HashMap<String, EndpointChaosConfig>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            mode: ChaosMode::Random,
            latency_scale: 1.0,
            endpoints: HashMap::new(),
        }
    }
}

/// Latency window and failure probability of a single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct EndpointChaosConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Probability in [0, 1] of an injected failure.
    pub failure_rate: f64,
}

/// Workload generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub enabled: bool,

    /// Fraction of root traces marked as sampled.
    pub sample_ratio: f64,

    /// Pause between payment and status check in the full-order scenario.
    pub order_settle_ms: u64,

    /// Base delay between health polls at startup.
    pub health_poll_base_ms: u64,

    /// Cap on the delay between health polls at startup.
    pub health_poll_max_ms: u64,

    /// Per-loop overrides (matched by loop name).
    pub loops: Vec<LoopConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_ratio: 1.0,
            order_settle_ms: 2_000,
            health_poll_base_ms: 500,
            health_poll_max_ms: 5_000,
            loops: Vec::new(),
        }
    }
}

/// Override of a single scenario loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopConfig {
    /// Loop name (e.g., "users", "advanced-orders", "health").
    pub name: String,

    /// Tick interval in milliseconds.
    pub tick_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Activity log simulator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

/// Output format of the ambient (operational) log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Span destination: "stdout", "stderr", "none" or a file path.
    pub span_sink: String,

    /// Capacity of the span hand-off buffer.
    pub span_buffer: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            span_sink: "stdout".to_string(),
            span_buffer: 4_096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MeshConfig = toml::from_str("").unwrap();
        assert_eq!(config.nodes.catalog_bind, "0.0.0.0:8082");
        assert_eq!(config.timeouts.upstream_ms, 5_000);
        assert_eq!(config.chaos.mode, ChaosMode::Random);
    }

    #[test]
    fn test_partial_sections() {
        let config: MeshConfig = toml::from_str(
            r#"
            [chaos]
            mode = "off"

            [chaos.endpoints.login]
            min_latency_ms = 5
            max_latency_ms = 10
            failure_rate = 0.5

            [[generator.loops]]
            name = "orders"
            tick_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.chaos.mode, ChaosMode::Off);
        assert_eq!(config.chaos.endpoints["login"].max_latency_ms, 10);
        assert_eq!(config.generator.loops[0].tick_ms, Some(250));
        assert!(config.generator.loops[0].enabled);
        assert_eq!(config.peers.orders_url, "http://127.0.0.1:8083");
    }
}
