//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, probabilities in [0, 1])
//! - Check that addresses and peer URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MeshConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::MeshConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    BadAddress { field: &'static str, value: String },

    #[error("{field}: invalid URL {value:?}")]
    BadUrl { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: probability {value} outside [0, 1]")]
    Probability { field: String, value: f64 },

    #[error("chaos.endpoints.{endpoint}: min latency {min}ms exceeds max {max}ms")]
    LatencyWindow { endpoint: String, min: u64, max: u64 },

    #[error("chaos.latency_scale must be finite and non-negative")]
    LatencyScale,
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &MeshConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("nodes.identity_bind", &config.nodes.identity_bind),
        ("nodes.catalog_bind", &config.nodes.catalog_bind),
        ("nodes.orders_bind", &config.nodes.orders_bind),
    ] {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BadAddress { field, value: value.clone() });
        }
    }

    for (field, value) in [
        ("peers.identity_url", &config.peers.identity_url),
        ("peers.catalog_url", &config.peers.catalog_url),
        ("peers.orders_url", &config.peers.orders_url),
    ] {
        let parsed = Url::parse(value);
        if !matches!(parsed, Ok(ref url) if url.scheme() == "http" || url.scheme() == "https") {
            errors.push(ValidationError::BadUrl { field, value: value.clone() });
        }
    }

    for (field, value) in [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_ms", config.timeouts.upstream_ms),
        ("timeouts.generator_request_ms", config.timeouts.generator_request_ms),
        ("observability.span_buffer", config.observability.span_buffer as u64),
        ("activity.interval_secs", config.activity.interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !config.chaos.latency_scale.is_finite() || config.chaos.latency_scale < 0.0 {
        errors.push(ValidationError::LatencyScale);
    }

    for (name, endpoint) in &config.chaos.endpoints {
        if !(0.0..=1.0).contains(&endpoint.failure_rate) {
            errors.push(ValidationError::Probability {
                field: format!("chaos.endpoints.{}.failure_rate", name),
                value: endpoint.failure_rate,
            });
        }
        if endpoint.min_latency_ms > endpoint.max_latency_ms {
            errors.push(ValidationError::LatencyWindow {
                endpoint: name.clone(),
                min: endpoint.min_latency_ms,
                max: endpoint.max_latency_ms,
            });
        }
    }

    if !(0.0..=1.0).contains(&config.generator.sample_ratio) {
        errors.push(ValidationError::Probability {
            field: "generator.sample_ratio".to_string(),
            value: config.generator.sample_ratio,
        });
    }

    for lp in &config.generator.loops {
        if lp.tick_ms == Some(0) {
            errors.push(ValidationError::Zero { field: "generator.loops.tick_ms" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointChaosConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MeshConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MeshConfig::default();
        config.nodes.catalog_bind = "not-an-address".into();
        config.peers.orders_url = "ftp://orders".into();
        config.timeouts.upstream_ms = 0;
        config.chaos.endpoints.insert(
            "login".into(),
            EndpointChaosConfig { min_latency_ms: 10, max_latency_ms: 5, failure_rate: 1.5 },
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero { field: "timeouts.upstream_ms" }));
    }
}
