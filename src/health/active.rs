//! Active readiness probing.
//!
//! # Responsibilities
//! - Probe each node's `/health` endpoint
//! - Record the outcome in the shared registry
//! - Block startup of dependents until every node answered

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::health::state::HealthRegistry;
use crate::resilience::ReadinessBackoff;

/// A node to probe: service name and base URL.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub name: String,
    pub base_url: String,
}

impl ProbeTarget {
    pub fn new(name: impl Into<String>, base_url: &str) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

pub struct HealthProbe {
    targets: Vec<ProbeTarget>,
    registry: Arc<HealthRegistry>,
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new(
        targets: Vec<ProbeTarget>,
        registry: Arc<HealthRegistry>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .user_agent("tracemart-health-probe")
            .build()?;
        Ok(Self {
            targets,
            registry,
            client,
        })
    }

    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    async fn probe(&self, target: &ProbeTarget) -> bool {
        let url = format!("{}/health", target.base_url);
        let healthy = match self.client.get(&url).send().await {
            Ok(response) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(node = %target.name, status = %response.status(), "Health probe failed: non-success status");
                }
                success
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(node = %target.name, "Health probe failed: timeout");
                false
            }
            Err(e) => {
                tracing::debug!(node = %target.name, error = %e, "Health probe failed: connection error");
                false
            }
        };

        self.registry.record(&target.name, healthy);
        healthy
    }

    /// Probe every target once; returns how many answered.
    pub async fn check_all(&self) -> usize {
        let mut healthy = 0;
        for target in &self.targets {
            if self.probe(target).await {
                healthy += 1;
            }
        }
        healthy
    }

    /// Poll until every target answered or shutdown fires.
    ///
    /// Returns `false` if interrupted by shutdown.
    pub async fn wait_until_ready(
        &self,
        base_ms: u64,
        max_ms: u64,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let schedule = ReadinessBackoff::new(base_ms, max_ms);
        let mut attempt = 0u32;
        loop {
            let healthy = self.check_all().await;
            if healthy == self.targets.len() {
                tracing::info!(nodes = healthy, attempts = attempt + 1, "All nodes ready");
                return true;
            }

            attempt = attempt.saturating_add(1);
            let delay = schedule.delay(attempt);
            tracing::info!(
                ready = healthy,
                expected = self.targets.len(),
                retry_in = ?delay,
                "Waiting for nodes"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Readiness wait interrupted by shutdown");
                    return false;
                }
            }
        }
    }
}
