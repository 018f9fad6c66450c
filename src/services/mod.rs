//! Service nodes.
//!
//! # Data Flow
//! ```text
//! NodeKind + MeshConfig
//!     → Telemetry (span recorder, correlated logger, chaos policy)
//!     → PeerClients for the nodes it calls
//!     → node router (identity.rs / catalog.rs / orders.rs)
//!     → NodeServer (health, middleware)
//! ```
//!
//! Call graph between nodes:
//! ```text
//! order-service ──► user-service
//!       │               │
//!       └──► product-service ◄──┘
//! ```

pub mod activity;
pub mod catalog;
pub mod identity;
pub mod orders;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::chaos::ChaosPolicy;
use crate::config::MeshConfig;
use crate::http::{NodeServer, PeerClient, Telemetry};
use crate::observability::logging::{CorrelatedLogger, LogWriter};
use crate::observability::sink::SpanSink;
use crate::observability::span::SpanRecorder;

pub use catalog::CatalogNode;
pub use identity::IdentityNode;
pub use orders::OrdersNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Identity,
    Catalog,
    Orders,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Identity, NodeKind::Catalog, NodeKind::Orders];

    pub fn service_name(self) -> &'static str {
        match self {
            NodeKind::Identity => identity::SERVICE_NAME,
            NodeKind::Catalog => catalog::SERVICE_NAME,
            NodeKind::Orders => orders::SERVICE_NAME,
        }
    }

    pub fn bind_address(self, config: &MeshConfig) -> &str {
        match self {
            NodeKind::Identity => &config.nodes.identity_bind,
            NodeKind::Catalog => &config.nodes.catalog_bind,
            NodeKind::Orders => &config.nodes.orders_bind,
        }
    }

    /// Telemetry of this node: spans to `sink`, correlated logs to `writer`.
    pub fn telemetry(self, config: &MeshConfig, sink: Arc<dyn SpanSink>, writer: Arc<dyn LogWriter>) -> Telemetry {
        Telemetry::new(
            SpanRecorder::new(self.service_name(), sink),
            CorrelatedLogger::new(self.service_name(), writer),
            Arc::new(ChaosPolicy::from_config(&config.chaos)),
        )
    }

    /// Build the node's server with peer clients taken from `config.peers`.
    pub fn build(self, config: &MeshConfig, telemetry: Telemetry) -> Result<NodeServer, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeouts.upstream_ms);
        let peers = &config.peers;

        let routes = match self {
            NodeKind::Identity => {
                let catalog = PeerClient::new(catalog::SERVICE_NAME, &peers.catalog_url, timeout)?;
                Arc::new(IdentityNode::new(telemetry.clone(), catalog)).router()
            }
            NodeKind::Catalog => Arc::new(CatalogNode::new(telemetry.clone())).router(),
            NodeKind::Orders => {
                let identity = PeerClient::new(identity::SERVICE_NAME, &peers.identity_url, timeout)?;
                let catalog = PeerClient::new(catalog::SERVICE_NAME, &peers.catalog_url, timeout)?;
                Arc::new(OrdersNode::new(telemetry.clone(), identity, catalog)).router()
            }
        };

        Ok(NodeServer::new(routes, telemetry, &config.timeouts))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" | "user-service" => Ok(NodeKind::Identity),
            "catalog" | "product-service" => Ok(NodeKind::Catalog),
            "orders" | "order-service" => Ok(NodeKind::Orders),
            other => Err(format!("unknown node: {}", other)),
        }
    }
}
