//! HTTP server setup for a service node.
//!
//! # Responsibilities
//! - Mount the node's routes plus the shared `/health` endpoint
//! - Wire up middleware (timeout, request ID, tower-http tracing)
//! - Serve on a listener until shutdown is signalled

use axum::{extract::State, http::HeaderMap, response::Response, routing::get, Router};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::TimeoutConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::Reply;
use crate::http::scope::{RequestScope, Telemetry};

/// HTTP server for one service node.
pub struct NodeServer {
    name: String,
    router: Router,
}

impl NodeServer {
    /// Wrap the node's routes with health and middleware.
    pub fn new(routes: Router, telemetry: Telemetry, timeouts: &TimeoutConfig) -> Self {
        let name = telemetry.service().to_string();
        let health = Router::new()
            .route("/health", get(health_handler))
            .with_state(telemetry);

        let router = Self::build_router(routes.merge(health), timeouts);
        Self { name, router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(routes: Router, timeouts: &TimeoutConfig) -> Router {
        routes
            .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The finished router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(service = %self.name, address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(service = %self.name, "HTTP server stopped");
        Ok(())
    }
}

async fn health_handler(State(telemetry): State<Telemetry>, headers: HeaderMap) -> Response {
    let scope = RequestScope::begin(&telemetry, &headers, "health_check", "/health", "health");
    let body = json!({
        "status": "OK",
        "service": telemetry.service(),
        "timestamp": Utc::now(),
        "trace_id": scope.context().trace_id,
    });
    scope.respond(Ok(Reply::ok("Health check", &body)))
}
