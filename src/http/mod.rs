//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (Axum setup, timeout, request ID, tower-http trace)
//!     → scope.rs (trace context, span, chaos, one correlated log line)
//!         → request.rs (path ids and JSON bodies)
//!         → client.rs (peer calls with injected context)
//!     → response.rs (status, body, summary message)
//!     → Send to client
//! ```

pub mod client;
pub mod request;
pub mod response;
pub mod scope;
pub mod server;

pub use client::{PeerClient, PeerError};
pub use request::{parse_body, parse_id, X_REQUEST_ID};
pub use response::Reply;
pub use scope::{RequestScope, Telemetry};
pub use server::NodeServer;
