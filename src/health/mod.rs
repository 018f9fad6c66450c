//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Readiness (active.rs):
//!     Poll each node's /health with backoff
//!     → Update state.rs
//!     → Return once every node answered
//!
//! State machine (state.rs):
//!     Unknown → Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Readiness probes are untraced; the generator's health loop produces
//!   the traced health checks
//! - Health state is per-node, keyed by service name

pub mod active;
pub mod state;

pub use active::HealthProbe;
pub use state::{HealthRegistry, HealthState};
