//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Startup readiness polling:
//!     → backoff.rs (doubling delay, ceiling, random spread)
//! ```
//!
//! # Design Decisions
//! - Domain calls between nodes are never retried; only readiness polling
//!   backs off
//! - Every outbound call has a deadline (see `http::client`)

pub mod backoff;

pub use backoff::ReadinessBackoff;
