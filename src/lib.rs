//! Synthetic e-commerce service mesh for distributed tracing.

pub mod chaos;
pub mod config;
pub mod error;
pub mod generator;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod store;

pub use config::schema::MeshConfig;
pub use error::ServiceError;
pub use lifecycle::{Shutdown, Supervisor};
pub use services::NodeKind;
