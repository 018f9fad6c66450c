//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MeshConfig (validated, immutable)
//!     → handed by value to each node, the generator and the CLI
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ActivityConfig, ChaosConfig, ChaosMode, EndpointChaosConfig, GeneratorConfig, LogFormat,
    LoopConfig, MeshConfig, NodesConfig, ObservabilityConfig, PeersConfig, TimeoutConfig,
};
