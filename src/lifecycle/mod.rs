//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Start span exporter → Bind nodes → Spawn tasks
//!
//! Supervision (supervisor.rs):
//!     Named tasks → each holds a shutdown receiver → joined on stop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Servers drain → Tasks exit → Exporter flushes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every background loop is owned by the supervisor, never detached
//! - Shutdown has a deadline: tasks still running after it are aborted

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use supervisor::Supervisor;
