//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → context.rs (extract or start a root context)
//!     → span.rs (SpanGuard per operation, child contexts for peer calls)
//!         → sink.rs (bounded hand-off, NDJSON exporter)
//!     → logging.rs (correlated log lines carrying trace/span ids)
//!     → metrics.rs (counters and histograms, optional Prometheus endpoint)
//! ```
//!
//! # Design Decisions
//! - Trace context is passed explicitly, never through task-local state
//! - Span and log output never block request handling
//! - Operational logs (`tracing`) and correlated logs are separate streams

pub mod context;
pub mod logging;
pub mod metrics;
pub mod sink;
pub mod span;

pub use context::{extract, extract_or_root, inject, SpanId, TraceContext, TraceId};
pub use logging::{CorrelatedLogger, LogLevel, LogRecord, LogWriter, MemoryWriter, StdoutWriter};
pub use sink::{span_pipeline, MemorySink, NoopSink, SpanDestination, SpanExporter, SpanSink};
pub use span::{FinishedSpan, SpanGuard, SpanRecorder, SpanStatus};
