//! Structured logging.
//!
//! Two streams leave every process:
//! - operational logs through `tracing`, formatted by `tracing-subscriber`
//!   and written to stderr;
//! - correlated domain logs through [`CorrelatedLogger`], one JSON object
//!   per line on stdout, each carrying the trace and span ids of the
//!   operation that produced it.
//!
//! # Design Decisions
//! - A correlated line is serialized fully before it is written, then
//!   written with a single `write_all` under the stdout lock
//! - Missing correlation is an empty `trace_id`, never an error

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::observability::context::TraceContext;
use crate::observability::span::SpanGuard;

/// Initialize the operational log subscriber.
///
/// `RUST_LOG` overrides the configured level. Calling this twice is harmless.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One correlated log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub service: String,
    pub message: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Output for correlated log lines.
pub trait LogWriter: Send + Sync {
    fn write(&self, record: &LogRecord);
}

/// Writes NDJSON to stdout.
pub struct StdoutWriter;

impl LogWriter for StdoutWriter {
    fn write(&self, record: &LogRecord) {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize log record");
                return;
            }
        };
        line.push(b'\n');

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(&line).and_then(|_| stdout.flush()) {
            tracing::warn!(error = %e, "Failed to write log record");
        }
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct MemoryWriter {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn for_trace(&self, trace_id: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.trace_id == trace_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl LogWriter for MemoryWriter {
    fn write(&self, record: &LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Logger bound to one service.
#[derive(Clone)]
pub struct CorrelatedLogger {
    service: Arc<str>,
    writer: Arc<dyn LogWriter>,
}

impl CorrelatedLogger {
    pub fn new(service: impl Into<Arc<str>>, writer: Arc<dyn LogWriter>) -> Self {
        Self {
            service: service.into(),
            writer,
        }
    }

    pub fn stdout(service: impl Into<Arc<str>>) -> Self {
        Self::new(service, Arc::new(StdoutWriter))
    }

    /// Entry correlated with an open span.
    pub fn for_span(&self, span: &SpanGuard) -> LogEntry<'_> {
        self.for_context(span.context())
    }

    pub fn for_context(&self, ctx: &TraceContext) -> LogEntry<'_> {
        LogEntry {
            logger: self,
            trace_id: ctx.trace_id.to_string(),
            span_id: ctx.span_id.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Entry with no trace correlation.
    pub fn uncorrelated(&self) -> LogEntry<'_> {
        LogEntry {
            logger: self,
            trace_id: String::new(),
            span_id: String::new(),
            fields: BTreeMap::new(),
        }
    }
}

/// A log line being assembled.
#[must_use = "a log entry is only written by info, warn or error"]
pub struct LogEntry<'a> {
    logger: &'a CorrelatedLogger,
    trace_id: String,
    span_id: String,
    fields: BTreeMap<String, Value>,
}

impl LogEntry<'_> {
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Merge several fields at once; later keys overwrite earlier ones.
    pub fn fields(mut self, fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn info(self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into());
    }

    pub fn warn(self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message.into());
    }

    pub fn error(self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into());
    }

    pub fn log(self, level: LogLevel, message: impl Into<String>) {
        self.emit(level, message.into());
    }

    fn emit(self, level: LogLevel, message: String) {
        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            service: self.logger.service.to_string(),
            message,
            trace_id: self.trace_id,
            span_id: self.span_id,
            fields: self.fields,
        };
        self.logger.writer.write(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::sink::NoopSink;
    use crate::observability::span::SpanRecorder;

    fn logger() -> (CorrelatedLogger, Arc<MemoryWriter>) {
        let writer = Arc::new(MemoryWriter::new());
        (CorrelatedLogger::new("user-service", writer.clone()), writer)
    }

    #[test]
    fn test_span_correlation() {
        let (logger, writer) = logger();
        let recorder = SpanRecorder::new("user-service", Arc::new(NoopSink));
        let span = recorder.start(TraceContext::root(), "user_login");

        logger
            .for_span(&span)
            .field("email", "john@example.com")
            .info("User logged in");

        let records = writer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].trace_id, span.trace_id().to_string());
        assert_eq!(records[0].span_id, span.span_id().to_string());
        assert_eq!(records[0].field("email").unwrap(), "john@example.com");
    }

    #[test]
    fn test_uncorrelated_has_empty_trace_id() {
        let (logger, writer) = logger();
        logger.uncorrelated().warn("cache miss ratio high");
        let records = writer.records();
        assert_eq!(records[0].trace_id, "");
        assert_eq!(records[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_record_serializes_flat() {
        let (logger, writer) = logger();
        logger
            .for_context(&TraceContext::root())
            .field("error", "invalid_credentials")
            .error("Login failed");

        let json = serde_json::to_value(&writer.records()[0]).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["service"], "user-service");
        assert_eq!(json["error"], "invalid_credentials");
        assert_eq!(json["trace_id"].as_str().unwrap().len(), 32);
        assert!(json["timestamp"].is_string());
    }
}
