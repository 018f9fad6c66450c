//! Span export.
//!
//! # Responsibilities
//! - Accept finished spans without blocking the request path
//! - Write spans as newline-delimited JSON to the configured destination
//! - Keep spans in memory for tests
//!
//! # Design Decisions
//! - Request handlers only ever `try_send` into a bounded channel; a full
//!   buffer drops the span and counts the drop
//! - A single exporter task owns the writer, so lines never interleave
//! - On shutdown the exporter drains whatever is already buffered

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use crate::observability::context::TraceId;
use crate::observability::metrics;
use crate::observability::span::FinishedSpan;

/// Destination for closed spans.
pub trait SpanSink: Send + Sync {
    /// Hand over a span. Must not block.
    fn emit(&self, span: FinishedSpan);
}

/// Where the exporter writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanDestination {
    Stdout,
    Stderr,
    File(PathBuf),
    Discard,
}

impl SpanDestination {
    /// Interpret the `observability.span_sink` setting.
    pub fn from_setting(value: &str) -> Self {
        match value {
            "stdout" | "" => SpanDestination::Stdout,
            "stderr" => SpanDestination::Stderr,
            "none" | "off" => SpanDestination::Discard,
            path => SpanDestination::File(PathBuf::from(path)),
        }
    }
}

/// Sink side of the export pipeline.
pub struct ChannelSink {
    tx: mpsc::Sender<FinishedSpan>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SpanSink for ChannelSink {
    fn emit(&self, span: FinishedSpan) {
        match self.tx.try_send(span) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(span)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_span_dropped(&span.service);
            }
            // Exporter already gone during shutdown.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Exporter side of the pipeline.
pub struct SpanExporter {
    rx: mpsc::Receiver<FinishedSpan>,
    destination: SpanDestination,
}

/// Create a bounded sink and the exporter that drains it.
pub fn span_pipeline(destination: SpanDestination, capacity: usize) -> (Arc<ChannelSink>, SpanExporter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = Arc::new(ChannelSink {
        tx,
        dropped: AtomicU64::new(0),
    });
    (sink, SpanExporter { rx, destination })
}

impl SpanExporter {
    /// Run until every sender is gone or shutdown fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let mut writer: Box<dyn AsyncWrite + Send + Unpin> = match &self.destination {
            SpanDestination::Stdout => Box::new(tokio::io::stdout()),
            SpanDestination::Stderr => Box::new(tokio::io::stderr()),
            SpanDestination::File(path) => Box::new(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            ),
            SpanDestination::Discard => Box::new(tokio::io::sink()),
        };

        tracing::info!(destination = ?self.destination, "Span exporter started");

        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(span) => write_span(&mut writer, &span).await?,
                    None => break,
                },
                _ = shutdown.recv() => {
                    // Drain what is already buffered, then stop.
                    self.rx.close();
                    while let Some(span) = self.rx.recv().await {
                        write_span(&mut writer, &span).await?;
                    }
                    break;
                }
            }
        }

        writer.flush().await?;
        tracing::info!("Span exporter stopped");
        Ok(())
    }
}

async fn write_span<W>(writer: &mut W, span: &FinishedSpan) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = match serde_json::to_vec(span) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, span = %span.name, "Failed to serialize span");
            return Ok(());
        }
    };
    line.push(b'\n');
    writer.write_all(&line).await?;
    metrics::record_span_emitted(&span.service);
    Ok(())
}

/// Sink that keeps every span in memory.
#[derive(Default)]
pub struct MemorySink {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in close order.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn for_trace(&self, trace_id: TraceId) -> Vec<FinishedSpan> {
        self.spans()
            .into_iter()
            .filter(|s| s.trace_id == trace_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanSink for MemorySink {
    fn emit(&self, span: FinishedSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

/// Sink that discards everything.
pub struct NoopSink;

impl SpanSink for NoopSink {
    fn emit(&self, _span: FinishedSpan) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::TraceContext;
    use crate::observability::span::SpanRecorder;

    #[test]
    fn test_destination_from_setting() {
        assert_eq!(SpanDestination::from_setting("stdout"), SpanDestination::Stdout);
        assert_eq!(SpanDestination::from_setting("none"), SpanDestination::Discard);
        assert_eq!(
            SpanDestination::from_setting("/tmp/spans.ndjson"),
            SpanDestination::File(PathBuf::from("/tmp/spans.ndjson"))
        );
    }

    #[test]
    fn test_full_buffer_drops() {
        let (sink, _exporter) = span_pipeline(SpanDestination::Discard, 1);
        let recorder = SpanRecorder::new("svc", sink.clone());
        recorder.start(TraceContext::root(), "a").end();
        recorder.start(TraceContext::root(), "b").end();
        recorder.start(TraceContext::root(), "c").end();
        assert_eq!(sink.dropped(), 2);
    }

    #[tokio::test]
    async fn test_exporter_writes_ndjson_file() {
        let path = std::env::temp_dir().join(format!("tracemart-spans-{}.ndjson", uuid::Uuid::new_v4()));
        let (sink, exporter) = span_pipeline(SpanDestination::File(path.clone()), 16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(exporter.run(shutdown_rx));

        let recorder = SpanRecorder::new("svc", sink);
        recorder.start(TraceContext::root(), "first").end();
        recorder.start(TraceContext::root(), "second").end();

        let _ = shutdown_tx.send(());
        handle.await.unwrap().unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "span");
        assert_eq!(lines[0]["name"], "first");
        assert_eq!(lines[1]["name"], "second");
        assert_eq!(lines[0]["trace_id"].as_str().unwrap().len(), 32);

        let _ = tokio::fs::remove_file(&path).await;
    }
}
