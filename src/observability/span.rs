//! Span lifecycle.
//!
//! # Responsibilities
//! - Start spans with default attributes (service, operation)
//! - Collect attributes and error status while the operation runs
//! - Close every span exactly once and hand it to the sink
//!
//! # Design Decisions
//! - `SpanGuard` owns the open span; closing takes it out of an `Option`, so
//!   a second close is a no-op and `Drop` closes anything left open
//! - A guard dropped without `end` is closed with error status: "panicked"
//!   during an unwind, "cancelled" otherwise (a dropped future)
//! - Unsampled spans are closed but never reach the sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::observability::context::{SpanId, TraceContext, TraceId};
use crate::observability::metrics;
use crate::observability::sink::SpanSink;

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A closed span, as handed to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedSpan {
    pub kind: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub service: String,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: f64,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

struct OpenSpan {
    name: String,
    started_at: DateTime<Utc>,
    started: Instant,
    attributes: BTreeMap<String, Value>,
    status: SpanStatus,
    error: Option<String>,
}

/// Factory for spans of one service.
#[derive(Clone)]
pub struct SpanRecorder {
    service: Arc<str>,
    sink: Arc<dyn SpanSink>,
}

impl SpanRecorder {
    pub fn new(service: impl Into<Arc<str>>, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            service: service.into(),
            sink,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Begin timing a span identified by `ctx`.
    pub fn start(&self, ctx: TraceContext, operation: &str) -> SpanGuard {
        let mut attributes = BTreeMap::new();
        attributes.insert("service.name".to_string(), Value::from(&*self.service));
        attributes.insert("operation.name".to_string(), Value::from(operation));

        SpanGuard {
            ctx,
            service: self.service.clone(),
            sink: self.sink.clone(),
            inner: Some(OpenSpan {
                name: operation.to_string(),
                started_at: Utc::now(),
                started: Instant::now(),
                attributes,
                status: SpanStatus::Ok,
                error: None,
            }),
        }
    }
}

/// An open span. Closed by [`SpanGuard::end`] or, failing that, on drop,
/// where it is recorded as an error.
pub struct SpanGuard {
    ctx: TraceContext,
    service: Arc<str>,
    sink: Arc<dyn SpanSink>,
    inner: Option<OpenSpan>,
}

impl SpanGuard {
    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    pub fn trace_id(&self) -> TraceId {
        self.ctx.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.ctx.span_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Start a span one level below this one, reporting to the same sink.
    pub fn child(&self, operation: &str) -> SpanGuard {
        SpanRecorder {
            service: self.service.clone(),
            sink: self.sink.clone(),
        }
        .start(self.ctx.child(), operation)
    }

    /// Set an attribute; a later call with the same key wins.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(open) = self.inner.as_mut() {
            open.attributes.insert(key.into(), value.into());
        }
    }

    /// Mark the span as failed; a later call replaces the detail.
    pub fn set_error(&mut self, detail: impl Into<String>) {
        if let Some(open) = self.inner.as_mut() {
            open.status = SpanStatus::Error;
            open.error = Some(detail.into());
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(&self.inner, Some(open) if open.status == SpanStatus::Error)
    }

    /// Close the span now.
    pub fn end(mut self) {
        self.close();
    }

    /// Close the span in place; later calls and the drop are no-ops.
    pub fn close(&mut self) {
        self.finish(false);
    }

    /// A span still open at drop was abandoned: its future was cancelled
    /// or its thread unwound. Either way it did not complete normally.
    fn finish(&mut self, abandoned: bool) {
        let Some(mut open) = self.inner.take() else {
            return;
        };

        if open.status == SpanStatus::Ok {
            if std::thread::panicking() {
                open.status = SpanStatus::Error;
                open.error = Some("panicked".to_string());
            } else if abandoned {
                open.status = SpanStatus::Error;
                open.error = Some("cancelled".to_string());
            }
        }

        let span = FinishedSpan {
            kind: "span".to_string(),
            trace_id: self.ctx.trace_id,
            span_id: self.ctx.span_id,
            parent_span_id: self.ctx.parent_span_id,
            service: self.service.to_string(),
            name: open.name,
            start: open.started_at,
            end: Utc::now(),
            duration_ms: open.started.elapsed().as_secs_f64() * 1000.0,
            status: open.status,
            error: open.error,
            attributes: open.attributes,
        };

        metrics::record_span(&span.service, span.status == SpanStatus::Ok);
        if self.ctx.sampled {
            self.sink.emit(span);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.finish(true);
    }
}

impl std::fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanGuard")
            .field("ctx", &self.ctx)
            .field("service", &self.service)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::sink::MemorySink;

    fn recorder() -> (SpanRecorder, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (SpanRecorder::new("test-service", sink.clone()), sink)
    }

    #[test]
    fn test_default_attributes() {
        let (recorder, sink) = recorder();
        recorder.start(TraceContext::root(), "get_user").end();

        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "get_user");
        assert_eq!(spans[0].attributes["service.name"], "test-service");
        assert_eq!(spans[0].attributes["operation.name"], "get_user");
        assert_eq!(spans[0].status, SpanStatus::Ok);
    }

    #[test]
    fn test_end_then_drop_emits_once() {
        let (recorder, sink) = recorder();
        let span = recorder.start(TraceContext::root(), "op");
        span.end();
        assert_eq!(sink.spans().len(), 1);
    }

    #[test]
    fn test_drop_closes_span() {
        let (recorder, sink) = recorder();
        {
            let mut span = recorder.start(TraceContext::root(), "early_return");
            span.set_attribute("step", 1);
        }
        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes["step"], 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_drop_keeps_earlier_error() {
        let (recorder, sink) = recorder();
        {
            let mut span = recorder.start(TraceContext::root(), "call");
            span.set_error("timeout");
        }
        assert_eq!(sink.spans()[0].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_close_then_drop_stays_ok() {
        let (recorder, sink) = recorder();
        {
            let mut span = recorder.start(TraceContext::root(), "op");
            span.close();
            span.set_attribute("late", true);
        }
        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert!(!spans[0].attributes.contains_key("late"));
    }

    #[tokio::test]
    async fn test_cancelled_future_marks_span() {
        let (recorder, sink) = recorder();
        let work = async move {
            let _span = recorder.start(TraceContext::root(), "slow_lookup");
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        };
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(20), work).await;
        assert!(outcome.is_err());

        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "slow_lookup");
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_last_write_wins() {
        let (recorder, sink) = recorder();
        let mut span = recorder.start(TraceContext::root(), "op");
        span.set_attribute("user.id", 1);
        span.set_attribute("user.id", 2);
        span.set_error("first");
        span.set_error("second");
        assert!(span.is_error());
        span.end();

        let spans = sink.spans();
        assert_eq!(spans[0].attributes["user.id"], 2);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].error.as_deref(), Some("second"));
    }

    #[test]
    fn test_child_span_links_parent() {
        let (recorder, sink) = recorder();
        let parent = recorder.start(TraceContext::root(), "parent");
        let child = parent.child("child");
        let (parent_trace, parent_id) = (parent.trace_id(), parent.span_id());
        child.end();
        parent.end();

        let spans = sink.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "child");
        assert_eq!(spans[0].trace_id, parent_trace);
        assert_eq!(spans[0].parent_span_id, Some(parent_id));
    }

    #[test]
    fn test_unsampled_not_emitted() {
        let (recorder, sink) = recorder();
        recorder.start(TraceContext::root_with_sampling(false), "op").end();
        assert!(sink.spans().is_empty());
    }

    #[test]
    fn test_panic_marks_error() {
        let (recorder, sink) = recorder();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _span = recorder.start(TraceContext::root(), "explodes");
            panic!("boom");
        }));
        assert!(result.is_err());

        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
    }
}
