//! Per-request protocol shared by every handler.
//!
//! # Responsibilities
//! - Derive the server-side trace context and open the operation span
//! - Apply the chaos policy for the endpoint
//! - Collect log fields, emit exactly one correlated line per request
//! - Close the span and record request metrics before responding
//!
//! # Design Decisions
//! - `respond` consumes the scope, so a request can only be answered once
//! - A scope dropped before `respond` (timeout, client gone, unwind) still
//!   writes its one line, at error level with `error=request_cancelled`
//! - Error status, the `error` attribute and the `error=<code>` log field are
//!   all set from the same `ServiceError`

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::chaos::ChaosPolicy;
use crate::error::ServiceError;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::Reply;
use crate::observability::context::{self, TraceContext};
use crate::observability::logging::{CorrelatedLogger, LogLevel};
use crate::observability::metrics;
use crate::observability::span::{SpanGuard, SpanRecorder};

/// Observability and fault-injection handles of one node.
#[derive(Clone)]
pub struct Telemetry {
    pub recorder: SpanRecorder,
    pub logger: CorrelatedLogger,
    pub chaos: Arc<ChaosPolicy>,
}

impl Telemetry {
    pub fn new(recorder: SpanRecorder, logger: CorrelatedLogger, chaos: Arc<ChaosPolicy>) -> Self {
        Self { recorder, logger, chaos }
    }

    pub fn service(&self) -> &str {
        self.recorder.service()
    }
}

/// One inbound request, from extraction to response.
pub struct RequestScope {
    span: SpanGuard,
    logger: CorrelatedLogger,
    chaos: Arc<ChaosPolicy>,
    endpoint: &'static str,
    chaos_key: &'static str,
    fields: BTreeMap<String, Value>,
    started: Instant,
    responded: bool,
}

impl RequestScope {
    /// Open the scope.
    ///
    /// `operation` names the span, `endpoint` is the route template and
    /// `chaos_key` selects the chaos table entry.
    pub fn begin(
        telemetry: &Telemetry,
        headers: &HeaderMap,
        operation: &str,
        endpoint: &'static str,
        chaos_key: &'static str,
    ) -> Self {
        // 1. Continue the caller's trace, or start a new one
        let ctx = context::extract_or_root(headers);
        let mut span = telemetry.recorder.start(ctx, operation);
        span.set_attribute("endpoint", endpoint);

        let mut fields = BTreeMap::new();
        fields.insert("endpoint".to_string(), Value::from(endpoint));
        if let Some(request_id) = headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
            span.set_attribute("request.id", request_id);
            fields.insert("request_id".to_string(), Value::from(request_id));
        }

        Self {
            span,
            logger: telemetry.logger.clone(),
            chaos: telemetry.chaos.clone(),
            endpoint,
            chaos_key,
            fields,
            started: Instant::now(),
            responded: false,
        }
    }

    pub fn span(&self) -> &SpanGuard {
        &self.span
    }

    pub fn context(&self) -> &TraceContext {
        self.span.context()
    }

    /// Set a span attribute only.
    pub fn attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.span.set_attribute(key, value);
    }

    /// Add a field to the summary log line only.
    pub fn field(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Set a span attribute and the matching log field.
    pub fn record(&mut self, attribute: &str, field: &str, value: impl Into<Value>) {
        let value = value.into();
        self.span.set_attribute(attribute, value.clone());
        self.fields.insert(field.to_string(), value);
    }

    /// Sleep for the endpoint's simulated latency.
    pub async fn simulate_latency(&mut self) {
        let latency = self.chaos.delay(self.chaos_key).await;
        if !latency.is_zero() {
            self.span.set_attribute("simulated.latency_ms", latency.as_millis() as u64);
        }
    }

    /// Whether the chaos policy injects a failure into this request.
    pub fn injected_failure(&mut self) -> bool {
        let fail = self.chaos.should_fail(self.chaos_key);
        if fail {
            self.span.set_attribute("chaos.injected", true);
        }
        fail
    }

    /// Log, close the span and build the response.
    pub fn respond(mut self, result: Result<Reply, ServiceError>) -> Response {
        let result = result.and_then(|reply| {
            let level = if reply.is_degraded() { LogLevel::Warn } else { LogLevel::Info };
            let message = reply.message().to_string();
            reply
                .into_parts()
                .map(|(status, body)| (status, body, message, level))
        });

        let (status, response) = match result {
            Ok((status, body, message, level)) => {
                self.span.set_attribute("http.status_code", status.as_u16());
                self.fields.insert("status".to_string(), Value::from(status.as_u16()));
                self.log(level, message);
                (status, (status, Json(body)).into_response())
            }
            Err(err) => {
                let status = err.status();
                self.span.set_attribute("http.status_code", status.as_u16());
                self.span.set_attribute("error", err.code);
                self.span.set_attribute("error.kind", err.kind.as_str());
                self.span.set_error(err.message.clone());
                self.fields.insert("status".to_string(), Value::from(status.as_u16()));
                self.fields.insert("error".to_string(), Value::from(err.code));
                self.log(LogLevel::Error, err.message.clone());
                (status, err.into_response())
            }
        };

        metrics::record_request(self.span.service(), self.endpoint, status.as_u16(), self.started);

        let mut response = response;
        self.span.close();
        self.responded = true;
        context::inject(self.span.context(), response.headers_mut());
        response
    }

    fn log(&mut self, level: LogLevel, message: String) {
        self.fields.insert(
            "duration_ms".to_string(),
            Value::from(self.started.elapsed().as_secs_f64() * 1000.0),
        );
        let fields = std::mem::take(&mut self.fields);
        self.logger.for_span(&self.span).fields(fields).log(level, message);
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.responded {
            return;
        }
        let code = if std::thread::panicking() { "request_panicked" } else { "request_cancelled" };
        self.span.set_attribute("error", code);
        self.fields.insert("error".to_string(), Value::from(code));
        self.log(LogLevel::Error, "Request ended before a response was sent".to_string());
        // the span field closes right after this, as abandoned
    }
}
