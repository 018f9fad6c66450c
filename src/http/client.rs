//! Outbound calls to peer nodes.
//!
//! # Responsibilities
//! - Open a client span per call, as a child of the caller's span
//! - Inject the client span's context into the outbound headers
//! - Enforce the upstream timeout and classify failures
//!
//! # Design Decisions
//! - No retries; a domain call either answers within the deadline or the
//!   caller decides whether the dependency was required
//! - Non-2xx answers are returned as `PeerError::Status` with the decoded
//!   body so callers can map them onto their own error codes

use axum::http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::error::ServiceError;
use crate::observability::context;
use crate::observability::span::SpanGuard;

#[derive(Debug, Error)]
pub enum PeerError {
    /// Connection refused, reset or timed out.
    #[error("{peer} unavailable: {detail}")]
    Unavailable { peer: String, detail: String },

    /// The peer answered with a non-success status.
    #[error("{peer} answered {status}")]
    Status { peer: String, status: u16, body: Value },

    /// The peer answered 2xx with a body we could not decode.
    #[error("{peer} sent an undecodable body: {detail}")]
    Decode { peer: String, detail: String },
}

impl PeerError {
    pub fn status(&self) -> Option<u16> {
        match self {
            PeerError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Default mapping for a required dependency: anything but a clean
    /// answer means the dependency is unavailable.
    pub fn unavailable(self, code: &'static str) -> ServiceError {
        ServiceError::upstream_unavailable(code, self.to_string())
    }
}

/// HTTP client bound to one peer node.
#[derive(Clone)]
pub struct PeerClient {
    peer: String,
    base_url: String,
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(peer: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            peer: peer.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one call inside its own client span and return the JSON body.
    pub async fn call(
        &self,
        parent: &SpanGuard,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, PeerError> {
        let url = format!("{}{}", self.base_url, path);

        // 1. Client span, one level below the caller
        let mut span = parent.child(operation);
        span.set_attribute("http.method", method.as_str());
        span.set_attribute("http.url", url.as_str());
        span.set_attribute("peer.service", self.peer.as_str());

        // 2. Propagate the client span's context
        let mut headers = HeaderMap::new();
        context::inject(span.context(), &mut headers);

        let mut request = self.http.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }

        // 3. Send and classify
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = if e.is_timeout() { "timeout".to_string() } else { e.to_string() };
                span.set_attribute("error", "request_failed");
                span.set_error(detail.clone());
                return Err(PeerError::Unavailable {
                    peer: self.peer.clone(),
                    detail,
                });
            }
        };

        let status = response.status();
        span.set_attribute("http.status_code", status.as_u16());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                span.set_error(e.to_string());
                return Err(PeerError::Unavailable {
                    peer: self.peer.clone(),
                    detail: e.to_string(),
                });
            }
        };
        let decoded = if bytes.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_slice::<Value>(&bytes)
        };

        if !status.is_success() {
            span.set_error(format!("{} answered {}", self.peer, status.as_u16()));
            return Err(PeerError::Status {
                peer: self.peer.clone(),
                status: status.as_u16(),
                body: decoded.unwrap_or(Value::Null),
            });
        }

        match decoded {
            Ok(value) => {
                span.end();
                Ok(value)
            }
            Err(e) => {
                span.set_attribute("error", "decode_failed");
                span.set_error(e.to_string());
                Err(PeerError::Decode {
                    peer: self.peer.clone(),
                    detail: e.to_string(),
                })
            }
        }
    }

    /// `call` followed by typed decoding of the body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        parent: &SpanGuard,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, PeerError> {
        let value = self.call(parent, operation, method, path, body).await?;
        serde_json::from_value(value).map_err(|e| PeerError::Decode {
            peer: self.peer.clone(),
            detail: e.to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, parent: &SpanGuard, operation: &str, path: &str) -> Result<T, PeerError> {
        self.call_json(parent, operation, Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        parent: &SpanGuard,
        operation: &str,
        path: &str,
        body: Value,
    ) -> Result<T, PeerError> {
        self.call_json(parent, operation, Method::POST, path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::TraceContext;
    use crate::observability::sink::MemorySink;
    use crate::observability::span::{SpanRecorder, SpanStatus};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = Arc::new(MemorySink::new());
        let recorder = SpanRecorder::new("order-service", sink.clone());
        let parent = recorder.start(TraceContext::root(), "create_order");

        let client = PeerClient::new("user-service", &format!("http://{}", addr), Duration::from_millis(500)).unwrap();
        let err = client
            .get::<Value>(&parent, "validate_user_call", "/users/1")
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Unavailable { .. }));
        assert_eq!(
            err.unavailable("user_service_unavailable").status(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );

        let parent_id = parent.span_id();
        parent.end();
        let spans = sink.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "validate_user_call");
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].parent_span_id, Some(parent_id));
    }
}
