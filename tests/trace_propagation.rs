//! Trace headers and correlated logs as seen from outside the nodes.

mod common;

use serde_json::{json, Value};
use tracemart::observability::context::{SpanId, TraceContext, TraceId};
use tracemart::observability::logging::LogLevel;

use common::{response_trace_id, Mesh};

#[tokio::test]
async fn test_unknown_login_logs_one_error() {
    let mesh = Mesh::start().await;

    let response = mesh
        .client
        .post(mesh.identity_url("/auth/login"))
        .json(&json!({ "email": "nobody@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let trace_id = response_trace_id(&response).to_string();

    let records = mesh.logs.for_trace(&trace_id);
    let errors: Vec<_> = records.iter().filter(|r| r.level == LogLevel::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].service, "user-service");
    assert_eq!(errors[0].field("error"), Some(&json!("invalid_credentials")));

    mesh.stop().await;
}

#[tokio::test]
async fn test_malformed_headers_start_fresh_root() {
    let mesh = Mesh::start().await;

    let response = mesh
        .client
        .get(mesh.catalog_url("/products"))
        .header("x-trace-id", "not-hex")
        .header("x-span-id", "")
        .header("traceparent", "00-zzzz-1234-01")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let trace_id = response_trace_id(&response);

    let spans = mesh.spans.for_trace(trace_id);
    assert_eq!(spans.len(), 1);
    assert!(spans[0].parent_span_id.is_none());
    assert_eq!(spans[0].name, "get_products");

    mesh.stop().await;
}

#[tokio::test]
async fn test_inbound_context_is_continued() {
    let mesh = Mesh::start().await;
    let caller = TraceContext::root();

    let response = mesh
        .client
        .get(mesh.identity_url("/users/2"))
        .header("traceparent", caller.traceparent())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response_trace_id(&response), caller.trace_id);

    let spans = mesh.spans.for_trace(caller.trace_id);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].parent_span_id, Some(caller.span_id));

    let user: Value = response.json().await.unwrap();
    assert!(user.get("password").is_none());

    mesh.stop().await;
}

#[tokio::test]
async fn test_custom_headers_are_continued() {
    let mesh = Mesh::start().await;
    let trace_id: TraceId = "4bf92f3577b34da6a3ce929d0e0e4736".parse().unwrap();
    let span_id: SpanId = "00f067aa0ba902b7".parse().unwrap();

    let response = mesh
        .client
        .get(mesh.orders_url("/analytics/orders"))
        .header("x-trace-id", trace_id.to_string())
        .header("x-span-id", span_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let spans = mesh.spans.for_trace(trace_id);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].parent_span_id, Some(span_id));
    assert_eq!(spans[0].service, "order-service");

    mesh.stop().await;
}

#[tokio::test]
async fn test_health_reports_trace_id() {
    let mesh = Mesh::start().await;

    let response = mesh.client.get(mesh.orders_url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let trace_id = response_trace_id(&response);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "order-service");
    assert_eq!(body["trace_id"], trace_id.to_string());

    mesh.stop().await;
}
