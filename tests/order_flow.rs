//! End-to-end order placement across the three nodes.

mod common;

use serde_json::{json, Value};
use tracemart::services::catalog::seed_products;

use common::{response_trace_id, Mesh};

fn price_of(product_id: u64) -> f64 {
    seed_products()
        .into_iter()
        .find(|p| p.id == product_id)
        .map(|p| p.price)
        .unwrap()
}

async fn available(mesh: &Mesh, product_id: u64) -> u64 {
    let inventory: Value = mesh
        .client
        .get(mesh.catalog_url(&format!("/inventory/{}", product_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    inventory["available"].as_u64().unwrap()
}

#[tokio::test]
async fn test_create_order_spans_one_trace() {
    let mesh = Mesh::start().await;

    let response = mesh
        .client
        .post(mesh.orders_url("/orders"))
        .json(&json!({
            "user_id": 1,
            "items": [
                { "product_id": 3, "quantity": 2 },
                { "product_id": 6, "quantity": 1 }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let trace_id = response_trace_id(&response);
    let order: Value = response.json().await.unwrap();

    let expected = price_of(3) * 2.0 + price_of(6);
    assert!((order["total"].as_f64().unwrap() - expected).abs() < 1e-9);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);

    let spans = mesh.spans.for_trace(trace_id);
    let roots: Vec<_> = spans.iter().filter(|s| s.parent_span_id.is_none()).collect();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].name, "create_order");
    assert_eq!(roots[0].service, "order-service");

    let count = |name: &str| spans.iter().filter(|s| s.name == name).count();
    assert_eq!(count("validate_user_call"), 1);
    assert_eq!(count("get_product_details_call"), 2);
    assert_eq!(count("reserve_inventory_call"), 2);
    assert_eq!(count("release_inventory_call"), 0);

    // every non-root span hangs off a span of the same trace
    for span in spans.iter().filter(|s| s.parent_span_id.is_some()) {
        let parent = span.parent_span_id.unwrap();
        assert!(spans.iter().any(|s| s.span_id == parent), "orphan span {}", span.name);
    }

    // correlated logs of all three services share the trace
    let services: std::collections::BTreeSet<_> = mesh
        .logs
        .for_trace(&trace_id.to_string())
        .into_iter()
        .map(|r| r.service)
        .collect();
    assert_eq!(services.len(), 3);

    assert_eq!(available(&mesh, 3).await, 25 - 2);
    mesh.stop().await;
}

#[tokio::test]
async fn test_failed_reservation_is_compensated() {
    let mesh = Mesh::start().await;

    // Smart Watch (7) has 5 units
    let response = mesh
        .client
        .post(mesh.orders_url("/orders"))
        .json(&json!({
            "user_id": 2,
            "items": [
                { "product_id": 1, "quantity": 1 },
                { "product_id": 7, "quantity": 6 }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
    let trace_id = response_trace_id(&response);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "inventory_reservation_failed");
    assert!(body["error"].as_str().unwrap().contains("product 7"));

    let spans = mesh.spans.for_trace(trace_id);
    let count = |name: &str| spans.iter().filter(|s| s.name == name).count();
    assert_eq!(count("get_product_details_call"), 2);
    assert_eq!(count("reserve_inventory_call"), 2);
    assert_eq!(count("release_inventory_call"), 1);

    // stock of the first line was given back, the second never moved
    assert_eq!(available(&mesh, 1).await, 15);
    assert_eq!(available(&mesh, 7).await, 5);

    let orders: Value = mesh
        .client
        .get(mesh.orders_url("/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders["total"], 0);

    mesh.stop().await;
}

#[tokio::test]
async fn test_reserve_above_stock_leaves_stock_unchanged() {
    let mesh = Mesh::start().await;

    let response = mesh
        .client
        .post(mesh.catalog_url("/inventory/2/reserve"))
        .json(&json!({ "quantity": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "insufficient_stock");

    assert_eq!(available(&mesh, 2).await, 8);
    mesh.stop().await;
}

#[tokio::test]
async fn test_pay_then_ship() {
    let mesh = Mesh::start().await;

    let order: Value = mesh
        .client
        .post(mesh.orders_url("/orders"))
        .json(&json!({ "user_id": 3, "items": [{ "product_id": 8, "quantity": 1 }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = order["id"].as_u64().unwrap();

    let payment = mesh
        .client
        .post(mesh.orders_url(&format!("/payments/{}", id)))
        .json(&json!({ "payment_method": "paypal" }))
        .send()
        .await
        .unwrap();
    assert_eq!(payment.status(), 200);

    let shipped = mesh
        .client
        .put(mesh.orders_url(&format!("/orders/{}/status", id)))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .unwrap();
    assert_eq!(shipped.status(), 200);

    let cancel = mesh
        .client
        .post(mesh.orders_url(&format!("/orders/{}/cancel", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(cancel.status(), 409);
    let body: Value = cancel.json().await.unwrap();
    assert_eq!(body["code"], "cancellation_not_allowed");

    mesh.stop().await;
}

#[tokio::test]
async fn test_cancel_releases_inventory() {
    let mesh = Mesh::start().await;

    let order: Value = mesh
        .client
        .post(mesh.orders_url("/orders"))
        .json(&json!({ "user_id": 1, "items": [{ "product_id": 5, "quantity": 3 }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(available(&mesh, 5).await, 17);

    let cancel: Value = mesh
        .client
        .post(mesh.orders_url(&format!("/orders/{}/cancel", order["id"])))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cancel["inventory_released"], true);
    assert_eq!(available(&mesh, 5).await, 20);

    mesh.stop().await;
}
