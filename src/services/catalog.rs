//! Catalog node: products, search and inventory.
//!
//! # Responsibilities
//! - Serve product listings, search and per-category browsing
//! - Own stock levels; reserve and release inventory for orders
//! - Track product views for the trending list
//!
//! # Design Decisions
//! - Reserve and release are conditional writes on the product row, so two
//!   concurrent reservations can never take stock below zero
//! - View recording is best-effort: an analytics failure still answers 202

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post, put},
    Router,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::http::{parse_body, parse_id, Reply, RequestScope, Telemetry};
use crate::store::{InMemoryTable, Record, Repository};

pub const SERVICE_NAME: &str = "product-service";

const REORDER_LEVEL: u32 = 10;
const WAREHOUSES: [&str; 3] = ["WH-EAST", "WH-WEST", "WH-CENTRAL"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: u32,
    pub image_url: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub reserved: u32,
}

impl Record for Product {
    fn id(&self) -> u64 {
        self.id
    }
}

pub fn seed_products() -> Vec<Product> {
    [
        (1, "Laptop Gaming", "High-performance gaming laptop", 1299.99, "Electronics", 15, "laptop"),
        (2, "Smartphone Pro", "Latest flagship smartphone", 899.99, "Electronics", 8, "phone"),
        (3, "Running Shoes", "Comfortable running shoes", 159.99, "Sports", 25, "shoes"),
        (4, "Coffee Maker", "Automatic coffee maker", 299.99, "Home", 12, "coffee"),
        (5, "Wireless Headphones", "Noise-cancelling headphones", 199.99, "Electronics", 20, "headphones"),
        (6, "Yoga Mat", "Premium yoga mat", 49.99, "Sports", 30, "yoga"),
        (7, "Smart Watch", "Fitness tracking smartwatch", 249.99, "Electronics", 5, "watch"),
        (8, "Backpack", "Travel backpack", 79.99, "Travel", 18, "backpack"),
    ]
    .into_iter()
    .map(|(id, name, description, price, category, stock, image)| Product {
        id,
        name: name.to_string(),
        description: description.to_string(),
        price,
        category: category.to_string(),
        stock,
        image_url: format!("https://example.com/{}.jpg", image),
        views: 0,
        reserved: 0,
    })
    .collect()
}

#[derive(Debug, Deserialize)]
struct InventoryRequest {
    quantity: u32,
    #[serde(default)]
    order_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PriceRequest {
    price: f64,
}

pub struct CatalogNode {
    telemetry: Telemetry,
    products: Arc<dyn Repository<Product>>,
}

impl CatalogNode {
    pub fn new(telemetry: Telemetry) -> Self {
        Self::with_products(telemetry, Arc::new(InMemoryTable::seeded("products", seed_products())))
    }

    pub fn with_products(telemetry: Telemetry, products: Arc<dyn Repository<Product>>) -> Self {
        Self { telemetry, products }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/products", get(list_handler))
            .route("/products/search", get(search_handler))
            .route("/products/trending", get(trending_handler))
            .route("/products/favorites/{user_id}", get(favorites_handler))
            .route("/products/category/{category}", get(by_category_handler))
            .route("/products/{id}", get(get_product_handler))
            .route("/products/{id}/view", post(record_view_handler))
            .route("/products/{id}/price", put(update_price_handler))
            .route("/inventory/{id}", get(inventory_handler))
            .route("/inventory/{id}/reserve", post(reserve_handler))
            .route("/inventory/{id}/release", post(release_handler))
            .with_state(self)
    }

    fn not_found() -> ServiceError {
        ServiceError::not_found("product_not_found", "Product not found")
    }

    fn require_product(&self, id: u64) -> Result<Product, ServiceError> {
        self.products.get(id)?.ok_or_else(Self::not_found)
    }

    async fn list(&self, scope: &mut RequestScope) -> Result<Reply, ServiceError> {
        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::internal("database_timeout", "Database query timeout"));
        }

        let products = self.products.list()?;
        scope.record("products.count", "count", products.len());
        Ok(Reply::ok(
            "Products retrieved successfully",
            &json!({ "products": products, "total": products.len(), "cached": false }),
        ))
    }

    async fn get_product(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        scope.record("product.id", "product_id", id);
        let product = self.require_product(id)?;
        scope.attribute("product.name", product.name.as_str());
        Ok(Reply::ok("Product retrieved successfully", &product))
    }

    async fn search(&self, scope: &mut RequestScope, params: &HashMap<String, String>) -> Result<Reply, ServiceError> {
        let query = params.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
        let category = params.get("category").map(|c| c.to_lowercase()).unwrap_or_default();
        scope.record("search.query", "query", query.as_str());
        scope.record("search.category", "category", category.as_str());

        scope.simulate_latency().await;

        let products = self.products.find(&|p| {
            let text_match = query.is_empty()
                || p.name.to_lowercase().contains(&query)
                || p.description.to_lowercase().contains(&query);
            let category_match = category.is_empty() || p.category.to_lowercase() == category;
            text_match && category_match
        })?;

        scope.record("search.results", "results", products.len());
        Ok(Reply::ok(
            "Product search completed",
            &json!({ "products": products, "total": products.len() }),
        ))
    }

    async fn favorites(&self, scope: &mut RequestScope, raw_user: &str) -> Result<Reply, ServiceError> {
        let user_id = parse_id(raw_user, "invalid_user_id", "user")?;
        scope.record("user.id", "user_id", user_id);
        scope.simulate_latency().await;

        let all = self.products.list()?;
        let favorites: Vec<Product> = {
            let mut rng = rand::thread_rng();
            let count = rng.gen_range(1..=4).min(all.len());
            all.choose_multiple(&mut rng, count).cloned().collect()
        };

        scope.record("favorites.count", "favorites_count", favorites.len());
        Ok(Reply::ok(
            "User favorites retrieved successfully",
            &json!({ "user_id": user_id, "favorites": favorites, "total": favorites.len() }),
        ))
    }

    async fn inventory(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        scope.record("product.id", "product_id", id);
        scope.simulate_latency().await;

        let product = self.require_product(id)?;
        let warehouse = WAREHOUSES.choose(&mut rand::thread_rng()).copied().unwrap_or(WAREHOUSES[0]);

        scope.record("inventory.available", "available", product.stock);
        Ok(Reply::ok(
            "Inventory retrieved successfully",
            &json!({
                "product_id": product.id,
                "available": product.stock,
                "reserved": product.reserved,
                "reorder_level": REORDER_LEVEL,
                "warehouse": warehouse,
            }),
        ))
    }

    async fn reserve(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        let req: InventoryRequest = parse_body(body)?;
        scope.record("product.id", "product_id", id);
        scope.record("inventory.quantity", "quantity", req.quantity);
        if let Some(order_id) = req.order_id {
            scope.record("order.id", "order_id", order_id);
        }

        if req.quantity == 0 {
            return Err(ServiceError::invalid_input("invalid_quantity", "Quantity must be positive"));
        }

        let quantity = req.quantity;
        let product = self.products.try_update(id, Self::not_found(), &mut |p| {
            if p.stock < quantity {
                return Err(ServiceError::conflict(
                    "insufficient_stock",
                    format!("Insufficient stock: {} available, {} requested", p.stock, quantity),
                ));
            }
            let reserved = p.reserved.checked_add(quantity).ok_or_else(|| {
                ServiceError::conflict("reservation_overflow", "Reserved quantity out of range")
            })?;
            p.stock -= quantity;
            p.reserved = reserved;
            Ok(())
        })?;

        let reservation_id = format!("RES-{}-{}", product.id, req.order_id.unwrap_or(0));
        scope.record("inventory.remaining", "remaining", product.stock);
        Ok(Reply::ok(
            "Inventory reserved successfully",
            &json!({
                "product_id": product.id,
                "reserved_quantity": quantity,
                "remaining_stock": product.stock,
                "reservation_id": reservation_id,
            }),
        ))
    }

    async fn release(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        let req: InventoryRequest = parse_body(body)?;
        scope.record("product.id", "product_id", id);
        scope.record("inventory.quantity", "quantity", req.quantity);
        if let Some(order_id) = req.order_id {
            scope.record("order.id", "order_id", order_id);
        }

        if req.quantity == 0 {
            return Err(ServiceError::invalid_input("invalid_quantity", "Quantity must be positive"));
        }

        let quantity = req.quantity;
        let product = self.products.try_update(id, Self::not_found(), &mut |p| {
            if quantity > p.reserved {
                return Err(ServiceError::conflict(
                    "release_exceeds_reserved",
                    format!("Cannot release {}: only {} reserved", quantity, p.reserved),
                ));
            }
            p.stock = p.stock.checked_add(quantity).ok_or_else(|| {
                ServiceError::conflict("stock_overflow", "Stock quantity out of range")
            })?;
            p.reserved -= quantity;
            Ok(())
        })?;

        Ok(Reply::ok(
            "Inventory released successfully",
            &json!({
                "product_id": product.id,
                "released_quantity": quantity,
                "available": product.stock,
            }),
        ))
    }

    async fn trending(&self, scope: &mut RequestScope) -> Result<Reply, ServiceError> {
        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::upstream_unavailable(
                "analytics_calculation_failed",
                "Trending products temporarily unavailable",
            ));
        }

        let mut products = self.products.list()?;
        products.sort_by(|a, b| b.views.cmp(&a.views).then(a.id.cmp(&b.id)));
        products.truncate(5);

        let trending: Vec<_> = products
            .iter()
            .enumerate()
            .map(|(rank, p)| json!({ "rank": rank + 1, "product": p, "views": p.views }))
            .collect();

        scope.record("trending.count", "count", trending.len());
        Ok(Reply::ok(
            "Trending products calculated",
            &json!({ "trending": trending, "total": trending.len() }),
        ))
    }

    async fn record_view(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        scope.record("product.id", "product_id", id);
        self.require_product(id)?;

        if scope.injected_failure() {
            scope.record("error", "error", "analytics_service_unavailable");
            return Ok(Reply::new(
                StatusCode::ACCEPTED,
                "View recorded offline",
                &json!({ "product_id": id, "recorded": false }),
            )
            .degraded());
        }

        let product = self.products.try_update(id, Self::not_found(), &mut |p| {
            p.views += 1;
            Ok(())
        })?;

        scope.record("product.views", "views", product.views);
        Ok(Reply::ok(
            "Product view recorded",
            &json!({ "product_id": id, "recorded": true, "views": product.views }),
        ))
    }

    async fn by_category(&self, scope: &mut RequestScope, category: &str) -> Result<Reply, ServiceError> {
        scope.record("product.category", "category", category);
        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::internal(
                "category_index_corruption",
                "Category index corrupted",
            ));
        }

        let wanted = category.to_lowercase();
        let products = self.products.find(&|p| p.category.to_lowercase() == wanted)?;

        scope.record("products.count", "count", products.len());
        Ok(Reply::ok(
            "Category products retrieved",
            &json!({ "category": category, "products": products, "total": products.len() }),
        ))
    }

    async fn update_price(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_product_id", "product")?;
        let req: PriceRequest = parse_body(body)?;
        scope.record("product.id", "product_id", id);

        if !req.price.is_finite() || req.price <= 0.0 {
            return Err(ServiceError::invalid_input("invalid_price", "Price must be a positive number"));
        }
        scope.record("product.new_price", "new_price", req.price);

        if scope.injected_failure() {
            return Err(ServiceError::unprocessable(
                "pricing_policy_violation",
                "Price change violates pricing policy",
            ));
        }

        let mut old_price = 0.0;
        let product = self.products.try_update(id, Self::not_found(), &mut |p| {
            old_price = p.price;
            p.price = req.price;
            Ok(())
        })?;

        scope.record("product.old_price", "old_price", old_price);
        Ok(Reply::ok(
            "Product price updated",
            &json!({ "product_id": product.id, "old_price": old_price, "new_price": product.price }),
        ))
    }
}

type NodeState = State<Arc<CatalogNode>>;

async fn list_handler(State(node): NodeState, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_products", "/products", "list_products");
    let result = node.list(&mut scope).await;
    scope.respond(result)
}

async fn get_product_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_product", "/products/{id}", "get_product");
    let result = node.get_product(&mut scope, &id).await;
    scope.respond(result)
}

async fn search_handler(
    State(node): NodeState,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "search_products", "/products/search", "search_products");
    let result = node.search(&mut scope, &params).await;
    scope.respond(result)
}

async fn favorites_handler(State(node): NodeState, Path(user_id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "get_user_favorites",
        "/products/favorites/{user_id}",
        "product_favorites",
    );
    let result = node.favorites(&mut scope, &user_id).await;
    scope.respond(result)
}

async fn inventory_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "get_inventory", "/inventory/{id}", "get_inventory");
    let result = node.inventory(&mut scope, &id).await;
    scope.respond(result)
}

async fn reserve_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "reserve_inventory",
        "/inventory/{id}/reserve",
        "reserve_inventory",
    );
    let result = node.reserve(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn release_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "release_inventory",
        "/inventory/{id}/release",
        "release_inventory",
    );
    let result = node.release(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn trending_handler(State(node): NodeState, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "get_trending_products", "/products/trending", "trending");
    let result = node.trending(&mut scope).await;
    scope.respond(result)
}

async fn record_view_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "record_product_view",
        "/products/{id}/view",
        "record_view",
    );
    let result = node.record_view(&mut scope, &id).await;
    scope.respond(result)
}

async fn by_category_handler(State(node): NodeState, Path(category): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "get_products_by_category",
        "/products/category/{category}",
        "by_category",
    );
    let result = node.by_category(&mut scope, &category).await;
    scope.respond(result)
}

async fn update_price_handler(
    State(node): NodeState,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "update_product_price",
        "/products/{id}/price",
        "update_price",
    );
    let result = node.update_price(&mut scope, &id, &body).await;
    scope.respond(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::ChaosPolicy;
    use crate::config::{ChaosConfig, ChaosMode};
    use crate::observability::logging::{CorrelatedLogger, LogLevel, MemoryWriter};
    use crate::observability::sink::MemorySink;
    use crate::observability::span::SpanRecorder;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn node_with(chaos: ChaosPolicy) -> (Arc<CatalogNode>, Arc<MemoryWriter>) {
        let writer = Arc::new(MemoryWriter::new());
        let telemetry = Telemetry::new(
            SpanRecorder::new(SERVICE_NAME, Arc::new(MemorySink::new())),
            CorrelatedLogger::new(SERVICE_NAME, writer.clone()),
            Arc::new(chaos),
        );
        (Arc::new(CatalogNode::new(telemetry)), writer)
    }

    fn node() -> Arc<CatalogNode> {
        node_with(ChaosPolicy::disabled()).0
    }

    async fn send(node: &Arc<CatalogNode>, request: Request<Body>) -> (StatusCode, Value) {
        let response = node.clone().router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 256 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let node = node();
        let (status, body) = send(&node, get("/products")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 8);

        let (status, body) = send(&node, get("/products/7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Smart Watch");

        let (status, body) = send(&node, get("/products/99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "product_not_found");
    }

    #[tokio::test]
    async fn test_search_by_text_and_category() {
        let node = node();
        let (_, body) = send(&node, get("/products/search?q=yoga")).await;
        assert_eq!(body["total"], 1);

        let (_, body) = send(&node, get("/products/search?category=electronics")).await;
        assert_eq!(body["total"], 4);

        let (_, body) = send(&node, get("/products/category/Sports")).await;
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn test_reserve_over_stock_is_conflict_and_stock_unchanged() {
        let node = node();
        let (status, body) = send(&node, post("/inventory/7/reserve", json!({"quantity": 6, "order_id": 1}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "insufficient_stock");

        let (_, inventory) = send(&node, get("/inventory/7")).await;
        assert_eq!(inventory["available"], 5);
        assert_eq!(inventory["reserved"], 0);
    }

    #[tokio::test]
    async fn test_reserve_then_release() {
        let node = node();
        let (status, body) = send(&node, post("/inventory/2/reserve", json!({"quantity": 3, "order_id": 12}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining_stock"], 5);
        assert_eq!(body["reservation_id"], "RES-2-12");

        let (status, body) = send(&node, post("/inventory/2/release", json!({"quantity": 3}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], 8);
    }

    #[tokio::test]
    async fn test_oversized_release_rejected_and_catalog_keeps_serving() {
        let node = node();
        let (status, body) = send(&node, post("/inventory/2/release", json!({"quantity": u32::MAX}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "release_exceeds_reserved");

        let (status, body) = send(&node, get("/products/2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stock"], 8);
    }

    #[tokio::test]
    async fn test_release_limited_to_reserved() {
        let node = node();
        let (status, _) = send(&node, post("/inventory/1/reserve", json!({"quantity": 2}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&node, post("/inventory/1/release", json!({"quantity": 3}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "release_exceeds_reserved");

        let (_, inventory) = send(&node, get("/inventory/1")).await;
        assert_eq!(inventory["available"], 13);
        assert_eq!(inventory["reserved"], 2);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let node = node();
        let (status, body) = send(&node, post("/inventory/1/reserve", json!({"quantity": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_quantity");
    }

    #[tokio::test]
    async fn test_views_drive_trending() {
        let node = node();
        for _ in 0..3 {
            let (status, _) = send(&node, post("/products/6/view", json!({}))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(&node, get("/products/trending")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trending"][0]["product"]["id"], 6);
        assert_eq!(body["trending"][0]["views"], 3);
    }

    #[tokio::test]
    async fn test_view_degrades_under_forced_failure() {
        let chaos = ChaosPolicy::from_config(&ChaosConfig {
            mode: ChaosMode::AlwaysFail,
            ..ChaosConfig::default()
        });
        let (node, writer) = node_with(chaos);
        let (status, body) = send(&node, post("/products/1/view", json!({}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["recorded"], false);

        let records = writer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warn);
        assert_eq!(records[0].field("error").unwrap(), "analytics_service_unavailable");
    }

    #[tokio::test]
    async fn test_price_validation() {
        let node = node();
        let request = Request::put("/products/3/price")
            .header("content-type", "application/json")
            .body(Body::from(json!({"price": -1.0}).to_string()))
            .unwrap();
        let (status, _) = send(&node, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::put("/products/3/price")
            .header("content-type", "application/json")
            .body(Body::from(json!({"price": 149.99}).to_string()))
            .unwrap();
        let (status, body) = send(&node, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["old_price"], 159.99);
    }
}
