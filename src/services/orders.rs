//! Order-aggregator node: orders, payments and order analytics.
//!
//! # Data Flow
//! ```text
//! POST /orders
//!     → identity  GET  /users/{id}               (required, once)
//!     → catalog   GET  /products/{id}            (required, once per item)
//!     → catalog   POST /inventory/{id}/reserve   (required, once per item)
//!         ↳ on failure: POST /inventory/{id}/release for items already reserved
//!     → store the order as pending
//! ```
//!
//! # Design Decisions
//! - The order id is allocated before reserving so reservations carry it
//! - An order is only written once every reservation has succeeded
//! - Inventory release on cancel is best-effort; a failed release degrades
//!   the reply instead of failing the cancellation

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::http::{parse_body, parse_id, PeerClient, PeerError, Reply, RequestScope, Telemetry};
use crate::observability::span::SpanGuard;
use crate::store::{InMemoryTable, Record, Repository};

pub const SERVICE_NAME: &str = "order-service";

const CARRIERS: [&str; 4] = ["UPS", "FedEx", "DHL", "USPS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Stage reported by the tracking endpoint.
    fn tracking_stage(self) -> &'static str {
        match self {
            OrderStatus::Pending => "order_confirmed",
            OrderStatus::Paid => "processing",
            OrderStatus::Shipped => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ServiceError::invalid_input(
                "invalid_status",
                format!("Invalid order status: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: u64,
    pub quantity: u32,
    pub price: f64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub user_id: u64,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

impl Record for Order {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Payment of one order, keyed by the order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: u64,
    pub amount: f64,
    pub status: String,
    pub payment_method: String,
    pub processed_at: DateTime<Utc>,
}

impl Record for Payment {
    fn id(&self) -> u64 {
        self.order_id
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    user_id: u64,
    items: Vec<RequestedItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct RequestedItem {
    product_id: u64,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    #[serde(default = "default_payment_method")]
    payment_method: String,
}

fn default_payment_method() -> String {
    "credit_card".to_string()
}

#[derive(Debug, Deserialize)]
struct RefundRequest {
    amount: f64,
    #[serde(default)]
    reason: String,
}

/// The part of a catalog product an order line needs.
#[derive(Debug, Deserialize)]
struct ProductDetails {
    id: u64,
    name: String,
    price: f64,
}

pub struct OrdersNode {
    telemetry: Telemetry,
    orders: Arc<dyn Repository<Order>>,
    payments: Arc<dyn Repository<Payment>>,
    identity: PeerClient,
    catalog: PeerClient,
}

impl OrdersNode {
    pub fn new(telemetry: Telemetry, identity: PeerClient, catalog: PeerClient) -> Self {
        Self::with_tables(
            telemetry,
            identity,
            catalog,
            Arc::new(InMemoryTable::new("orders")),
            Arc::new(InMemoryTable::new("payments")),
        )
    }

    pub fn with_tables(
        telemetry: Telemetry,
        identity: PeerClient,
        catalog: PeerClient,
        orders: Arc<dyn Repository<Order>>,
        payments: Arc<dyn Repository<Payment>>,
    ) -> Self {
        Self {
            telemetry,
            orders,
            payments,
            identity,
            catalog,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/orders", post(create_handler).get(list_handler))
            .route("/orders/user/{user_id}", get(user_orders_handler))
            .route("/orders/{id}", get(get_order_handler))
            .route("/orders/{id}/status", put(update_status_handler))
            .route("/orders/{id}/cancel", post(cancel_handler))
            .route("/orders/{id}/tracking", get(tracking_handler))
            .route("/orders/{id}/refund", post(refund_handler))
            .route("/payments/{id}", post(payment_handler).get(get_payment_handler))
            .route("/analytics/orders", get(analytics_handler))
            .with_state(self)
    }

    fn not_found() -> ServiceError {
        ServiceError::not_found("order_not_found", "Order not found")
    }

    fn require_order(&self, id: u64) -> Result<Order, ServiceError> {
        self.orders.get(id)?.ok_or_else(Self::not_found)
    }

    async fn create(&self, scope: &mut RequestScope, body: &Bytes) -> Result<Reply, ServiceError> {
        let req: CreateOrderRequest = parse_body(body)?;
        scope.record("user.id", "user_id", req.user_id);
        scope.record("order.items_count", "items_count", req.items.len());

        // 1. Validate input
        if req.items.is_empty() {
            return Err(ServiceError::invalid_input("empty_order", "Order must contain at least one item"));
        }
        if req.items.iter().any(|item| item.quantity == 0) {
            return Err(ServiceError::invalid_input("invalid_quantity", "Quantity must be positive"));
        }

        // 2. The user must exist
        self.identity
            .get::<Value>(scope.span(), "validate_user_call", &format!("/users/{}", req.user_id))
            .await
            .map_err(|e| match e.status() {
                Some(404) => ServiceError::invalid_input("user_validation_failed", "User validation failed"),
                _ => e.unavailable("user_service_unavailable"),
            })?;

        // 3. One price lookup per line item
        let mut lines = Vec::with_capacity(req.items.len());
        for item in &req.items {
            let product: ProductDetails = self
                .catalog
                .get(
                    scope.span(),
                    "get_product_details_call",
                    &format!("/products/{}", item.product_id),
                )
                .await
                .map_err(|e| match e.status() {
                    Some(404) => ServiceError::invalid_input(
                        "product_fetch_failed",
                        format!("Failed to fetch product {}", item.product_id),
                    ),
                    _ => e.unavailable("product_service_unavailable"),
                })?;
            lines.push(OrderItem {
                product_id: product.id,
                quantity: item.quantity,
                price: product.price,
                name: product.name,
            });
        }

        let order_id = self.orders.next_id();
        scope.record("order.id", "order_id", order_id);

        // 4. Reserve every line; undo earlier reservations on failure
        for (index, line) in lines.iter().enumerate() {
            if let Err(e) = self.reserve(scope.span(), order_id, line).await {
                self.release_all(scope.span(), order_id, &lines[..index]).await;
                return Err(match e {
                    PeerError::Status { .. } => ServiceError::conflict(
                        "inventory_reservation_failed",
                        format!("Inventory reservation failed for product {}", line.product_id),
                    ),
                    other => other.unavailable("product_service_unavailable"),
                });
            }
        }

        // 5. Persist
        let total: f64 = lines.iter().map(|l| l.price * f64::from(l.quantity)).sum();
        let now = Utc::now();
        let order = self.orders.insert(Order {
            id: order_id,
            user_id: req.user_id,
            items: lines,
            status: OrderStatus::Pending,
            total,
            created_at: now,
            updated_at: now,
            payment_id: None,
        })?;

        scope.record("order.total", "total", order.total);
        Ok(Reply::created("Order created successfully", &order))
    }

    async fn reserve(&self, parent: &SpanGuard, order_id: u64, line: &OrderItem) -> Result<Value, PeerError> {
        self.catalog
            .post(
                parent,
                "reserve_inventory_call",
                &format!("/inventory/{}/reserve", line.product_id),
                json!({ "quantity": line.quantity, "order_id": order_id }),
            )
            .await
    }

    /// Release `lines`; returns whether every release succeeded.
    async fn release_all(&self, parent: &SpanGuard, order_id: u64, lines: &[OrderItem]) -> bool {
        let mut released = true;
        for line in lines {
            let result: Result<Value, PeerError> = self
                .catalog
                .post(
                    parent,
                    "release_inventory_call",
                    &format!("/inventory/{}/release", line.product_id),
                    json!({ "quantity": line.quantity, "order_id": order_id }),
                )
                .await;
            if let Err(e) = result {
                tracing::warn!(order_id, product_id = line.product_id, error = %e, "Inventory release failed");
                released = false;
            }
        }
        released
    }

    async fn get_order(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_order_id", "order")?;
        scope.record("order.id", "order_id", id);
        let order = self.require_order(id)?;
        scope.record("order.status", "order_status", order.status.as_str());
        Ok(Reply::ok("Order retrieved successfully", &order))
    }

    async fn update_status(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_order_id", "order")?;
        let req: StatusRequest = parse_body(body)?;
        scope.record("order.id", "order_id", id);
        let status: OrderStatus = req.status.parse()?;
        scope.record("order.new_status", "new_status", status.as_str());

        let mut previous = OrderStatus::Pending;
        let order = self.orders.try_update(id, Self::not_found(), &mut |order| {
            if order.status == OrderStatus::Cancelled && status != OrderStatus::Cancelled {
                return Err(ServiceError::conflict(
                    "order_cancelled",
                    "Cancelled orders cannot change status",
                ));
            }
            previous = order.status;
            order.status = status;
            order.updated_at = Utc::now();
            Ok(())
        })?;

        scope.record("order.old_status", "old_status", previous.as_str());
        Ok(Reply::ok("Order status updated successfully", &order))
    }

    async fn user_orders(&self, scope: &mut RequestScope, raw_user: &str) -> Result<Reply, ServiceError> {
        let user_id = parse_id(raw_user, "invalid_user_id", "user")?;
        scope.record("user.id", "user_id", user_id);

        let orders = self.orders.find(&|o| o.user_id == user_id)?;
        scope.record("orders.count", "orders_count", orders.len());
        Ok(Reply::ok(
            "User orders retrieved successfully",
            &json!({ "user_id": user_id, "orders": orders, "total": orders.len() }),
        ))
    }

    async fn list(&self, scope: &mut RequestScope, params: &HashMap<String, String>) -> Result<Reply, ServiceError> {
        let filter = params.get("status").map(|s| s.parse::<OrderStatus>()).transpose()?;
        if let Some(status) = filter {
            scope.record("order.status", "status_filter", status.as_str());
        }

        let orders = self.orders.find(&|o| filter.map_or(true, |s| o.status == s))?;
        scope.record("orders.count", "orders_count", orders.len());
        Ok(Reply::ok(
            "Orders retrieved successfully",
            &json!({ "orders": orders, "total": orders.len() }),
        ))
    }

    async fn process_payment(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let order_id = parse_id(raw_id, "invalid_order_id", "order")?;
        let req: PaymentRequest = parse_body(body)?;
        scope.record("order.id", "order_id", order_id);
        scope.record("payment.method", "payment_method", req.payment_method.as_str());

        let order = self.require_order(order_id)?;
        scope.record("payment.amount", "amount", order.total);

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::payment_required(
                "payment_gateway_declined",
                "Payment processing failed",
            ));
        }

        let now = Utc::now();
        let payment_id = format!("PAY-{}-{}", order_id, now.timestamp());
        let order = self.orders.try_update(order_id, Self::not_found(), &mut |order| {
            if order.status != OrderStatus::Pending {
                return Err(ServiceError::conflict(
                    "order_not_payable",
                    format!("Order is {}, only pending orders can be paid", order.status),
                ));
            }
            order.status = OrderStatus::Paid;
            order.payment_id = Some(payment_id.clone());
            order.updated_at = now;
            Ok(())
        })?;

        let payment = self.payments.insert(Payment {
            id: payment_id,
            order_id,
            amount: order.total,
            status: "completed".to_string(),
            payment_method: req.payment_method,
            processed_at: now,
        })?;

        scope.record("payment.id", "payment_id", payment.id.as_str());
        Ok(Reply::ok("Payment processed successfully", &payment))
    }

    async fn get_payment(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let order_id = parse_id(raw_id, "invalid_order_id", "order")?;
        scope.record("order.id", "order_id", order_id);
        let payment = self
            .payments
            .get(order_id)?
            .ok_or_else(|| ServiceError::not_found("payment_not_found", "Payment not found"))?;
        scope.record("payment.id", "payment_id", payment.id.as_str());
        Ok(Reply::ok("Payment retrieved successfully", &payment))
    }

    async fn cancel(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_order_id", "order")?;
        scope.record("order.id", "order_id", id);

        if scope.injected_failure() {
            return Err(ServiceError::conflict(
                "order_already_shipped",
                "Order cancellation failed - order already shipped",
            ));
        }

        let order = self.orders.try_update(id, Self::not_found(), &mut |order| match order.status {
            OrderStatus::Shipped | OrderStatus::Delivered => Err(ServiceError::conflict(
                "cancellation_not_allowed",
                format!("Cannot cancel {} order", order.status),
            )),
            OrderStatus::Cancelled => Err(ServiceError::conflict(
                "order_already_cancelled",
                "Order is already cancelled",
            )),
            OrderStatus::Pending | OrderStatus::Paid => {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
                Ok(())
            }
        })?;

        scope.record("user.id", "user_id", order.user_id);
        let released = self.release_all(scope.span(), order.id, &order.items).await;
        scope.record("inventory.released", "inventory_released", released);

        let body = json!({
            "order_id": order.id,
            "status": order.status,
            "cancelled_at": order.updated_at,
            "inventory_released": released,
        });
        if released {
            Ok(Reply::ok("Order cancelled successfully", &body))
        } else {
            Ok(Reply::ok("Order cancelled, inventory release pending", &body).degraded())
        }
    }

    async fn tracking(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_order_id", "order")?;
        scope.record("order.id", "order_id", id);
        let order = self.require_order(id)?;

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::upstream_unavailable(
                "external_tracking_api_timeout",
                "Tracking service temporarily unavailable",
            ));
        }

        let stage = order.status.tracking_stage();
        let (days, suffix, carrier) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(1..=5),
                rng.gen_range(0..10_000),
                CARRIERS.choose(&mut rng).copied().unwrap_or(CARRIERS[0]),
            )
        };

        scope.record("tracking.status", "current_status", stage);
        Ok(Reply::ok(
            "Order tracking retrieved successfully",
            &json!({
                "order_id": id,
                "current_status": stage,
                "estimated_delivery": Utc::now() + ChronoDuration::days(days),
                "tracking_number": format!("TRK-{}-{}", id, suffix),
                "carrier": carrier,
            }),
        ))
    }

    async fn refund(&self, scope: &mut RequestScope, raw_id: &str, body: &Bytes) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_order_id", "order")?;
        let req: RefundRequest = parse_body(body)?;
        scope.record("order.id", "order_id", id);
        scope.record("refund.amount", "amount", req.amount);

        let order = self.require_order(id)?;
        if !req.amount.is_finite() || req.amount <= 0.0 || req.amount > order.total {
            return Err(ServiceError::invalid_input(
                "invalid_amount",
                format!("Refund amount must be between 0 and {:.2}", order.total),
            ));
        }

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::payment_required(
                "payment_gateway_declined",
                "Refund processing failed - payment gateway declined",
            ));
        }

        let refund_id = format!("REF-{}-{}", id, Utc::now().timestamp());
        scope.record("refund.id", "refund_id", refund_id.as_str());
        Ok(Reply::ok(
            "Refund processed successfully",
            &json!({
                "refund_id": refund_id,
                "order_id": id,
                "amount": req.amount,
                "reason": req.reason,
                "status": "processed",
            }),
        ))
    }

    async fn analytics(&self, scope: &mut RequestScope) -> Result<Reply, ServiceError> {
        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::upstream_unavailable(
                "data_aggregation_timeout",
                "Analytics service unavailable",
            ));
        }

        let orders = self.orders.list()?;
        let payments = self.payments.list()?;
        let report = OrderAnalytics::from_records(&orders, &payments);

        scope.record("analytics.total_orders", "total_orders", report.total_orders);
        scope.record("analytics.revenue", "revenue", report.revenue);
        Ok(Reply::ok("Order analytics calculated successfully", &report))
    }
}

/// Aggregates over the current order and payment tables.
#[derive(Debug, Serialize)]
struct OrderAnalytics {
    total_orders: usize,
    revenue: f64,
    avg_order_value: f64,
    orders_by_status: BTreeMap<OrderStatus, usize>,
    payment_methods: BTreeMap<String, usize>,
    top_products: Vec<Value>,
}

impl OrderAnalytics {
    fn from_records(orders: &[Order], payments: &[Payment]) -> Self {
        let mut orders_by_status = BTreeMap::new();
        let mut quantities: BTreeMap<(u64, String), u64> = BTreeMap::new();
        let mut revenue = 0.0;
        let mut billed = 0usize;

        for order in orders {
            *orders_by_status.entry(order.status).or_insert(0) += 1;
            if matches!(order.status, OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered) {
                revenue += order.total;
                billed += 1;
            }
            for item in &order.items {
                *quantities.entry((item.product_id, item.name.clone())).or_insert(0) += u64::from(item.quantity);
            }
        }

        let mut payment_methods = BTreeMap::new();
        for payment in payments {
            *payment_methods.entry(payment.payment_method.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<_> = quantities.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let top_products = ranked
            .into_iter()
            .take(3)
            .map(|((product_id, name), quantity)| json!({ "product_id": product_id, "name": name, "quantity": quantity }))
            .collect();

        Self {
            total_orders: orders.len(),
            revenue,
            avg_order_value: if billed == 0 { 0.0 } else { revenue / billed as f64 },
            orders_by_status,
            payment_methods,
            top_products,
        }
    }
}

type NodeState = State<Arc<OrdersNode>>;

async fn create_handler(State(node): NodeState, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "create_order", "/orders", "create_order");
    let result = node.create(&mut scope, &body).await;
    scope.respond(result)
}

async fn list_handler(
    State(node): NodeState,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_all_orders", "/orders", "list_orders");
    let result = node.list(&mut scope, &params).await;
    scope.respond(result)
}

async fn get_order_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_order", "/orders/{id}", "get_order");
    let result = node.get_order(&mut scope, &id).await;
    scope.respond(result)
}

async fn update_status_handler(
    State(node): NodeState,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "update_order_status",
        "/orders/{id}/status",
        "update_status",
    );
    let result = node.update_status(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn user_orders_handler(State(node): NodeState, Path(user_id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "get_user_orders",
        "/orders/user/{user_id}",
        "user_orders",
    );
    let result = node.user_orders(&mut scope, &user_id).await;
    scope.respond(result)
}

async fn payment_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "process_payment", "/payments/{id}", "process_payment");
    let result = node.process_payment(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn get_payment_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_payment", "/payments/{id}", "get_payment");
    let result = node.get_payment(&mut scope, &id).await;
    scope.respond(result)
}

async fn cancel_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "cancel_order", "/orders/{id}/cancel", "cancel_order");
    let result = node.cancel(&mut scope, &id).await;
    scope.respond(result)
}

async fn tracking_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "get_order_tracking", "/orders/{id}/tracking", "tracking");
    let result = node.tracking(&mut scope, &id).await;
    scope.respond(result)
}

async fn refund_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "process_refund", "/orders/{id}/refund", "refund");
    let result = node.refund(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn analytics_handler(State(node): NodeState, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "get_order_analytics", "/analytics/orders", "analytics");
    let result = node.analytics(&mut scope).await;
    scope.respond(result)
}
