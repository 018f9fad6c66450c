//! Synthetic workload generator.
//!
//! # Data Flow
//! ```text
//! startup
//!     → HealthProbe polls every node's /health (backoff)
//!     → one supervised task per loop
//!
//! each tick
//!     → fresh root context (sampled by ratio)
//!     → root span "<loop>_workflow"
//!     → scenario calls, each a child client span with injected headers
//!     → root span closed, one log line, counters and metrics updated
//! ```
//!
//! # Design Decisions
//! - Loops never share state besides the counters; a stuck call in one
//!   loop delays only that loop
//! - A failed call is counted and ends the scenario early where later
//!   calls depend on it; it never ends the loop

pub mod scenario;
pub mod stats;

use axum::http::Method;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::{GeneratorConfig, MeshConfig};
use crate::health::active::ProbeTarget;
use crate::health::{HealthProbe, HealthRegistry};
use crate::http::PeerClient;
use crate::lifecycle::Supervisor;
use crate::observability::context::TraceContext;
use crate::observability::logging::CorrelatedLogger;
use crate::observability::metrics;
use crate::observability::span::{SpanGuard, SpanRecorder};

pub use scenario::{default_loops, resolve_loops, LoopSpec, Scenario};
pub use stats::{GeneratorStats, LoopStats, LoopStatsSnapshot};

pub const SERVICE_NAME: &str = "traffic-generator";

const LOGIN_EMAILS: [&str; 5] = [
    "john@example.com",
    "jane@example.com",
    "alice@example.com",
    "customer1@example.com",
    "buyer@example.com",
];
const SEARCH_TERMS: [&str; 7] = ["laptop", "phone", "shoes", "coffee", "headphones", "watch", "backpack"];
const CATEGORIES: [&str; 4] = ["Electronics", "Sports", "Home", "Travel"];
const USER_QUERIES: [&str; 5] = ["john", "jane", "alice", "test", "user"];
const PAYMENT_METHODS: [&str; 3] = ["credit_card", "paypal", "debit_card"];

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub scenario: Scenario,
    pub failed_calls: u32,
}

impl TickOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_calls == 0
    }
}

pub struct Generator {
    identity: PeerClient,
    catalog: PeerClient,
    orders: PeerClient,
    recorder: SpanRecorder,
    logger: CorrelatedLogger,
    config: GeneratorConfig,
    loops: Vec<LoopSpec>,
    stats: Arc<GeneratorStats>,
    health: Arc<HealthRegistry>,
    probe: HealthProbe,
}

impl Generator {
    pub fn new(config: &MeshConfig, recorder: SpanRecorder, logger: CorrelatedLogger) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeouts.generator_request_ms);
        let peers = &config.peers;
        let health = Arc::new(HealthRegistry::default());

        let probe = HealthProbe::new(
            vec![
                ProbeTarget::new(crate::services::identity::SERVICE_NAME, &peers.identity_url),
                ProbeTarget::new(crate::services::catalog::SERVICE_NAME, &peers.catalog_url),
                ProbeTarget::new(crate::services::orders::SERVICE_NAME, &peers.orders_url),
            ],
            health.clone(),
            timeout,
        )?;

        Ok(Self {
            identity: PeerClient::new(crate::services::identity::SERVICE_NAME, &peers.identity_url, timeout)?,
            catalog: PeerClient::new(crate::services::catalog::SERVICE_NAME, &peers.catalog_url, timeout)?,
            orders: PeerClient::new(crate::services::orders::SERVICE_NAME, &peers.orders_url, timeout)?,
            recorder,
            logger,
            config: config.generator.clone(),
            loops: resolve_loops(&config.generator),
            stats: Arc::new(GeneratorStats::new()),
            health,
            probe,
        })
    }

    pub fn loops(&self) -> &[LoopSpec] {
        &self.loops
    }

    pub fn stats(&self) -> &Arc<GeneratorStats> {
        &self.stats
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Block until every node answers `/health`; `false` on shutdown.
    pub async fn wait_until_ready(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        self.probe
            .wait_until_ready(self.config.health_poll_base_ms, self.config.health_poll_max_ms, shutdown)
            .await
    }

    /// Spawn every configured loop under `supervisor`.
    pub fn spawn_loops(self: &Arc<Self>, supervisor: &mut Supervisor) {
        for spec in self.loops.clone() {
            let generator = self.clone();
            supervisor.spawn(format!("generator:{}", spec.name), move |shutdown| generator.run_loop(spec, shutdown));
        }
    }

    pub async fn run_loop(self: Arc<Self>, spec: LoopSpec, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(loop_name = spec.name, tick = ?spec.tick, "Scenario loop starting");
        let mut ticker = interval_at(Instant::now() + spec.tick, spec.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            // A tick in flight is abandoned on shutdown; its spans close on drop.
            tokio::select! {
                _ = self.run_tick(&spec) => {}
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!(loop_name = spec.name, "Scenario loop stopped");
    }

    /// Run one tick of `spec`: draw a scenario and execute it under a new root span.
    pub async fn run_tick(&self, spec: &LoopSpec) -> TickOutcome {
        let (scenario, sampled) = {
            let mut rng = rand::thread_rng();
            let ratio = self.config.sample_ratio.clamp(0.0, 1.0);
            (spec.pick(&mut rng), rng.gen_bool(ratio))
        };
        let loop_stats = self.stats.for_loop(spec.name);
        loop_stats.record_tick();

        let mut root = self
            .recorder
            .start(TraceContext::root_with_sampling(sampled), &format!("{}_workflow", spec.name.replace('-', "_")));
        root.set_attribute("workflow.loop", spec.name);
        root.set_attribute("workflow.type", scenario.name());

        let mut run = Run { root: &root, failed: 0 };
        self.execute(scenario, &mut run).await;
        let failed = run.failed;

        root.set_attribute("workflow.failed_calls", failed);
        if failed > 0 {
            root.set_error(format!("{} call(s) failed", failed));
            loop_stats.record_failed_calls(u64::from(failed));
        } else {
            loop_stats.record_completed();
        }
        metrics::record_scenario(spec.name, scenario.name(), failed == 0);

        let entry = self
            .logger
            .for_span(&root)
            .field("loop", spec.name)
            .field("scenario", scenario.name())
            .field("failed_calls", failed);
        if failed == 0 {
            entry.info("Scenario completed");
        } else {
            entry.warn("Scenario completed with failed calls");
        }
        root.end();

        TickOutcome {
            scenario,
            failed_calls: failed,
        }
    }

    async fn execute(&self, scenario: Scenario, run: &mut Run<'_>) {
        let (user_id, product_id, order_id) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1..=5u64), rng.gen_range(1..=8u64), rng.gen_range(1..=10u64))
        };

        match scenario {
            Scenario::LoginThenProfile => {
                let email = choose(&LOGIN_EMAILS);
                if let Some(login) = self.login(run, email).await {
                    let id = login.get("user_id").and_then(Value::as_u64).unwrap_or(user_id);
                    run.get(&self.identity, "get_user_profile", &format!("/users/{}/profile", id)).await;
                }
            }
            Scenario::Register => {
                let n = rand::thread_rng().gen_range(0..100_000);
                let body = json!({
                    "email": format!("newuser{}@example.com", n),
                    "name": format!("New User {}", n),
                    "password": "password123",
                });
                run.call(&self.identity, "register_request", Method::POST, "/auth/register", Some(body)).await;
            }
            Scenario::FetchFavorites => {
                run.get(&self.identity, "get_user_favorites", &format!("/users/{}/favorites", user_id)).await;
            }
            Scenario::BrowseCatalog => {
                run.get(&self.catalog, "get_all_products", "/products").await;
            }
            Scenario::SearchProducts => {
                let path = format!("/products/search?q={}", choose(&SEARCH_TERMS));
                run.get(&self.catalog, "search_products", &path).await;
            }
            Scenario::CategorySearch => {
                let path = format!("/products/search?category={}", choose(&CATEGORIES));
                run.get(&self.catalog, "search_products", &path).await;
            }
            Scenario::ProductDetail => {
                if run.get(&self.catalog, "get_product", &format!("/products/{}", product_id)).await.is_some() {
                    run.get(&self.catalog, "get_inventory", &format!("/inventory/{}", product_id)).await;
                }
            }
            Scenario::FullOrder => self.full_order(run, (user_id - 1) % 3 + 1).await,
            Scenario::ListOrdersForUser => {
                run.get(&self.orders, "get_user_orders", &format!("/orders/user/{}", user_id)).await;
            }
            Scenario::ListAllOrders => {
                run.get(&self.orders, "get_all_orders", "/orders").await;
            }
            Scenario::UpdatePreferences => {
                let body = preferences_body(&mut rand::thread_rng());
                let path = format!("/users/{}/preferences", user_id.min(3));
                run.call(&self.identity, "update_user_preferences", Method::POST, &path, Some(body)).await;
            }
            Scenario::SearchUsers => {
                let limit = rand::thread_rng().gen_range(5..25);
                let path = format!("/users/search?q={}&limit={}", choose(&USER_QUERIES), limit);
                run.get(&self.identity, "search_users", &path).await;
            }
            Scenario::RefreshToken => {
                let email = LOGIN_EMAILS[(user_id as usize - 1) % 3];
                if let Some(login) = self.login(run, email).await {
                    let token = login.get("refresh_token").cloned().unwrap_or(Value::Null);
                    let body = json!({ "refresh_token": token });
                    run.call(&self.identity, "refresh_user_token", Method::POST, "/auth/refresh", Some(body)).await;
                }
            }
            Scenario::Trending => {
                run.get(&self.catalog, "get_trending_products", "/products/trending").await;
            }
            Scenario::RecordView => {
                let path = format!("/products/{}/view", product_id);
                run.call(&self.catalog, "record_product_view", Method::POST, &path, None).await;
            }
            Scenario::CategoryBrowse => {
                let path = format!("/products/category/{}", choose(&CATEGORIES));
                run.get(&self.catalog, "get_products_by_category", &path).await;
            }
            Scenario::UpdatePrice => {
                let price = (rand::thread_rng().gen_range(10.0..1500.0_f64) * 100.0).round() / 100.0;
                let path = format!("/products/{}/price", product_id);
                run.call(&self.catalog, "update_product_price", Method::PUT, &path, Some(json!({ "price": price })))
                    .await;
            }
            Scenario::CancelOrder => {
                let path = format!("/orders/{}/cancel", order_id);
                run.call(&self.orders, "cancel_order", Method::POST, &path, None).await;
            }
            Scenario::Tracking => {
                run.get(&self.orders, "get_order_tracking", &format!("/orders/{}/tracking", order_id)).await;
            }
            Scenario::Refund => {
                let amount = (rand::thread_rng().gen_range(10.0..100.0_f64) * 100.0).round() / 100.0;
                let body = json!({ "amount": amount, "reason": "customer_request" });
                let path = format!("/orders/{}/refund", order_id);
                run.call(&self.orders, "process_refund", Method::POST, &path, Some(body)).await;
            }
            Scenario::Analytics => {
                run.get(&self.orders, "get_order_analytics", "/analytics/orders").await;
            }
            Scenario::HealthCheck => {
                for client in [&self.identity, &self.catalog, &self.orders] {
                    let healthy = run.get(client, "health_check", "/health").await.is_some();
                    self.health.record(client.peer(), healthy);
                }
            }
        }
    }

    async fn login(&self, run: &mut Run<'_>, email: &str) -> Option<Value> {
        let body = json!({ "email": email, "password": "password123" });
        run.call(&self.identity, "login_request", Method::POST, "/auth/login", Some(body)).await
    }

    /// create → pay → settle → get → mark shipped.
    async fn full_order(&self, run: &mut Run<'_>, user_id: u64) {
        let items: Vec<Value> = {
            let mut rng = rand::thread_rng();
            (0..rng.gen_range(1..=3))
                .map(|_| json!({ "product_id": rng.gen_range(1..=8), "quantity": rng.gen_range(1..=3) }))
                .collect()
        };
        let body = json!({ "user_id": user_id, "items": items });

        let Some(order) = run.call(&self.orders, "create_order", Method::POST, "/orders", Some(body)).await else {
            return;
        };
        let Some(order_id) = order.get("id").and_then(Value::as_u64) else {
            return;
        };

        let payment = json!({ "payment_method": choose(&PAYMENT_METHODS) });
        run.call(&self.orders, "process_payment", Method::POST, &format!("/payments/{}", order_id), Some(payment))
            .await;

        tokio::time::sleep(Duration::from_millis(self.config.order_settle_ms)).await;

        run.get(&self.orders, "get_order", &format!("/orders/{}", order_id)).await;
        let status = json!({ "status": "shipped" });
        run.call(
            &self.orders,
            "update_order_status",
            Method::PUT,
            &format!("/orders/{}/status", order_id),
            Some(status),
        )
        .await;
    }
}

/// A random flat preferences update.
fn preferences_body<R: Rng + ?Sized>(rng: &mut R) -> Value {
    let theme = ["light", "dark"].choose(rng).copied().unwrap_or("light");
    let language = ["en", "es", "fr"].choose(rng).copied().unwrap_or("en");
    json!({
        "notifications": rng.gen_bool(0.5),
        "marketing_emails": rng.gen_bool(0.5),
        "theme": theme,
        "language": language,
    })
}

fn choose(options: &[&'static str]) -> &'static str {
    options.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

/// Calls of one tick, all parented on the root span.
struct Run<'a> {
    root: &'a SpanGuard,
    failed: u32,
}

impl Run<'_> {
    async fn call(
        &mut self,
        client: &PeerClient,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Option<Value> {
        match client.call(self.root, operation, method, path, body).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.failed += 1;
                tracing::debug!(operation, error = %e, "Generator call failed");
                None
            }
        }
    }

    async fn get(&mut self, client: &PeerClient, operation: &str, path: &str) -> Option<Value> {
        self.call(client, operation, Method::GET, path, None).await
    }
}
