//! Background activity simulators.
//!
//! Each node periodically writes uncorrelated log lines describing
//! subsystem events (auth anomalies, cache pressure, payment gateway
//! hiccups). They share the correlated log stream but carry empty trace
//! and span ids.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::observability::logging::{CorrelatedLogger, LogLevel};

/// One simulated subsystem event.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub level: LogLevel,
    pub message: &'static str,
    pub fields: Vec<(&'static str, Value)>,
}

impl ActivityEvent {
    fn new(level: LogLevel, message: &'static str, fields: Vec<(&'static str, Value)>) -> Self {
        Self { level, message, fields }
    }
}

/// Draws the next event; `None` means nothing happened this tick.
pub type ActivitySource = fn(&mut dyn RngCore) -> Option<ActivityEvent>;

fn pick(rng: &mut dyn RngCore, options: &[&'static str]) -> Value {
    Value::from(options.choose(rng).copied().unwrap_or_default())
}

fn count(rng: &mut dyn RngCore, low: u32, high: u32) -> Value {
    Value::from(rng.gen_range(low..high))
}

fn percent(value: f64) -> Value {
    Value::from(format!("{:.1}%", value))
}

fn auth_activity(rng: &mut dyn RngCore) -> Option<ActivityEvent> {
    let roll = rng.gen_range(0..100);
    let event = match roll {
        0..=14 => ActivityEvent::new(
            LogLevel::Error,
            "JWT token verification failed for multiple requests",
            vec![
                ("component", "auth_service".into()),
                ("error", "jwt_verification_failed".into()),
                ("tokens", count(rng, 1, 16)),
                ("user_agent", pick(rng, &["Chrome", "Firefox", "Safari", "Edge"])),
            ],
        ),
        15..=24 => ActivityEvent::new(
            LogLevel::Warn,
            "High number of failed login attempts detected",
            vec![
                ("component", "auth_service".into()),
                ("warning", "high_failed_login_attempts".into()),
                ("attempts", count(rng, 15, 45)),
                ("window", "1min".into()),
                ("source_ip", format!("192.168.1.{}", rng.gen_range(0..255)).into()),
            ],
        ),
        25..=34 => ActivityEvent::new(
            LogLevel::Info,
            "New user registration completed",
            vec![
                ("component", "user_registration".into()),
                ("event", "new_user_registered".into()),
                ("user_count", count(rng, 1000, 1500)),
                ("email_domain", pick(rng, &["gmail.com", "yahoo.com", "outlook.com"])),
            ],
        ),
        35..=54 => ActivityEvent::new(
            LogLevel::Warn,
            "Cleaned up expired user sessions",
            vec![
                ("component", "session_manager".into()),
                ("error", "session_expired".into()),
                ("expired_sessions", count(rng, 5, 25)),
                ("cleanup_duration", format!("{}ms", rng.gen_range(50..250)).into()),
            ],
        ),
        _ => ActivityEvent::new(
            LogLevel::Info,
            "Authentication service running normally",
            vec![
                ("component", "auth_service".into()),
                ("status", "operational".into()),
                ("active_users", count(rng, 100, 300)),
                ("concurrent_sessions", count(rng, 75, 225)),
            ],
        ),
    };
    Some(event)
}

fn catalog_activity(rng: &mut dyn RngCore) -> Option<ActivityEvent> {
    let roll = rng.gen_range(0..100);
    let event = match roll {
        0..=17 => ActivityEvent::new(
            LogLevel::Error,
            "Multiple products below minimum stock threshold",
            vec![
                ("component", "inventory_manager".into()),
                ("error", "low_stock_alert".into()),
                ("products", count(rng, 1, 6)),
                ("threshold", Value::from(5)),
                ("affected_categories", pick(rng, &["Electronics", "Sports", "Home"])),
            ],
        ),
        18..=29 => ActivityEvent::new(
            LogLevel::Warn,
            "Search queries performing slower than expected",
            vec![
                ("component", "search_engine".into()),
                ("warning", "slow_search_queries".into()),
                ("avg_time", format!("{}ms", rng.gen_range(300..1500)).into()),
                ("threshold", "300ms".into()),
            ],
        ),
        30..=44 => ActivityEvent::new(
            LogLevel::Warn,
            "High cache eviction rate detected",
            vec![
                ("component", "cache_layer".into()),
                ("warning", "cache_eviction_rate_high".into()),
                ("evictions", count(rng, 30, 180)),
                ("hit_rate", percent(rng.gen::<f64>() * 20.0 + 70.0)),
            ],
        ),
        45..=59 => ActivityEvent::new(
            LogLevel::Info,
            "Dynamic pricing updates applied",
            vec![
                ("component", "pricing_engine".into()),
                ("event", "dynamic_pricing_update".into()),
                ("products", count(rng, 2, 10)),
                ("trigger", pick(rng, &["demand", "competition", "inventory", "season"])),
            ],
        ),
        60..=74 => ActivityEvent::new(
            LogLevel::Info,
            "Inventory levels synchronized",
            vec![
                ("component", "inventory_sync".into()),
                ("event", "stock_level_updated".into()),
                ("products", count(rng, 5, 20)),
                ("source", pick(rng, &["warehouse", "supplier", "return"])),
            ],
        ),
        _ => ActivityEvent::new(
            LogLevel::Info,
            "Product catalog operating normally",
            vec![
                ("component", "product_catalog".into()),
                ("status", "operational".into()),
                ("search_qps", count(rng, 20, 100)),
            ],
        ),
    };
    Some(event)
}

fn payment_activity(rng: &mut dyn RngCore) -> Option<ActivityEvent> {
    let roll = rng.gen_range(0..100);
    match roll {
        0..=19 => Some(ActivityEvent::new(
            LogLevel::Warn,
            "Payment declines detected",
            vec![
                ("component", "payment_gateway".into()),
                ("event", "payment_declined".into()),
                ("declined_count", count(rng, 2, 10)),
                (
                    "reason",
                    pick(rng, &["insufficient_funds", "expired_card", "fraud_detected", "limit_exceeded"]),
                ),
            ],
        )),
        20..=34 => Some(ActivityEvent::new(
            LogLevel::Info,
            "Payments processed successfully",
            vec![
                ("component", "payment_gateway".into()),
                ("event", "payment_processed".into()),
                ("processed_count", count(rng, 10, 35)),
                ("total_amount", (rng.gen::<f64>() * 15000.0 + 5000.0).into()),
            ],
        )),
        35..=49 => Some(ActivityEvent::new(
            LogLevel::Error,
            "Payment gateway timeout affecting multiple orders",
            vec![
                ("component", "payment_processor".into()),
                ("error", "payment_gateway_timeout".into()),
                ("gateway", pick(rng, &["stripe_api", "paypal_api", "square_api"])),
                ("orders", count(rng, 2, 10)),
            ],
        )),
        _ => None,
    }
}

fn fulfillment_activity(rng: &mut dyn RngCore) -> Option<ActivityEvent> {
    let roll = rng.gen_range(0..100);
    match roll {
        0..=24 => Some(ActivityEvent::new(
            LogLevel::Info,
            "Orders shipped to customers",
            vec![
                ("component", "fulfillment".into()),
                ("event", "orders_shipped".into()),
                ("shipped_count", count(rng, 5, 20)),
                ("carrier", pick(rng, &["ups", "fedex", "usps"])),
            ],
        )),
        25..=39 => Some(ActivityEvent::new(
            LogLevel::Warn,
            "Order processing time exceeding target",
            vec![
                ("component", "order_fulfillment".into()),
                ("warning", "slow_order_processing".into()),
                ("avg_processing", format!("{}ms", rng.gen_range(1000..3000)).into()),
                ("target", "800ms".into()),
            ],
        )),
        40..=49 => Some(ActivityEvent::new(
            LogLevel::Error,
            "Order notification delivery failures",
            vec![
                ("component", "order_notifications".into()),
                ("event", "notification_delivery_failed".into()),
                ("failed_count", count(rng, 3, 15)),
                ("channels", pick(rng, &["email", "sms", "push"])),
            ],
        )),
        _ => None,
    }
}

/// Activity sources for a node, by service name.
pub fn sources_for(service: &str) -> Vec<(&'static str, ActivitySource)> {
    match service {
        "user-service" => vec![("auth", auth_activity as ActivitySource)],
        "product-service" => vec![("catalog", catalog_activity as ActivitySource)],
        "order-service" => vec![
            ("payments", payment_activity as ActivitySource),
            ("fulfillment", fulfillment_activity as ActivitySource),
        ],
        _ => Vec::new(),
    }
}

/// Periodically logs events from one source.
pub struct ActivitySimulator {
    name: &'static str,
    logger: CorrelatedLogger,
    period: Duration,
    source: ActivitySource,
}

impl ActivitySimulator {
    pub fn new(name: &'static str, logger: CorrelatedLogger, period: Duration, source: ActivitySource) -> Self {
        Self {
            name,
            logger,
            period,
            source,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Draw one event and log it. Returns whether a line was written.
    pub fn tick(&self) -> bool {
        let Some(event) = (self.source)(&mut rand::thread_rng()) else {
            return false;
        };
        let fields = event.fields.into_iter().map(|(k, v)| (k.to_string(), v));
        self.logger.uncorrelated().fields(fields).log(event.level, event.message);
        true
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.recv() => {
                    tracing::debug!(simulator = self.name, "Activity simulator stopping");
                    break;
                }
            }
        }
    }
}
