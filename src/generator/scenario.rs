//! Scenario catalogue and loop definitions.
//!
//! A loop is a tick interval plus a weighted set of scenarios; every tick
//! draws one scenario with `WeightedIndex`.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::time::Duration;

use crate::config::GeneratorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    LoginThenProfile,
    Register,
    FetchFavorites,
    BrowseCatalog,
    SearchProducts,
    CategorySearch,
    ProductDetail,
    FullOrder,
    ListOrdersForUser,
    ListAllOrders,
    UpdatePreferences,
    SearchUsers,
    RefreshToken,
    Trending,
    RecordView,
    CategoryBrowse,
    UpdatePrice,
    CancelOrder,
    Tracking,
    Refund,
    Analytics,
    HealthCheck,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Scenario::LoginThenProfile => "login_then_profile",
            Scenario::Register => "register",
            Scenario::FetchFavorites => "fetch_favorites",
            Scenario::BrowseCatalog => "browse_catalog",
            Scenario::SearchProducts => "search_products",
            Scenario::CategorySearch => "category_search",
            Scenario::ProductDetail => "product_detail",
            Scenario::FullOrder => "full_order",
            Scenario::ListOrdersForUser => "list_orders_for_user",
            Scenario::ListAllOrders => "list_all_orders",
            Scenario::UpdatePreferences => "update_preferences",
            Scenario::SearchUsers => "search_users",
            Scenario::RefreshToken => "refresh_token",
            Scenario::Trending => "trending",
            Scenario::RecordView => "record_view",
            Scenario::CategoryBrowse => "category_browse",
            Scenario::UpdatePrice => "update_price",
            Scenario::CancelOrder => "cancel_order",
            Scenario::Tracking => "tracking",
            Scenario::Refund => "refund",
            Scenario::Analytics => "analytics",
            Scenario::HealthCheck => "health_check",
        }
    }
}

/// One independent scenario loop.
#[derive(Debug, Clone)]
pub struct LoopSpec {
    pub name: &'static str,
    pub tick: Duration,
    scenarios: Vec<Scenario>,
    weights: Vec<u32>,
}

impl LoopSpec {
    fn new(name: &'static str, tick_ms: u64, scenarios: &[(Scenario, u32)]) -> Self {
        Self {
            name,
            tick: Duration::from_millis(tick_ms),
            scenarios: scenarios.iter().map(|(s, _)| *s).collect(),
            weights: scenarios.iter().map(|(_, w)| *w).collect(),
        }
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Weighted draw; all-zero weights fall back to the first scenario.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Scenario {
        let index = match WeightedIndex::new(&self.weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => 0,
        };
        self.scenarios[index]
    }
}

/// The built-in loops.
pub fn default_loops() -> Vec<LoopSpec> {
    use Scenario::*;
    vec![
        LoopSpec::new("users", 5_000, &[(LoginThenProfile, 30), (Register, 30), (FetchFavorites, 40)]),
        LoopSpec::new(
            "products",
            4_000,
            &[(BrowseCatalog, 25), (SearchProducts, 25), (CategorySearch, 25), (ProductDetail, 25)],
        ),
        LoopSpec::new("orders", 10_000, &[(FullOrder, 40), (ListOrdersForUser, 30), (ListAllOrders, 30)]),
        LoopSpec::new(
            "advanced-users",
            4_000,
            &[(UpdatePreferences, 1), (SearchUsers, 1), (RefreshToken, 1), (FetchFavorites, 1)],
        ),
        LoopSpec::new(
            "advanced-products",
            3_000,
            &[(Trending, 1), (RecordView, 1), (CategoryBrowse, 1), (UpdatePrice, 1), (SearchProducts, 1)],
        ),
        LoopSpec::new(
            "advanced-orders",
            8_000,
            &[(CancelOrder, 1), (Tracking, 1), (Refund, 1), (Analytics, 1), (ListOrdersForUser, 1)],
        ),
        LoopSpec::new("health", 20_000, &[(HealthCheck, 1)]),
    ]
}

/// Built-in loops with the configured overrides applied.
pub fn resolve_loops(config: &GeneratorConfig) -> Vec<LoopSpec> {
    default_loops()
        .into_iter()
        .filter_map(|mut spec| {
            match config.loops.iter().find(|o| o.name == spec.name) {
                Some(o) if !o.enabled => return None,
                Some(o) => {
                    if let Some(tick_ms) = o.tick_ms {
                        spec.tick = Duration::from_millis(tick_ms);
                    }
                }
                None => {}
            }
            Some(spec)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_loops() {
        let loops = default_loops();
        let names: Vec<_> = loops.iter().map(|l| l.name).collect();
        assert_eq!(
            names,
            vec!["users", "products", "orders", "advanced-users", "advanced-products", "advanced-orders", "health"]
        );
        assert_eq!(loops[2].tick, Duration::from_secs(10));
    }

    #[test]
    fn test_pick_respects_weights() {
        let spec = LoopSpec::new("t", 1000, &[(Scenario::Trending, 0), (Scenario::Analytics, 1)]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(spec.pick(&mut rng), Scenario::Analytics);
        }
    }

    #[test]
    fn test_pick_covers_every_scenario() {
        let spec = &default_loops()[1];
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen: Vec<Scenario> = (0..400).map(|_| spec.pick(&mut rng)).collect();
        seen.sort_by_key(|s| s.name());
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_overrides() {
        let config = GeneratorConfig {
            loops: vec![
                LoopConfig {
                    name: "health".into(),
                    tick_ms: None,
                    enabled: false,
                },
                LoopConfig {
                    name: "orders".into(),
                    tick_ms: Some(50),
                    enabled: true,
                },
            ],
            ..GeneratorConfig::default()
        };
        let loops = resolve_loops(&config);
        assert_eq!(loops.len(), 6);
        assert!(loops.iter().all(|l| l.name != "health"));
        let orders = loops.iter().find(|l| l.name == "orders").unwrap();
        assert_eq!(orders.tick, Duration::from_millis(50));
    }
}
