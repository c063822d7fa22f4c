// ═══════════════════════════════════════════════════════════════════
// Service Tests — PortfolioService, HistoryService, MarketService,
// LedgerService
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dca_tracker_core::errors::CoreError;
use dca_tracker_core::models::allocation::{AllocationPlan, AllocationPlanEntry, TargetWeights};
use dca_tracker_core::models::asset::{AssetKey, AssetSpec, AssetUniverse};
use dca_tracker_core::models::ledger::{DepositRecord, Ledger, PurchaseRecord};
use dca_tracker_core::models::price::{ExchangeRate, PricePoint, PriceSnapshot};
use dca_tracker_core::models::settings::Settings;
use dca_tracker_core::providers::market_proxy::MarketProxyProvider;
use dca_tracker_core::providers::traits::MarketDataProvider;
use dca_tracker_core::services::history_service::HistoryService;
use dca_tracker_core::services::ledger_service::LedgerService;
use dca_tracker_core::services::market_service::{align_monthly, MarketService};
use dca_tracker_core::services::portfolio_service::PortfolioService;
use dca_tracker_core::storage::memory::MemoryLedgerStore;
use dca_tracker_core::storage::traits::LedgerStore;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn k(key: &str) -> AssetKey {
    AssetKey::new(key)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// "s" and "g" quoted locally, "btc" quoted in the foreign currency.
fn universe() -> AssetUniverse {
    AssetUniverse::new(vec![
        AssetSpec::local_etf("s", "Stock ETF", "S.KS"),
        AssetSpec::local_etf("g", "Gold ETF", "G.KS"),
        AssetSpec::foreign_fractional("btc", "Bitcoin", "BTC-USD"),
    ])
}

// ═══════════════════════════════════════════════════════════════════
// Mock Provider
// ═══════════════════════════════════════════════════════════════════

/// Serves fixed monthly series and live quotes per symbol.
struct MockMarketProvider {
    name: String,
    series: HashMap<String, Vec<PricePoint>>,
    live: HashMap<String, f64>,
    failing_live: Vec<String>,
    fail_series: bool,
    calls: Arc<AtomicUsize>,
}

impl MockMarketProvider {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            series: HashMap::new(),
            live: HashMap::new(),
            failing_live: Vec::new(),
            fail_series: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_series(mut self, symbol: &str, points: &[(u32, f64)]) -> Self {
        self.series.insert(
            symbol.to_string(),
            points
                .iter()
                .map(|(m, p)| PricePoint {
                    date: d(2025, *m, 1),
                    price: *p,
                })
                .collect(),
        );
        self
    }

    fn with_live(mut self, symbol: &str, price: f64) -> Self {
        self.live.insert(symbol.to_string(), price);
        self
    }

    fn with_failing_live(mut self, symbol: &str) -> Self {
        self.failing_live.push(symbol.to_string());
        self
    }

    fn failing(mut self) -> Self {
        self.fail_series = true;
        self
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_monthly_series(
        &self,
        symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_series {
            return Err(CoreError::Network("connection refused".into()));
        }
        Ok(self.series.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_live_quote(&self, symbol: &str) -> Result<Option<f64>, CoreError> {
        if self.failing_live.iter().any(|s| s == symbol) {
            return Err(CoreError::Api {
                provider: self.name.clone(),
                message: "quote endpoint down".into(),
            });
        }
        Ok(self.live.get(symbol).copied())
    }
}

fn test_settings() -> Settings {
    Settings {
        universe: universe(),
        target_weights: TargetWeights::new().with("s", 60.0).with("g", 30.0).with("btc", 10.0),
        ..Settings::default()
    }
}

/// Three months of data for every symbol.
fn full_provider(name: &str) -> MockMarketProvider {
    MockMarketProvider::new(name)
        .with_series("S.KS", &[(1, 1000.0), (2, 1100.0), (3, 1200.0)])
        .with_series("G.KS", &[(1, 500.0), (2, 510.0), (3, 520.0)])
        .with_series("BTC-USD", &[(1, 40_000.0), (2, 42_000.0), (3, 45_000.0)])
        .with_series("KRW=X", &[(1, 1300.0), (2, 1320.0), (3, 1340.0)])
}

// ═══════════════════════════════════════════════════════════════════
// PortfolioService
// ═══════════════════════════════════════════════════════════════════

mod portfolio_aggregate {
    use super::*;

    fn prices() -> PriceSnapshot {
        PriceSnapshot::new(d(2025, 3, 1), ExchangeRate::new(1300.0))
            .with_price("s", 1200.0)
            .with_price("g", 400.0)
            .with_price("btc", 50_000.0)
    }

    fn deposits() -> Vec<DepositRecord> {
        vec![
            DepositRecord::new(d(2025, 1, 1), 1_000_000.0),
            DepositRecord::new(d(2025, 2, 1), 1_000_000.0),
        ]
    }

    fn purchases() -> Vec<PurchaseRecord> {
        vec![
            PurchaseRecord::new(d(2025, 1, 3), "s", 1000.0, 500.0, 500_000.0),
            PurchaseRecord::new(d(2025, 2, 3), "s", 1100.0, 300.0, 330_000.0),
            PurchaseRecord::new(d(2025, 2, 3), "g", 500.0, 600.0, 300_000.0),
            PurchaseRecord::new(d(2025, 2, 3), "btc", 65_000_000.0, 0.002, 130_000.0),
        ]
    }

    #[test]
    fn cash_balance_is_deposits_minus_spend() {
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &purchases(), &prices());
        assert_eq!(p.total_deposited, 2_000_000.0);
        assert_eq!(p.cash_balance, 2_000_000.0 - 1_260_000.0);
        assert_eq!(p.total_invested, 1_260_000.0);
    }

    #[test]
    fn positions_sum_quantity_and_cost() {
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &purchases(), &prices());
        let s = p.position(&k("s")).unwrap();
        assert_eq!(s.quantity, 800.0);
        assert_eq!(s.cost_basis, 830_000.0);
        assert_close(s.average_price, 1037.5);
        assert_eq!(s.current_value, 960_000.0);
        assert_close(s.return_pct, (960_000.0 / 830_000.0 - 1.0) * 100.0);

        let g = p.position(&k("g")).unwrap();
        assert_eq!(g.current_value, 240_000.0);
        assert_close(g.return_pct, -20.0);
    }

    #[test]
    fn aggregate_is_idempotent() {
        let service = PortfolioService::new();
        // spend exceeds deposits, so cash goes negative
        let deposits = vec![DepositRecord::new(d(2025, 1, 1), 1_000_000.0)];
        let first = service.aggregate(&universe(), &deposits, &purchases(), &prices());
        let second = service.aggregate(&universe(), &deposits, &purchases(), &prices());

        assert!(first.cash_balance < 0.0);
        assert!(first.position(&k("btc")).unwrap().current_value > 0.0);
        assert_eq!(first, second);
    }

    #[test]
    fn foreign_asset_valued_with_exchange_rate() {
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &purchases(), &prices());
        let btc = p.position(&k("btc")).unwrap();
        assert_close(btc.current_value, 0.002 * 50_000.0 * 1300.0);
    }

    #[test]
    fn weights_include_cash_and_sum_to_100() {
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &purchases(), &prices());
        let cash = p.position(&AssetKey::cash()).unwrap();
        assert_eq!(cash.current_value, p.cash_balance);
        let total: f64 = p.positions.values().map(|pos| pos.weight_pct).sum();
        assert_close(total, 100.0);
        assert_close(
            p.total_asset_value,
            960_000.0 + 240_000.0 + 130_000.0 + p.cash_balance,
        );
    }

    #[test]
    fn never_bought_assets_have_zeroed_positions() {
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &[], &prices());
        let g = p.position(&k("g")).unwrap();
        assert_eq!(g.quantity, 0.0);
        assert_eq!(g.average_price, 0.0);
        assert_eq!(g.return_pct, 0.0);
        assert_eq!(p.cash_balance, 2_000_000.0);
        assert_eq!(p.position(&AssetKey::cash()).unwrap().weight_pct, 100.0);
    }

    #[test]
    fn overspend_gives_negative_cash() {
        let p = PortfolioService::new().aggregate(
            &universe(),
            &[DepositRecord::new(d(2025, 1, 1), 100_000.0)],
            &[PurchaseRecord::new(d(2025, 1, 2), "g", 500.0, 400.0, 200_000.0)],
            &prices(),
        );
        assert_eq!(p.cash_balance, -100_000.0);
    }

    #[test]
    fn missing_price_values_position_at_zero() {
        let empty = PriceSnapshot::new(d(2025, 3, 1), ExchangeRate::default());
        let p = PortfolioService::new().aggregate(&universe(), &deposits(), &purchases(), &empty);
        assert_eq!(p.position(&k("s")).unwrap().current_value, 0.0);
        assert_eq!(p.position(&k("s")).unwrap().return_pct, -100.0);
        assert_eq!(p.total_asset_value, p.cash_balance);
    }

    #[test]
    fn empty_ledger_is_all_zero() {
        let p = PortfolioService::new().aggregate(&universe(), &[], &[], &prices());
        assert_eq!(p.total_asset_value, 0.0);
        assert!(p.positions.values().all(|pos| pos.weight_pct == 0.0));
        assert_eq!(p.total_return_pct(), 0.0);
    }

    #[test]
    fn keys_outside_universe_are_aggregated() {
        let p = PortfolioService::new().aggregate(
            &universe(),
            &[],
            &[PurchaseRecord::new(d(2025, 1, 2), "old_fund", 100.0, 10.0, 1000.0)],
            &prices(),
        );
        assert_eq!(p.quantity(&k("old_fund")), 10.0);
    }

    #[test]
    fn output_is_always_finite() {
        let weird = PriceSnapshot::new(d(2025, 3, 1), ExchangeRate::default())
            .with_price("s", f64::INFINITY)
            .with_price("g", f64::NAN);
        let purchases = vec![
            PurchaseRecord::new(d(2025, 1, 3), "s", 0.0, 0.0, 10.0),
            PurchaseRecord::new(d(2025, 1, 3), "g", 0.0, 5.0, 0.0),
        ];
        let p = PortfolioService::new().aggregate(&universe(), &[], &purchases, &weird);
        for pos in p.positions.values() {
            for v in [pos.quantity, pos.cost_basis, pos.average_price, pos.current_value, pos.return_pct, pos.weight_pct] {
                assert!(v.is_finite());
            }
        }
        assert!(p.total_asset_value.is_finite());
    }
}

mod portfolio_analytics {
    use super::*;

    fn portfolio() -> dca_tracker_core::models::portfolio::Portfolio {
        let prices = PriceSnapshot::new(d(2025, 3, 1), ExchangeRate::default())
            .with_price("s", 1000.0)
            .with_price("g", 500.0);
        PortfolioService::new().aggregate(
            &universe(),
            &[DepositRecord::new(d(2025, 1, 1), 1_000_000.0)],
            &[PurchaseRecord::new(d(2025, 1, 3), "s", 1000.0, 600.0, 600_000.0)],
            &prices,
        )
    }

    #[test]
    fn compare_weights_in_universe_order_with_cash_last() {
        let weights = TargetWeights::new().with("s", 60.0).with("g", 30.0).with("cash", 10.0);
        let rows = PortfolioService::new().compare_weights(&universe(), &portfolio(), &weights);

        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["s", "g", "btc", "cash"]);

        assert_eq!(rows[0].target_pct, 60.0);
        assert_eq!(rows[0].current_pct, 60.0);
        assert_eq!(rows[1].current_pct, 0.0);
        assert_eq!(rows[1].deviation_pct(), -30.0);
        assert_eq!(rows[2].target_pct, 0.0);
        assert_eq!(rows[3].target_pct, 10.0);
        assert_eq!(rows[3].current_pct, 40.0);
    }

    #[test]
    fn goals() {
        let service = PortfolioService::new();
        let p = portfolio();

        let g = service.goal_progress(&p, 0.0, 0.0);
        assert_eq!(g.roi_goal_reached, None);
        assert_eq!(g.asset_goal_reached, None);

        let g = service.goal_progress(&p, 10.0, 900_000.0);
        assert_eq!(g.roi_goal_reached, Some(false));
        assert_eq!(g.asset_goal_reached, Some(true));
        assert!(g.any_reached());
        assert_eq!(g.total_asset_value, 1_000_000.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// HistoryService
// ═══════════════════════════════════════════════════════════════════

mod history {
    use super::*;

    fn series() -> Vec<PriceSnapshot> {
        [(1, 1000.0), (2, 1100.0), (3, 900.0)]
            .iter()
            .map(|(m, s)| {
                PriceSnapshot::new(d(2025, *m, 1), ExchangeRate::new(1300.0))
                    .with_price("s", *s)
                    .with_price("btc", 40_000.0)
            })
            .collect()
    }

    fn deposits() -> Vec<DepositRecord> {
        vec![
            DepositRecord::new(d(2025, 1, 1), 1_000_000.0),
            DepositRecord::new(d(2025, 3, 1), 1_000_000.0),
        ]
    }

    fn purchases() -> Vec<PurchaseRecord> {
        vec![
            PurchaseRecord::new(d(2025, 1, 20), "s", 1000.0, 500.0, 500_000.0),
            PurchaseRecord::new(d(2025, 3, 5), "btc", 52_000_000.0, 0.01, 520_000.0),
        ]
    }

    #[test]
    fn one_point_per_snapshot() {
        let points = HistoryService::new().reconstruct(&universe(), &series(), &deposits(), &purchases(), None);
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| !p.is_live));
        assert_eq!(points[0].date, d(2025, 1, 1));
    }

    #[test]
    fn principal_and_investment_per_month() {
        let points = HistoryService::new().reconstruct(&universe(), &series(), &deposits(), &purchases(), None);

        // Jan: 500 s @1000 + 500,000 cash
        assert_eq!(points[0].principal, 1_000_000.0);
        assert_eq!(points[0].investment, 1_000_000.0);
        // Feb: s rose to 1100
        assert_eq!(points[1].principal, 1_000_000.0);
        assert_eq!(points[1].investment, 550_000.0 + 500_000.0);
        // Mar: second deposit, btc bought
        assert_eq!(points[2].principal, 2_000_000.0);
        let btc_value = 0.01 * 40_000.0 * 1300.0;
        assert_close(points[2].investment, 450_000.0 + btc_value + 980_000.0);
    }

    #[test]
    fn per_asset_drill_down() {
        let points = HistoryService::new().reconstruct(&universe(), &series(), &deposits(), &purchases(), None);
        let s = points[1].assets[&k("s")];
        assert_eq!(s.principal, 500_000.0);
        assert_eq!(s.value, 550_000.0);
        let btc_before = points[1].assets[&k("btc")];
        assert_eq!(btc_before.principal, 0.0);
        let btc_after = points[2].assets[&k("btc")];
        assert_eq!(btc_after.principal, 520_000.0);
    }

    #[test]
    fn live_prices_only_affect_last_point() {
        let live = PriceSnapshot::new(d(2025, 3, 18), ExchangeRate::new(1300.0))
            .with_price("s", 2000.0)
            .with_price("btc", 40_000.0);
        let points =
            HistoryService::new().reconstruct(&universe(), &series(), &deposits(), &purchases(), Some(&live));

        assert!(!points[1].is_live);
        assert_eq!(points[1].investment, 1_050_000.0);
        assert!(points[2].is_live);
        assert_eq!(points[2].principal, 2_000_000.0);
        assert_eq!(points[2].assets[&k("s")].value, 1_000_000.0);
        assert_eq!(points[2].date, d(2025, 3, 1));
    }

    #[test]
    fn records_are_matched_by_month() {
        // a purchase late in the month counts toward that month's point
        let points = HistoryService::new().reconstruct(
            &universe(),
            &series()[..1],
            &deposits(),
            &[PurchaseRecord::new(d(2025, 1, 31), "s", 1000.0, 100.0, 100_000.0)],
            None,
        );
        assert_eq!(points[0].assets[&k("s")].value, 100_000.0);
    }

    #[test]
    fn unsorted_records_give_same_result() {
        let mut reversed = purchases();
        reversed.reverse();
        let mut deposits_rev = deposits();
        deposits_rev.reverse();
        let service = HistoryService::new();
        assert_eq!(
            service.reconstruct(&universe(), &series(), &deposits(), &purchases(), None),
            service.reconstruct(&universe(), &series(), &deposits_rev, &reversed, None)
        );
    }

    #[test]
    fn empty_inputs() {
        let service = HistoryService::new();
        assert!(service.reconstruct(&universe(), &[], &deposits(), &purchases(), None).is_empty());

        let points = service.reconstruct(&universe(), &series(), &[], &[], None);
        assert!(points.iter().all(|p| p.principal == 0.0 && p.investment == 0.0));
    }

    #[test]
    fn records_after_last_snapshot_are_ignored() {
        let points = HistoryService::new().reconstruct(
            &universe(),
            &series(),
            &[DepositRecord::new(d(2025, 6, 1), 1_000_000.0)],
            &[],
            None,
        );
        assert!(points.iter().all(|p| p.principal == 0.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// MarketService
// ═══════════════════════════════════════════════════════════════════

mod market_alignment {
    use super::*;

    fn points(list: &[(u32, f64)]) -> Vec<PricePoint> {
        list.iter()
            .map(|(m, p)| PricePoint {
                date: d(2025, *m, 1),
                price: *p,
            })
            .collect()
    }

    #[test]
    fn master_calendar_drives_months() {
        let mut series = BTreeMap::new();
        series.insert(k("s"), points(&[(1, 1000.0), (2, 1100.0), (3, 1200.0)]));
        series.insert(k("g"), points(&[(2, 510.0), (3, 520.0), (4, 530.0)]));
        series.insert(k("btc"), points(&[(1, 40_000.0), (3, 45_000.0)]));

        let snaps = align_monthly(&test_settings(), &series, &points(&[(1, 1300.0), (2, 1320.0), (3, 1340.0)]));

        let dates: Vec<NaiveDate> = snaps.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![d(2025, 1, 1), d(2025, 2, 1), d(2025, 3, 1)]);
        // g missing in January, btc missing in February
        assert_eq!(snaps[0].native_price(&k("g")), None);
        assert_eq!(snaps[1].native_price(&k("btc")), None);
        assert_eq!(snaps[2].native_price(&k("btc")), Some(45_000.0));
        assert_eq!(snaps[1].fx.value(), 1320.0);
    }

    #[test]
    fn missing_fx_uses_default() {
        let mut series = BTreeMap::new();
        series.insert(k("s"), points(&[(1, 1000.0), (2, 1100.0)]));

        let snaps = align_monthly(&test_settings(), &series, &points(&[(2, 1320.0)]));
        assert_eq!(snaps[0].fx.value(), 1350.0);
        assert_eq!(snaps[1].fx.value(), 1320.0);
    }

    #[test]
    fn months_without_master_price_are_dropped() {
        let mut series = BTreeMap::new();
        series.insert(k("s"), points(&[(1, 0.0), (2, 1100.0), (3, f64::NAN)]));
        series.insert(k("g"), points(&[(1, 500.0), (2, 510.0), (3, 520.0)]));

        let snaps = align_monthly(&test_settings(), &series, &[]);
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].date, d(2025, 2, 1));
    }

    #[test]
    fn no_master_series_means_no_history() {
        let mut series = BTreeMap::new();
        series.insert(k("g"), points(&[(1, 500.0)]));
        assert!(align_monthly(&test_settings(), &series, &[]).is_empty());
    }
}

mod market_fetch {
    use super::*;

    #[tokio::test]
    async fn no_provider_is_an_error() {
        let service = MarketService::new();
        assert!(!service.has_provider());
        let err = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap_err();
        assert!(matches!(err, CoreError::NoProvider));
    }

    #[tokio::test]
    async fn builds_history_and_live_snapshot() {
        let mut service = MarketService::new();
        service.register(Box::new(
            full_provider("Mock")
                .with_live("S.KS", 1250.0)
                .with_live("G.KS", 515.0)
                .with_live("BTC-USD", 46_000.0)
                .with_live("KRW=X", 1345.0),
        ));

        let data = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap();

        assert_eq!(data.history.len(), 3);
        assert_eq!(data.history[2].fx.value(), 1340.0);
        let live = data.live.unwrap();
        assert_eq!(live.date, d(2025, 3, 18));
        assert_eq!(live.native_price(&k("s")), Some(1250.0));
        assert_eq!(live.fx.value(), 1345.0);
        assert_eq!(live.local_price_of(&universe(), &k("btc")), 46_000.0 * 1345.0);
    }

    #[tokio::test]
    async fn missing_live_quotes_fall_back_to_last_close() {
        let mut service = MarketService::new();
        service.register(Box::new(
            full_provider("Mock")
                .with_live("S.KS", 1250.0)
                .with_failing_live("G.KS")
                .with_failing_live("KRW=X"),
        ));

        let data = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap();
        let live = data.live.unwrap();

        assert_eq!(live.native_price(&k("s")), Some(1250.0));
        // failed quote → last monthly close
        assert_eq!(live.native_price(&k("g")), Some(520.0));
        // no quote at all → last monthly close
        assert_eq!(live.native_price(&k("btc")), Some(45_000.0));
        // failed fx → last historical fx
        assert_eq!(live.fx.value(), 1340.0);
    }

    #[tokio::test]
    async fn falls_back_to_next_provider() {
        let broken = MockMarketProvider::new("Broken").failing();
        let broken_calls = broken.calls.clone();

        let mut service = MarketService::new();
        service.register(Box::new(broken));
        service.register(Box::new(full_provider("Backup")));
        assert_eq!(service.provider_names(), vec!["Broken", "Backup"]);

        let data = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap();
        assert_eq!(data.history.len(), 3);
        assert!(broken_calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn all_providers_failing_returns_last_error() {
        let mut service = MarketService::new();
        service.register(Box::new(MockMarketProvider::new("A").failing()));
        service.register(Box::new(MockMarketProvider::new("B").failing()));

        let err = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap_err();
        assert!(err.is_provider_failure());
        assert!(matches!(err, CoreError::Network(_)));
    }

    #[tokio::test]
    async fn empty_feed_gives_empty_market_data() {
        let mut service = MarketService::new();
        service.register(Box::new(MockMarketProvider::new("Empty")));

        let data = service.fetch_market_data(&test_settings(), d(2025, 3, 18)).await.unwrap();
        assert!(data.history.is_empty());
        assert!(data.live.is_none());
        assert!(data.current().is_none());
    }

    #[tokio::test]
    async fn asset_without_any_price_is_left_unpriced() {
        let provider = MockMarketProvider::new("Partial")
            .with_series("S.KS", &[(1, 1000.0), (2, 1100.0)])
            .with_series("BTC-USD", &[(1, 40_000.0), (2, 42_000.0)])
            .with_series("KRW=X", &[(1, 1300.0), (2, 1320.0)]);
        let mut service = MarketService::new();
        service.register(Box::new(provider));

        let data = service.fetch_market_data(&test_settings(), d(2025, 2, 18)).await.unwrap();

        assert_eq!(data.history.len(), 2);
        assert!(data.history.iter().all(|s| s.native_price(&k("g")).is_none()));
        let live = data.live.unwrap();
        assert_eq!(live.native_price(&k("g")), None);
        assert_eq!(live.native_price(&k("s")), Some(1100.0));
    }
}

mod market_proxy {
    use super::*;

    #[test]
    fn parse_month_keys() {
        assert_eq!(MarketProxyProvider::parse_month("2025-03"), Some(d(2025, 3, 1)));
        assert_eq!(MarketProxyProvider::parse_month("2025-03-31"), Some(d(2025, 3, 1)));
        assert_eq!(MarketProxyProvider::parse_month("March"), None);
        assert_eq!(MarketProxyProvider::parse_month(""), None);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = MarketProxyProvider::new("https://prices.example.com/api/");
        assert_eq!(provider.base_url(), "https://prices.example.com/api");
        assert_eq!(provider.name(), "Market Proxy");
    }
}

// ═══════════════════════════════════════════════════════════════════
// LedgerService
// ═══════════════════════════════════════════════════════════════════

mod ledger_service {
    use super::*;

    fn entry(key: &str, qty: f64, price: f64) -> AllocationPlanEntry {
        AllocationPlanEntry {
            key: k(key),
            base_alloc: qty * price,
            extra_alloc: 0.0,
            base_qty: qty,
            extra_qty: 0.0,
            qty,
            price,
            spent: qty * price,
            drop_pct: 0.0,
            overridden: false,
        }
    }

    fn plan(panic_mode: bool) -> AllocationPlan {
        AllocationPlan {
            entries: vec![entry("s", 10.0, 1000.0), entry("g", 0.0, 500.0), entry("btc", 0.01, 60_000_000.0)],
            panic_mode,
            ..AllocationPlan::default()
        }
    }

    #[tokio::test]
    async fn load_reads_both_tables() {
        let store = MemoryLedgerStore::new();
        store.insert_deposit(DepositRecord::new(d(2025, 1, 1), 5.0)).await.unwrap();
        store
            .insert_purchases(vec![PurchaseRecord::new(d(2025, 1, 2), "s", 1.0, 1.0, 1.0)])
            .await
            .unwrap();

        let ledger = LedgerService::new().load(&store).await.unwrap();
        assert_eq!(ledger.deposits.len(), 1);
        assert_eq!(ledger.purchases.len(), 1);
    }

    /// Holds both tables in one unit; per-table reads are counted.
    #[derive(Default)]
    struct SingleUnitStore {
        inner: MemoryLedgerStore,
        table_reads: AtomicUsize,
        unit_reads: AtomicUsize,
    }

    #[async_trait]
    impl LedgerStore for SingleUnitStore {
        async fn list_deposits(&self) -> Result<Vec<DepositRecord>, CoreError> {
            self.table_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_deposits().await
        }

        async fn list_purchases(&self) -> Result<Vec<PurchaseRecord>, CoreError> {
            self.table_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_purchases().await
        }

        async fn load_ledger(&self) -> Result<Ledger, CoreError> {
            self.unit_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.inner.snapshot())
        }

        async fn insert_deposit(&self, record: DepositRecord) -> Result<(), CoreError> {
            self.inner.insert_deposit(record).await
        }

        async fn update_deposit_amount(&self, id: uuid::Uuid, new_amount: f64) -> Result<(), CoreError> {
            self.inner.update_deposit_amount(id, new_amount).await
        }

        async fn insert_purchases(&self, records: Vec<PurchaseRecord>) -> Result<usize, CoreError> {
            self.inner.insert_purchases(records).await
        }

        async fn delete_all_deposits(&self) -> Result<(), CoreError> {
            self.inner.delete_all_deposits().await
        }

        async fn delete_all_purchases(&self) -> Result<(), CoreError> {
            self.inner.delete_all_purchases().await
        }

        async fn delete_purchases_by_date(&self, date: NaiveDate) -> Result<usize, CoreError> {
            self.inner.delete_purchases_by_date(date).await
        }

        async fn delete_purchases_by_batch(
            &self,
            date: NaiveDate,
            batch_id: Option<uuid::Uuid>,
        ) -> Result<usize, CoreError> {
            self.inner.delete_purchases_by_batch(date, batch_id).await
        }
    }

    #[tokio::test]
    async fn load_reads_a_single_unit_store_once() {
        let store = SingleUnitStore::default();
        store.insert_deposit(DepositRecord::new(d(2025, 1, 1), 5.0)).await.unwrap();

        let ledger = LedgerService::new().load(&store).await.unwrap();

        assert_eq!(ledger.deposits.len(), 1);
        assert_eq!(store.unit_reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.table_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deposit_same_month_adds_in_place() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();

        let first = service.save_deposit(&store, 1_000_000.0, d(2025, 4, 2)).await.unwrap();
        let second = service.save_deposit(&store, 250_000.0, d(2025, 4, 28)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.amount, 1_250_000.0);
        let deposits = store.list_deposits().await.unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].amount, 1_250_000.0);
    }

    #[tokio::test]
    async fn deposit_new_month_inserts() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();
        service.save_deposit(&store, 1_000_000.0, d(2025, 5, 2)).await.unwrap();
        service.save_deposit(&store, 1_000_000.0, d(2025, 4, 2)).await.unwrap();

        let deposits = store.list_deposits().await.unwrap();
        assert_eq!(deposits.len(), 2);
        assert_eq!(deposits[0].month_date, d(2025, 4, 1));
    }

    #[tokio::test]
    async fn invalid_deposit_amount_rejected() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = service.save_deposit(&store, amount, d(2025, 5, 2)).await.unwrap_err();
            assert!(matches!(err, CoreError::ValidationError(_)));
        }
        assert!(store.list_deposits().await.unwrap().is_empty());
    }

    #[test]
    fn build_purchases_skips_zero_quantity() {
        let records = LedgerService::new().build_purchases(&plan(false), d(2025, 5, 3));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.date == d(2025, 5, 3)));
        assert!(records.iter().all(|r| !r.is_panic_buy));
        assert!(records.iter().all(|r| r.batch_id.is_some() && r.batch_id == records[0].batch_id));
        assert_eq!(records[0].amount, 10_000.0);
        assert_eq!(records[1].quantity, 0.01);
    }

    #[test]
    fn panic_plans_are_flagged() {
        let records = LedgerService::new().build_purchases(&plan(true), d(2025, 5, 3));
        assert!(records.iter().all(|r| r.is_panic_buy));
    }

    #[tokio::test]
    async fn record_plan_stores_purchases() {
        let store = MemoryLedgerStore::new();
        let records = LedgerService::new().record_plan(&store, &plan(false), d(2025, 5, 3)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.list_purchases().await.unwrap(), records);
    }

    #[tokio::test]
    async fn record_empty_plan_writes_nothing() {
        let store = MemoryLedgerStore::new();
        let records = LedgerService::new()
            .record_plan(&store, &AllocationPlan::default(), d(2025, 5, 3))
            .await
            .unwrap();
        assert!(records.is_empty());
        assert!(store.list_purchases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batches_are_numbered_per_date() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();
        service.record_plan(&store, &plan(false), d(2025, 5, 3)).await.unwrap();
        service.record_plan(&store, &plan(true), d(2025, 5, 3)).await.unwrap();
        service.record_plan(&store, &plan(false), d(2025, 6, 3)).await.unwrap();
        store
            .insert_purchases(vec![PurchaseRecord::new(d(2025, 6, 3), "g", 500.0, 1.0, 500.0)])
            .await
            .unwrap();

        let purchases = store.list_purchases().await.unwrap();
        let batches = service.record_batches(&purchases);

        assert_eq!(batches.len(), 4);
        assert_eq!((batches[0].date, batches[0].ordinal, batches[0].count), (d(2025, 5, 3), 1, 2));
        assert_eq!((batches[1].date, batches[1].ordinal), (d(2025, 5, 3), 2));
        assert_eq!((batches[2].date, batches[2].ordinal), (d(2025, 6, 3), 1));
        assert_eq!(batches[3].batch_id, None);
        assert_eq!(batches[3].ordinal, 2);
    }

    #[tokio::test]
    async fn delete_batch_removes_only_that_batch() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();
        service.record_plan(&store, &plan(false), d(2025, 5, 3)).await.unwrap();
        service.record_plan(&store, &plan(true), d(2025, 5, 3)).await.unwrap();

        let batches = service.record_batches(&store.list_purchases().await.unwrap());
        let removed = service.delete_batch(&store, &batches[0]).await.unwrap();

        assert_eq!(removed, 2);
        let left = store.list_purchases().await.unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|p| p.is_panic_buy));
    }

    #[tokio::test]
    async fn delete_by_date_and_reset() {
        let store = MemoryLedgerStore::new();
        let service = LedgerService::new();
        service.save_deposit(&store, 1_000_000.0, d(2025, 5, 1)).await.unwrap();
        service.record_plan(&store, &plan(false), d(2025, 5, 3)).await.unwrap();
        service.record_plan(&store, &plan(false), d(2025, 5, 4)).await.unwrap();

        assert_eq!(service.delete_by_date(&store, d(2025, 5, 3)).await.unwrap(), 2);
        assert_eq!(service.delete_by_date(&store, d(2025, 5, 3)).await.unwrap(), 0);
        assert_eq!(store.list_purchases().await.unwrap().len(), 2);

        service.reset(&store).await.unwrap();
        assert!(service.load(&store).await.unwrap().is_empty());
    }

    #[test]
    fn csv_export() {
        let purchases = vec![
            PurchaseRecord::new(d(2025, 5, 3), "s", 1000.0, 10.0, 10_000.0),
            PurchaseRecord::new(d(2025, 5, 3), "btc", 60_000_000.0, 0.01, 600_000.0).panic_buy(true),
        ];
        let csv = LedgerService::new().export_purchases_csv(&purchases);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,asset_key,price,quantity,amount,is_panic_buy");
        assert_eq!(lines[1], "2025-05-03,s,1000,10,10000,false");
        assert_eq!(lines[2], "2025-05-03,btc,60000000,0.01,600000,true");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn csv_export_empty() {
        let csv = LedgerService::new().export_purchases_csv(&[]);
        assert_eq!(csv, "date,asset_key,price,quantity,amount,is_panic_buy\n");
    }
}
