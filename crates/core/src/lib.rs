pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDate;
use log::{info, warn};
use models::{
    allocation::{AllocationInputs, AllocationPlan, ManualOverrides, TargetWeights},
    analytics::{GoalProgress, WeightComparison},
    asset::AssetKey,
    history::HistoryPoint,
    ledger::{DepositRecord, Ledger, PurchaseRecord, RecordBatch},
    portfolio::Portfolio,
    price::{ExchangeRate, MarketData, PriceSnapshot},
    settings::Settings,
};
use services::{
    allocation_service::AllocationService, history_service::HistoryService,
    ledger_service::LedgerService, market_service::MarketService,
    portfolio_service::PortfolioService,
};
use storage::traits::LedgerStore;

use errors::CoreError;

/// What the user is editing on the buy guide.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerInputs {
    pub budget: f64,
    pub target_weights: TargetWeights,
    pub panic_mode: bool,
    pub overrides: ManualOverrides,
}

impl TrackerInputs {
    /// Inputs pre-filled from settings, with no overrides and panic mode off.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            budget: settings.monthly_budget,
            target_weights: settings.target_weights.clone(),
            panic_mode: false,
            overrides: ManualOverrides::for_keys(settings.universe.keys()),
        }
    }
}

/// Everything the derived views are computed from.
///
/// Replaced as a whole value; derived data (portfolio, plan, history) is never
/// stored, only recomputed from this.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub settings: Settings,
    pub market: MarketData,
    pub ledger: Ledger,
    pub inputs: TrackerInputs,
}

impl TrackerState {
    pub fn new(settings: Settings) -> Self {
        Self {
            inputs: TrackerInputs::from_settings(&settings),
            settings,
            market: MarketData::default(),
            ledger: Ledger::default(),
        }
    }
}

/// Main entry point for the DCA tracker core library.
/// Holds the current state, the ledger store and the services that derive
/// the portfolio, the buy guide and the growth history from it.
#[must_use]
pub struct DcaTracker<S: LedgerStore> {
    state: TrackerState,
    store: S,
    market_service: MarketService,
    ledger_service: LedgerService,
    portfolio_service: PortfolioService,
    allocation_service: AllocationService,
    history_service: HistoryService,
}

impl<S: LedgerStore> std::fmt::Debug for DcaTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcaTracker")
            .field("deposits", &self.state.ledger.deposits.len())
            .field("purchases", &self.state.ledger.purchases.len())
            .field("price_months", &self.state.market.history.len())
            .field("has_live_prices", &self.state.market.live.is_some())
            .field("panic_mode", &self.state.inputs.panic_mode)
            .field("providers", &self.market_service.provider_names())
            .finish()
    }
}

impl<S: LedgerStore> DcaTracker<S> {
    /// Create a tracker with the default market feed.
    pub fn new(settings: Settings, store: S) -> Result<Self, CoreError> {
        Self::with_market_service(settings, store, MarketService::new_with_defaults())
    }

    /// Create a tracker with a caller-supplied set of providers.
    pub fn with_market_service(
        settings: Settings,
        store: S,
        market_service: MarketService,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self {
            state: TrackerState::new(settings),
            store,
            market_service,
            ledger_service: LedgerService::new(),
            portfolio_service: PortfolioService::new(),
            allocation_service: AllocationService::new(),
            history_service: HistoryService::new(),
        })
    }

    #[must_use]
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    #[must_use]
    pub fn inputs(&self) -> &TrackerInputs {
        &self.state.inputs
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    #[must_use]
    pub fn market(&self) -> &MarketData {
        &self.state.market
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the settings. Inputs are reset from the new settings.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), CoreError> {
        settings.validate()?;
        self.state = TrackerState {
            inputs: TrackerInputs::from_settings(&settings),
            settings,
            market: self.state.market.clone(),
            ledger: self.state.ledger.clone(),
        };
        Ok(())
    }

    // ── Refresh ─────────────────────────────────────────────────────

    /// Fetch market data and the ledger concurrently.
    ///
    /// The state is replaced only when both succeed. On any failure the
    /// previous state is kept and the error is returned; a failed ledger read
    /// never shows up as an empty ledger.
    pub async fn refresh(&mut self, today: NaiveDate) -> Result<(), CoreError> {
        let (market, ledger) = futures::join!(
            self.market_service.fetch_market_data(&self.state.settings, today),
            self.ledger_service.load(&self.store)
        );

        match (market, ledger) {
            (Ok(market), Ok(ledger)) => {
                info!(
                    "Refreshed: {} price months, {} deposits, {} purchases",
                    market.history.len(),
                    ledger.deposits.len(),
                    ledger.purchases.len()
                );
                self.state = TrackerState {
                    market,
                    ledger,
                    ..self.state.clone()
                };
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Refresh failed, keeping previous state: {e}");
                Err(e)
            }
        }
    }

    /// Fetch market data without touching the state.
    pub async fn fetch_market(&self, today: NaiveDate) -> Result<MarketData, CoreError> {
        self.market_service
            .fetch_market_data(&self.state.settings, today)
            .await
    }

    /// Read the ledger without touching the state.
    pub async fn load_ledger(&self) -> Result<Ledger, CoreError> {
        self.ledger_service.load(&self.store).await
    }

    /// Install market data. Responses are not ordered: whatever is applied
    /// last wins, even if it was fetched earlier.
    pub fn apply_market(&mut self, market: MarketData) {
        self.state = TrackerState {
            market,
            ..self.state.clone()
        };
    }

    /// Install a ledger read. Same ordering caveat as [`DcaTracker::apply_market`].
    pub fn apply_ledger(&mut self, ledger: Ledger) {
        self.state = TrackerState {
            ledger,
            ..self.state.clone()
        };
    }

    // ── Derived views ───────────────────────────────────────────────

    /// Prices treated as "now". Empty (everything unpriced) before the first refresh.
    #[must_use]
    pub fn current_prices(&self) -> PriceSnapshot {
        self.state.market.current().cloned().unwrap_or_else(|| self.empty_snapshot())
    }

    /// Prices of the comparison month for drop percentages.
    #[must_use]
    pub fn previous_prices(&self) -> PriceSnapshot {
        self.state.market.previous().cloned().unwrap_or_else(|| self.empty_snapshot())
    }

    #[must_use]
    pub fn portfolio(&self) -> Portfolio {
        let ledger = &self.state.ledger;
        self.portfolio_service.aggregate(
            &self.state.settings.universe,
            &ledger.deposits,
            &ledger.purchases,
            &self.current_prices(),
        )
    }

    /// The engine inputs for the current state.
    #[must_use]
    pub fn allocation_inputs(&self) -> AllocationInputs {
        let inputs = &self.state.inputs;
        AllocationInputs {
            budget: inputs.budget,
            target_weights: inputs.target_weights.clone(),
            current_prices: self.current_prices(),
            previous_prices: self.previous_prices(),
            cash_balance: self.portfolio().cash_balance,
            panic_mode: inputs.panic_mode,
            overrides: inputs.overrides.clone(),
            cma_annual_rate_pct: self.state.settings.cma_annual_rate_pct,
        }
    }

    #[must_use]
    pub fn plan(&self) -> AllocationPlan {
        self.allocation_service
            .compute_plan(&self.state.settings.universe, &self.allocation_inputs())
    }

    /// True when an asset dropped far enough to suggest panic mode.
    #[must_use]
    pub fn needs_panic_attention(&self) -> bool {
        self.allocation_service.needs_panic_attention(&self.plan())
    }

    #[must_use]
    pub fn history(&self) -> Vec<HistoryPoint> {
        let ledger = &self.state.ledger;
        self.history_service.reconstruct(
            &self.state.settings.universe,
            &self.state.market.history,
            &ledger.deposits,
            &ledger.purchases,
            self.state.market.live.as_ref(),
        )
    }

    #[must_use]
    pub fn weight_comparison(&self) -> Vec<WeightComparison> {
        self.portfolio_service.compare_weights(
            &self.state.settings.universe,
            &self.portfolio(),
            &self.state.inputs.target_weights,
        )
    }

    #[must_use]
    pub fn goal_progress(&self) -> GoalProgress {
        let settings = &self.state.settings;
        self.portfolio_service.goal_progress(
            &self.portfolio(),
            settings.goal_roi_pct,
            settings.goal_asset_value,
        )
    }

    #[must_use]
    pub fn record_batches(&self) -> Vec<RecordBatch> {
        self.ledger_service.record_batches(&self.state.ledger.purchases)
    }

    #[must_use]
    pub fn export_purchases_csv(&self) -> String {
        self.ledger_service.export_purchases_csv(&self.state.ledger.purchases)
    }

    // ── Inputs ──────────────────────────────────────────────────────

    pub fn set_budget(&mut self, budget: f64) {
        self.update_inputs(|inputs| inputs.budget = budget);
    }

    pub fn set_target_weights(&mut self, weights: TargetWeights) {
        self.update_inputs(|inputs| inputs.target_weights = weights);
    }

    pub fn set_target_weight(&mut self, key: impl Into<AssetKey>, weight: f64) {
        let key = key.into();
        self.update_inputs(|inputs| inputs.target_weights.set(key, weight));
    }

    pub fn set_panic_mode(&mut self, panic_mode: bool) {
        self.update_inputs(|inputs| inputs.panic_mode = panic_mode);
    }

    pub fn toggle_panic_mode(&mut self) {
        self.update_inputs(|inputs| inputs.panic_mode = !inputs.panic_mode);
    }

    /// Fix the final quantity of one asset. `0.0` means "buy none".
    pub fn set_override(&mut self, key: impl Into<AssetKey>, quantity: f64) {
        let key = key.into();
        self.update_inputs(|inputs| inputs.overrides.set(key, quantity));
    }

    pub fn clear_override(&mut self, key: &AssetKey) {
        self.update_inputs(|inputs| inputs.overrides.clear(key));
    }

    pub fn clear_overrides(&mut self) {
        self.update_inputs(|inputs| inputs.overrides.clear_all());
    }

    fn update_inputs(&mut self, change: impl FnOnce(&mut TrackerInputs)) {
        let mut inputs = self.state.inputs.clone();
        change(&mut inputs);
        self.state = TrackerState {
            inputs,
            ..self.state.clone()
        };
    }

    // ── Ledger writes ───────────────────────────────────────────────
    //
    // Each write re-reads the whole ledger afterwards. If that read fails the
    // write has still happened; the error is returned and the old ledger kept.

    /// Record this month's deposit (added to an existing record for the month).
    pub async fn save_deposit(
        &mut self,
        amount: f64,
        today: NaiveDate,
    ) -> Result<DepositRecord, CoreError> {
        let record = self
            .ledger_service
            .save_deposit(&self.store, amount, today)
            .await?;
        self.reload_ledger().await?;
        Ok(record)
    }

    /// Persist the current plan as purchases dated `date` and clear the overrides.
    pub async fn record_plan(&mut self, date: NaiveDate) -> Result<Vec<PurchaseRecord>, CoreError> {
        let plan = self.plan();
        let records = self.ledger_service.record_plan(&self.store, &plan, date).await?;
        self.clear_overrides();
        self.reload_ledger().await?;
        Ok(records)
    }

    pub async fn delete_purchases_on(&mut self, date: NaiveDate) -> Result<usize, CoreError> {
        let removed = self.ledger_service.delete_by_date(&self.store, date).await?;
        self.reload_ledger().await?;
        Ok(removed)
    }

    pub async fn delete_batch(&mut self, batch: &RecordBatch) -> Result<usize, CoreError> {
        let removed = self.ledger_service.delete_batch(&self.store, batch).await?;
        self.reload_ledger().await?;
        Ok(removed)
    }

    /// Delete every deposit and purchase.
    pub async fn reset(&mut self) -> Result<(), CoreError> {
        self.ledger_service.reset(&self.store).await?;
        self.reload_ledger().await
    }

    async fn reload_ledger(&mut self) -> Result<(), CoreError> {
        let ledger = self.ledger_service.load(&self.store).await?;
        self.apply_ledger(ledger);
        Ok(())
    }

    fn empty_snapshot(&self) -> PriceSnapshot {
        PriceSnapshot::new(NaiveDate::MIN, ExchangeRate::new(self.state.settings.default_fx))
    }
}
