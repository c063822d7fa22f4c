use chrono::{Months, NaiveDate};
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::errors::CoreError;
use crate::models::asset::AssetKey;
use crate::models::price::{ExchangeRate, MarketData, PricePoint, PriceSnapshot};
use crate::models::settings::Settings;
use crate::providers::traits::MarketDataProvider;

/// Builds [`MarketData`] from the registered feeds.
///
/// Providers are tried in registration order; the first one that returns
/// every monthly series wins. Monthly series failures are errors. Live
/// quotes are best-effort: a missing or failed quote falls back to the most
/// recent historical price of that asset.
pub struct MarketService {
    providers: Vec<Box<dyn MarketDataProvider>>,
}

impl MarketService {
    /// Create a service with no providers.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a service with the default feed pre-configured.
    pub fn new_with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut service = Self::new();

        // Yahoo needs no API key but is not available on WASM.
        #[cfg(not(target_arch = "wasm32"))]
        {
            match crate::providers::yahoo_finance::YahooFinanceProvider::new() {
                Ok(yahoo) => service.register(Box::new(yahoo)),
                Err(e) => warn!("Yahoo Finance provider unavailable: {e}"),
            }
        }

        service
    }

    /// Register a provider; later registrations are fallbacks.
    pub fn register(&mut self, provider: Box<dyn MarketDataProvider>) {
        self.providers.push(provider);
    }

    pub fn has_provider(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Fetch `settings.history_years` of monthly snapshots up to `today`,
    /// plus a live snapshot dated `today`.
    pub async fn fetch_market_data(
        &self,
        settings: &Settings,
        today: NaiveDate,
    ) -> Result<MarketData, CoreError> {
        if self.providers.is_empty() {
            return Err(CoreError::NoProvider);
        }

        let from = today
            .checked_sub_months(Months::new(settings.history_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);

        let mut last_error = None;
        for provider in &self.providers {
            match self.fetch_from(provider.as_ref(), settings, from, today).await {
                Ok(data) => {
                    info!(
                        "Loaded {} monthly snapshots from {}",
                        data.history.len(),
                        provider.name()
                    );
                    return Ok(data);
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {e}", provider.name());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CoreError::NoProvider))
    }

    async fn fetch_from(
        &self,
        provider: &dyn MarketDataProvider,
        settings: &Settings,
        from: NaiveDate,
        today: NaiveDate,
    ) -> Result<MarketData, CoreError> {
        // All series concurrently; any failure fails the provider.
        let mut symbols: Vec<&str> = settings.universe.iter().map(|a| a.symbol.as_str()).collect();
        symbols.push(settings.fx_symbol.as_str());
        let series = try_join_all(
            symbols
                .iter()
                .map(|symbol| provider.get_monthly_series(symbol, from, today)),
        )
        .await?;

        let fx_series = series.last().cloned().unwrap_or_default();
        let asset_series: BTreeMap<AssetKey, Vec<PricePoint>> = settings
            .universe
            .keys()
            .cloned()
            .zip(series.into_iter())
            .collect();

        let history = align_monthly(settings, &asset_series, &fx_series);
        let live = self.fetch_live(provider, settings, &history, today).await;

        Ok(MarketData::new(history, live))
    }

    /// Live snapshot with per-asset fallback to the latest historical price.
    async fn fetch_live(
        &self,
        provider: &dyn MarketDataProvider,
        settings: &Settings,
        history: &[PriceSnapshot],
        today: NaiveDate,
    ) -> Option<PriceSnapshot> {
        let last = history.last();

        let fx_fallback = last.map(|s| s.fx.value()).unwrap_or(settings.default_fx);
        let fx = match provider.get_live_quote(&settings.fx_symbol).await {
            Ok(Some(rate)) => ExchangeRate::new_or(rate, fx_fallback),
            Ok(None) => {
                debug!("No live exchange rate; using {fx_fallback}");
                ExchangeRate::new_or(fx_fallback, settings.default_fx)
            }
            Err(e) => {
                warn!("Live exchange rate failed, using {fx_fallback}: {e}");
                ExchangeRate::new_or(fx_fallback, settings.default_fx)
            }
        };

        let mut live = PriceSnapshot::new(today, fx);
        for spec in settings.universe.iter() {
            let fallback = latest_price(history, &spec.key);
            let quote = match provider.get_live_quote(&spec.symbol).await {
                Ok(Some(price)) => Some(price),
                Ok(None) => None,
                Err(e) => {
                    warn!("Live quote for {} failed: {e}", spec.symbol);
                    None
                }
            };
            match quote.or(fallback) {
                Some(price) => {
                    if quote.is_none() {
                        warn!("No live quote for {}; using last monthly close {price}", spec.symbol);
                    }
                    live.set_price(spec.key.clone(), price);
                }
                None => warn!("No price at all for {}", spec.symbol),
            }
        }

        if live.prices.is_empty() {
            None
        } else {
            Some(live)
        }
    }
}

impl Default for MarketService {
    fn default() -> Self {
        Self::new()
    }
}

/// Align per-asset monthly series on the master asset's calendar.
///
/// A month missing for another asset leaves that asset unpriced for the
/// month; a month missing the exchange rate uses `settings.default_fx`.
/// Months where the master has no positive price are dropped.
pub fn align_monthly(
    settings: &Settings,
    asset_series: &BTreeMap<AssetKey, Vec<PricePoint>>,
    fx_series: &[PricePoint],
) -> Vec<PriceSnapshot> {
    let Some(master) = settings.universe.master() else {
        return Vec::new();
    };
    let Some(master_series) = asset_series.get(&master.key) else {
        return Vec::new();
    };

    let find = |points: &[PricePoint], date: NaiveDate| {
        points
            .iter()
            .find(|p| p.date == date)
            .map(|p| p.price)
            .filter(|p| p.is_finite() && *p > 0.0)
    };

    let mut snapshots: Vec<PriceSnapshot> = master_series
        .iter()
        .filter(|m| m.price.is_finite() && m.price > 0.0)
        .map(|m| {
            let fx = find(fx_series, m.date)
                .map(|rate| ExchangeRate::new_or(rate, settings.default_fx))
                .unwrap_or_else(|| ExchangeRate::new_or(settings.default_fx, ExchangeRate::DEFAULT_LOCAL_PER_FOREIGN));
            let mut snapshot = PriceSnapshot::new(m.date, fx);
            for (key, points) in asset_series {
                if let Some(price) = find(points, m.date) {
                    snapshot.set_price(key.clone(), price);
                }
            }
            snapshot
        })
        .collect();

    snapshots.sort_by_key(|s| s.date);
    snapshots.dedup_by_key(|s| s.date);
    snapshots
}

/// Most recent historical native price of an asset.
fn latest_price(history: &[PriceSnapshot], key: &AssetKey) -> Option<f64> {
    history.iter().rev().find_map(|s| s.native_price(key))
}
