use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::{AssetKey, AssetSpec, AssetUniverse, Denomination};

/// A single price data point (date → price), as returned by a market feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Units of local currency per one unit of the foreign currency.
///
/// Kept apart from asset prices so that a conversion is always an explicit
/// multiplication at the place a foreign-quoted value is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(f64);

impl ExchangeRate {
    /// Fallback used when the feed has no rate at all.
    pub const DEFAULT_LOCAL_PER_FOREIGN: f64 = 1350.0;

    /// Build a rate; non-finite or non-positive input falls back to `fallback`.
    pub fn new_or(rate: f64, fallback: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            Self(rate)
        } else {
            Self(fallback)
        }
    }

    pub fn new(rate: f64) -> Self {
        Self::new_or(rate, Self::DEFAULT_LOCAL_PER_FOREIGN)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Convert a foreign-currency amount into local currency.
    pub fn to_local(self, foreign_amount: f64) -> f64 {
        foreign_amount * self.0
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self(Self::DEFAULT_LOCAL_PER_FOREIGN)
    }
}

/// Prices of every tradeable asset at one point in time.
///
/// Prices are stored in each asset's native quote currency; use
/// [`PriceSnapshot::local_price`] to get the local-currency value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Month (first day) for historical points, quote day for live snapshots
    pub date: NaiveDate,

    /// Native-currency price per asset key
    pub prices: BTreeMap<AssetKey, f64>,

    pub fx: ExchangeRate,
}

impl PriceSnapshot {
    pub fn new(date: NaiveDate, fx: ExchangeRate) -> Self {
        Self {
            date,
            prices: BTreeMap::new(),
            fx,
        }
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with_price(mut self, key: impl Into<AssetKey>, price: f64) -> Self {
        self.set_price(key, price);
        self
    }

    pub fn set_price(&mut self, key: impl Into<AssetKey>, price: f64) {
        let key = key.into();
        if key.is_cash() {
            return;
        }
        self.prices.insert(key, price);
    }

    /// Raw native price, if the snapshot carries a usable one.
    pub fn native_price(&self, key: &AssetKey) -> Option<f64> {
        self.prices
            .get(key)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Local-currency price for an asset, or 0 when it is missing or unusable.
    pub fn local_price(&self, spec: &AssetSpec) -> f64 {
        match self.native_price(&spec.key) {
            Some(native) => match spec.denomination {
                Denomination::Local => native,
                Denomination::Foreign => sanitize(self.fx.to_local(native)),
            },
            None => 0.0,
        }
    }

    /// Local-currency price looked up through the universe.
    /// Keys absent from the universe are treated as locally quoted.
    pub fn local_price_of(&self, universe: &AssetUniverse, key: &AssetKey) -> f64 {
        match universe.get(key) {
            Some(spec) => self.local_price(spec),
            None => self.native_price(key).unwrap_or(0.0),
        }
    }
}

/// A monthly price history plus the best-effort live quote.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketData {
    /// Chronological monthly snapshots
    pub history: Vec<PriceSnapshot>,

    /// Latest quotes; absent when the feed returned nothing live
    pub live: Option<PriceSnapshot>,
}

impl MarketData {
    pub fn new(history: Vec<PriceSnapshot>, live: Option<PriceSnapshot>) -> Self {
        Self { history, live }
    }

    /// Prices to treat as "now": the live snapshot, else the last month.
    pub fn current(&self) -> Option<&PriceSnapshot> {
        self.live.as_ref().or_else(|| self.history.last())
    }

    /// Prices of the comparison month used for drop percentages: the latest
    /// historical month strictly before the month of [`MarketData::current`].
    pub fn previous(&self) -> Option<&PriceSnapshot> {
        let current = self.current()?;
        let current_month = (current.date.year(), current.date.month());
        self.history
            .iter()
            .rev()
            .find(|s| (s.date.year(), s.date.month()) < current_month)
    }
}

/// Replace NaN/±Infinity with 0 so they cannot leak into sums.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
