use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::price::PricePoint;

/// Trait abstraction for market data feeds.
///
/// Implementations deal in raw feed symbols ("381170.KS", "BTC-USD", "KRW=X")
/// and native quote currencies; aligning symbols into monthly snapshots is
/// done once, in `MarketService`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Monthly closes between `from` and `to`, sorted by date.
    /// Each point is dated on the first day of its month.
    async fn get_monthly_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;

    /// Best-effort latest price.
    ///
    /// `Ok(None)` means the feed answered but had no usable quote; an `Err`
    /// means the feed itself failed.
    async fn get_live_quote(&self, symbol: &str) -> Result<Option<f64>, CoreError>;
}
