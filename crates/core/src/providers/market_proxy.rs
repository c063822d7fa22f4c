use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::ledger::month_start;
use crate::models::price::PricePoint;
use super::traits::MarketDataProvider;

const PROVIDER_NAME: &str = "Market Proxy";

/// Client for a price proxy that keeps third-party credentials server-side.
///
/// The proxy is a pure pass-through of the upstream feed:
/// - `GET {base}/series?symbol=..&from=YYYY-MM-DD&to=YYYY-MM-DD`
///   → `{"quotes": [{"d": "YYYY-MM", "p": 123.4}, ...]}`
/// - `GET {base}/quote?symbol=..` → `{"price": 123.4}` (`price` may be null)
///
/// Works on WASM, where the Yahoo connector is not available.
pub struct MarketProxyProvider {
    client: Client,
    base_url: String,
}

impl MarketProxyProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Parse a proxy month key ("2025-03") or day ("2025-03-31") into the month's first day.
    pub fn parse_month(raw: &str) -> Option<NaiveDate> {
        let day = if raw.len() == 7 { format!("{raw}-01") } else { raw.to_string() };
        NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok().map(month_start)
    }
}

// ── Proxy response types ────────────────────────────────────────────

#[derive(Deserialize)]
struct SeriesResponse {
    quotes: Vec<SeriesQuote>,
}

#[derive(Deserialize)]
struct SeriesQuote {
    d: String,
    p: Option<f64>,
}

#[derive(Deserialize)]
struct QuoteResponse {
    price: Option<f64>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl MarketDataProvider for MarketProxyProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_monthly_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let url = format!("{}/series", self.base_url);
        let from_str = from.format("%Y-%m-%d").to_string();
        let to_str = to.format("%Y-%m-%d").to_string();

        let resp: SeriesResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("from", &from_str), ("to", &to_str)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: PROVIDER_NAME.into(),
                message: format!("Failed to parse series for {symbol}: {e}"),
            })?;

        let mut points: Vec<PricePoint> = resp
            .quotes
            .into_iter()
            .filter_map(|q| {
                let date = Self::parse_month(&q.d)?;
                let price = q.p.filter(|p| p.is_finite())?;
                Some(PricePoint { date, price })
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    async fn get_live_quote(&self, symbol: &str) -> Result<Option<f64>, CoreError> {
        let url = format!("{}/quote", self.base_url);

        let resp: QuoteResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: PROVIDER_NAME.into(),
                message: format!("Failed to parse quote for {symbol}: {e}"),
            })?;

        Ok(resp.price.filter(|p| p.is_finite() && *p > 0.0))
    }
}
