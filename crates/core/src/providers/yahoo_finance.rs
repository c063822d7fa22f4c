use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use time::OffsetDateTime;

use crate::errors::CoreError;
use crate::models::ledger::month_start;
use crate::models::price::PricePoint;
use super::traits::MarketDataProvider;

const PROVIDER_NAME: &str = "Yahoo Finance";

/// Yahoo Finance provider for domestic ETFs, crypto and the exchange rate.
///
/// - **Free**: No API key required.
/// - **Coverage**: KRX-listed ETFs ("381170.KS"), crypto pairs ("BTC-USD"),
///   FX pairs ("KRW=X").
/// - **Data**: monthly closes (`1mo` interval) + latest quote.
///
/// Prices are returned in each symbol's native currency.
///
/// **Note**: Not WASM-compatible (uses native reqwest/tokio). WASM builds go
/// through `MarketProxyProvider` instead.
pub struct YahooFinanceProvider {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooFinanceProvider {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| api_error(format!("Failed to create connector: {e}")))?;
        Ok(Self { connector })
    }

    /// Convert a `chrono::NaiveDate` to `time::OffsetDateTime` (midnight UTC).
    fn to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, CoreError> {
        let month = u8::try_from(date.month())
            .ok()
            .and_then(|m| time::Month::try_from(m).ok())
            .ok_or_else(|| api_error(format!("Invalid month in {date}")))?;

        let odt = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
            .map_err(|e| api_error(format!("Invalid date {date}: {e}")))?
            .with_hms(0, 0, 0)
            .map_err(|e| api_error(format!("Invalid time for {date}: {e}")))?
            .assume_utc();
        Ok(odt)
    }

    /// Convert a unix timestamp (seconds) to the first day of its month.
    fn timestamp_to_month(ts: i64) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| month_start(dt.date_naive()))
    }
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: PROVIDER_NAME.into(),
        message,
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_monthly_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let start = Self::to_offset_datetime(from)?;
        let end = Self::to_offset_datetime(to + chrono::Duration::days(1))?; // inclusive end

        let resp = self
            .connector
            .get_quote_history_interval(symbol, start, end, "1mo")
            .await
            .map_err(|e| api_error(format!("Failed to fetch monthly history for {symbol}: {e}")))?;

        let quotes = resp
            .quotes()
            .map_err(|e| api_error(format!("Failed to parse quotes for {symbol}: {e}")))?;

        let mut points: Vec<PricePoint> = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let Some(date) = Self::timestamp_to_month(quote.timestamp) else {
                continue;
            };
            if !quote.close.is_finite() {
                continue;
            }
            // Yahoo can emit the running month twice (month bar + last trade); keep the later one.
            match points.last_mut() {
                Some(last) if last.date == date => last.price = quote.close,
                _ => points.push(PricePoint {
                    date,
                    price: quote.close,
                }),
            }
        }
        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    async fn get_live_quote(&self, symbol: &str) -> Result<Option<f64>, CoreError> {
        let resp = self
            .connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| api_error(format!("Failed to fetch latest quote for {symbol}: {e}")))?;

        // An empty quote list is "no data", not a feed failure.
        Ok(resp
            .last_quote()
            .ok()
            .map(|q| q.close)
            .filter(|p| p.is_finite() && *p > 0.0))
    }
}
