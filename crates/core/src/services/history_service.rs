use std::collections::BTreeMap;

use crate::models::asset::{AssetKey, AssetUniverse};
use crate::models::history::{AssetHistory, HistoryPoint};
use crate::models::ledger::{month_start, DepositRecord, PurchaseRecord};
use crate::models::price::{sanitize, PriceSnapshot};

/// Replays the ledger against the monthly price series for the growth chart.
///
/// Records are matched to snapshots by calendar month: everything dated in
/// or before a snapshot's month counts toward that point.
///
/// Uses incremental computation: O(points + records) after sorting.
pub struct HistoryService;

impl HistoryService {
    pub fn new() -> Self {
        Self
    }

    /// Build one point per snapshot, in the order given (expected chronological).
    ///
    /// When `live` is supplied, the last point is revalued with live prices;
    /// principal and quantities are unchanged.
    pub fn reconstruct(
        &self,
        universe: &AssetUniverse,
        series: &[PriceSnapshot],
        deposits: &[DepositRecord],
        purchases: &[PurchaseRecord],
        live: Option<&PriceSnapshot>,
    ) -> Vec<HistoryPoint> {
        let mut deposits: Vec<&DepositRecord> = deposits.iter().collect();
        deposits.sort_by_key(|d| d.month_date);
        let mut purchases: Vec<&PurchaseRecord> = purchases.iter().collect();
        purchases.sort_by_key(|p| p.date);

        let mut next_deposit = 0;
        let mut next_purchase = 0;
        let mut deposit_until_now = 0.0;
        let mut spent_until_now = 0.0;
        // (quantity, principal) per asset
        let mut holdings: BTreeMap<AssetKey, (f64, f64)> =
            universe.keys().map(|k| (k.clone(), (0.0, 0.0))).collect();

        let mut points = Vec::with_capacity(series.len());
        let last_index = series.len().saturating_sub(1);

        for (index, snapshot) in series.iter().enumerate() {
            let month = month_start(snapshot.date);

            while next_deposit < deposits.len() && month_start(deposits[next_deposit].month_date) <= month {
                deposit_until_now += sanitize(deposits[next_deposit].amount);
                next_deposit += 1;
            }
            while next_purchase < purchases.len() && month_start(purchases[next_purchase].date) <= month {
                let purchase = purchases[next_purchase];
                spent_until_now += sanitize(purchase.amount);
                if !purchase.asset_key.is_cash() {
                    let entry = holdings.entry(purchase.asset_key.clone()).or_insert((0.0, 0.0));
                    entry.0 += sanitize(purchase.quantity);
                    entry.1 += sanitize(purchase.amount);
                }
                next_purchase += 1;
            }

            let (prices, is_live) = match live {
                Some(live) if index == last_index => (live, true),
                _ => (snapshot, false),
            };

            let cash_until_now = deposit_until_now - spent_until_now;
            let mut assets = BTreeMap::new();
            let mut asset_total = 0.0;
            for (key, (quantity, principal)) in &holdings {
                let value = sanitize(quantity * prices.local_price_of(universe, key));
                asset_total += value;
                assets.insert(
                    key.clone(),
                    AssetHistory {
                        principal: *principal,
                        value,
                    },
                );
            }

            points.push(HistoryPoint {
                date: snapshot.date,
                principal: deposit_until_now,
                investment: sanitize(asset_total + cash_until_now),
                assets,
                is_live,
            });
        }

        points
    }
}

impl Default for HistoryService {
    fn default() -> Self {
        Self::new()
    }
}
