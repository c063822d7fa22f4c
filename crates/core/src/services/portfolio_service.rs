use std::collections::BTreeMap;

use crate::models::allocation::TargetWeights;
use crate::models::analytics::{GoalProgress, WeightComparison};
use crate::models::asset::{AssetKey, AssetUniverse};
use crate::models::ledger::{DepositRecord, PurchaseRecord};
use crate::models::portfolio::{Portfolio, PortfolioPosition};
use crate::models::price::{sanitize, PriceSnapshot};

/// Folds the purchase history into holdings and a cash balance.
///
/// No I/O; the same records and prices always give the same portfolio.
pub struct PortfolioService;

impl PortfolioService {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate the ledger at the given prices.
    ///
    /// Every asset of the universe gets a position (zeroed when never bought);
    /// purchases of keys outside the universe are aggregated too and valued
    /// as locally quoted. Division by zero degrades to 0 everywhere.
    pub fn aggregate(
        &self,
        universe: &AssetUniverse,
        deposits: &[DepositRecord],
        purchases: &[PurchaseRecord],
        prices: &PriceSnapshot,
    ) -> Portfolio {
        let total_deposited = sanitize(deposits.iter().map(|d| d.amount).sum());
        let total_spent = sanitize(purchases.iter().map(|p| p.amount).sum());
        let cash_balance = total_deposited - total_spent;

        // (quantity, cost basis) per key
        let mut sums: BTreeMap<AssetKey, (f64, f64)> =
            universe.keys().map(|k| (k.clone(), (0.0, 0.0))).collect();
        for purchase in purchases {
            if purchase.asset_key.is_cash() {
                continue;
            }
            let entry = sums.entry(purchase.asset_key.clone()).or_insert((0.0, 0.0));
            entry.0 += sanitize(purchase.quantity);
            entry.1 += sanitize(purchase.amount);
        }

        let mut positions: BTreeMap<AssetKey, PortfolioPosition> = BTreeMap::new();
        let mut invested_value = 0.0;
        let mut total_invested = 0.0;

        for (key, (quantity, cost_basis)) in sums {
            let price = prices.local_price_of(universe, &key);
            let current_value = sanitize(quantity * price);
            let average_price = if quantity != 0.0 {
                sanitize(cost_basis / quantity)
            } else {
                0.0
            };
            let return_pct = if cost_basis != 0.0 {
                sanitize((current_value / cost_basis - 1.0) * 100.0)
            } else {
                0.0
            };

            invested_value += current_value;
            total_invested += cost_basis;
            positions.insert(
                key,
                PortfolioPosition {
                    quantity,
                    cost_basis,
                    average_price,
                    current_value,
                    return_pct,
                    weight_pct: 0.0, // filled below
                },
            );
        }

        positions.insert(
            AssetKey::cash(),
            PortfolioPosition {
                current_value: cash_balance,
                ..PortfolioPosition::default()
            },
        );

        let total_asset_value = sanitize(invested_value + cash_balance);
        for position in positions.values_mut() {
            position.weight_pct = if total_asset_value != 0.0 {
                sanitize(position.current_value / total_asset_value * 100.0)
            } else {
                0.0
            };
        }

        Portfolio {
            cash_balance,
            positions,
            total_asset_value,
            total_deposited,
            total_invested,
        }
    }

    /// Target vs current weight for each weighted key and each held asset,
    /// in universe order with `cash` last.
    pub fn compare_weights(
        &self,
        universe: &AssetUniverse,
        portfolio: &Portfolio,
        weights: &TargetWeights,
    ) -> Vec<WeightComparison> {
        let mut keys: Vec<AssetKey> = universe.keys().cloned().collect();
        for key in weights.keys().chain(portfolio.positions.keys()) {
            if !key.is_cash() && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys.push(AssetKey::cash());

        keys.into_iter()
            .map(|key| WeightComparison {
                target_pct: weights.share_pct(&key),
                current_pct: portfolio.position(&key).map(|p| p.weight_pct).unwrap_or(0.0),
                key,
            })
            .collect()
    }

    /// Check the ROI and asset-value goals. A goal of 0 (or less) is disabled.
    pub fn goal_progress(
        &self,
        portfolio: &Portfolio,
        goal_roi_pct: f64,
        goal_asset_value: f64,
    ) -> GoalProgress {
        let return_pct = portfolio.total_return_pct();
        GoalProgress {
            return_pct,
            total_asset_value: portfolio.total_asset_value,
            roi_goal_reached: (goal_roi_pct > 0.0).then(|| return_pct >= goal_roi_pct),
            asset_goal_reached: (goal_asset_value > 0.0)
                .then(|| portfolio.total_asset_value >= goal_asset_value),
        }
    }
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
