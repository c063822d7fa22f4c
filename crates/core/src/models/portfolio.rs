use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::AssetKey;

/// Derived holdings of one asset. Recomputed from the ledger on every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioPosition {
    /// Σ quantity of matching purchases
    pub quantity: f64,

    /// Σ amount of matching purchases
    pub cost_basis: f64,

    /// cost_basis / quantity, 0 without holdings
    pub average_price: f64,

    /// quantity × current local price
    pub current_value: f64,

    /// (current_value / cost_basis − 1) × 100, 0 without cost basis
    pub return_pct: f64,

    /// current_value / total asset value × 100
    pub weight_pct: f64,
}

/// Aggregated state of the whole portfolio at current prices.
///
/// `positions` holds one entry per tracked asset plus a `cash` entry whose
/// `current_value` is the cash balance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Portfolio {
    /// Deposits minus purchase spend. Negative after an overspend; never clamped.
    pub cash_balance: f64,

    pub positions: BTreeMap<AssetKey, PortfolioPosition>,

    /// Σ current value of non-cash assets + cash balance
    pub total_asset_value: f64,

    pub total_deposited: f64,

    /// Σ cost basis of non-cash assets
    pub total_invested: f64,
}

impl Portfolio {
    pub fn position(&self, key: &AssetKey) -> Option<&PortfolioPosition> {
        self.positions.get(key)
    }

    /// Quantity held, 0 for unknown keys.
    pub fn quantity(&self, key: &AssetKey) -> f64 {
        self.positions.get(key).map(|p| p.quantity).unwrap_or(0.0)
    }

    /// Gain over everything deposited: total asset value − total deposited.
    pub fn profit(&self) -> f64 {
        self.total_asset_value - self.total_deposited
    }

    /// Return over deposits in percent, 0 when nothing was deposited.
    pub fn total_return_pct(&self) -> f64 {
        if self.total_deposited > 0.0 {
            let pct = (self.total_asset_value / self.total_deposited - 1.0) * 100.0;
            if pct.is_finite() {
                pct
            } else {
                0.0
            }
        } else {
            0.0
        }
    }
}
