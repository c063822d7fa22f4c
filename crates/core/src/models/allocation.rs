use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::AssetKey;
use super::price::PriceSnapshot;

/// Desired relative weight per asset class, `cash` included.
///
/// Weights need not sum to 100; every share is `weight / Σ weights`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetWeights(BTreeMap<AssetKey, f64>);

impl TargetWeights {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: impl Into<AssetKey>, weight: f64) -> Self {
        self.set(key, weight);
        self
    }

    pub fn set(&mut self, key: impl Into<AssetKey>, weight: f64) {
        self.0.insert(key.into(), weight);
    }

    pub fn get(&self, key: &AssetKey) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Weight usable in arithmetic: negative or non-finite values count as 0.
    pub fn effective(&self, key: &AssetKey) -> f64 {
        match self.0.get(key) {
            Some(w) if w.is_finite() && *w > 0.0 => *w,
            _ => 0.0,
        }
    }

    /// Σ of effective weights over every key, `cash` included.
    pub fn sum(&self) -> f64 {
        self.0.keys().map(|k| self.effective(k)).sum()
    }

    /// Share of `key` in percent, 0 when the weights are degenerate.
    pub fn share_pct(&self, key: &AssetKey) -> f64 {
        let sum = self.sum();
        if sum > 0.0 {
            self.effective(key) / sum * 100.0
        } else {
            0.0
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetKey, &f64)> {
        self.0.iter()
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AssetKey, f64)> for TargetWeights {
    fn from_iter<I: IntoIterator<Item = (AssetKey, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// User-typed final quantities, one optional slot per asset.
///
/// `Some(0.0)` means "buy nothing of this asset"; `None` means "use the
/// computed quantity".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualOverrides {
    slots: BTreeMap<AssetKey, Option<f64>>,
}

impl ManualOverrides {
    /// One empty slot per key.
    pub fn for_keys<'a>(keys: impl IntoIterator<Item = &'a AssetKey>) -> Self {
        Self {
            slots: keys.into_iter().map(|k| (k.clone(), None)).collect(),
        }
    }

    pub fn with(mut self, key: impl Into<AssetKey>, quantity: f64) -> Self {
        self.set(key, quantity);
        self
    }

    pub fn set(&mut self, key: impl Into<AssetKey>, quantity: f64) {
        self.slots.insert(key.into(), Some(quantity));
    }

    pub fn clear(&mut self, key: &AssetKey) {
        if let Some(slot) = self.slots.get_mut(key) {
            *slot = None;
        }
    }

    pub fn clear_all(&mut self) {
        for slot in self.slots.values_mut() {
            *slot = None;
        }
    }

    pub fn get(&self, key: &AssetKey) -> Option<f64> {
        self.slots.get(key).copied().flatten()
    }

    /// True when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Option::is_none)
    }
}

/// Everything the buy guide needs for one computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationInputs {
    /// This month's contribution in local currency
    pub budget: f64,

    pub target_weights: TargetWeights,

    pub current_prices: PriceSnapshot,

    /// Used only for drop percentages
    pub previous_prices: PriceSnapshot,

    /// Deposits minus spend so far, as aggregated from the ledger
    pub cash_balance: f64,

    pub panic_mode: bool,

    pub overrides: ManualOverrides,

    /// Annual CMA interest rate in percent (e.g. 3.0 for 3%)
    pub cma_annual_rate_pct: f64,
}

/// Recommended purchase of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlanEntry {
    pub key: AssetKey,

    /// Budget slice before quantization: budget × weight / Σ weights
    pub base_alloc: f64,

    /// Panic budget slice before quantization
    pub extra_alloc: f64,

    /// Regular monthly quantity
    pub base_qty: f64,

    /// Additional panic-mode quantity (display value when overridden)
    pub extra_qty: f64,

    /// Final quantity: base + extra, or the manual override
    pub qty: f64,

    /// Local-currency price used for the plan; 0 when untradeable
    pub price: f64,

    /// qty × price
    pub spent: f64,

    /// Change vs the previous month in percent; negative is a decline
    pub drop_pct: f64,

    pub overridden: bool,
}

/// The buy guide for one cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub entries: Vec<AllocationPlanEntry>,

    pub panic_mode: bool,

    /// Cash deployed on top of the budget in panic mode (0 otherwise)
    pub panic_budget: f64,

    /// Assets at or below the drop threshold this month
    pub dropped_assets: Vec<AssetKey>,

    /// Spend counted against this month's money
    pub total_monthly_spend: f64,

    /// Σ spent over all entries
    pub total_expected_spend: f64,

    /// Cash left over after this cycle. May be negative.
    pub this_month_residue: f64,

    pub cma_balance_for_interest: f64,

    pub cma_monthly_interest: f64,
}

impl AllocationPlan {
    pub fn entry(&self, key: &AssetKey) -> Option<&AllocationPlanEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Entries that would turn into purchase records (qty > 0).
    pub fn purchasable(&self) -> impl Iterator<Item = &AllocationPlanEntry> {
        self.entries.iter().filter(|e| e.qty > 0.0)
    }
}
