use log::debug;

use crate::models::allocation::{AllocationInputs, AllocationPlan, AllocationPlanEntry};
use crate::models::asset::{AssetKey, AssetUniverse, QuantityKind};
use crate::models::price::sanitize;

/// Month-over-month change (in percent) at or below which an asset counts as dropped.
pub const PANIC_DROP_THRESHOLD_PCT: f64 = -10.0;

/// Share of the cash pool deployed in panic mode; the rest stays as a buffer.
pub const PANIC_DEPLOY_RATIO: f64 = 0.99;

/// Share of the panic budget split by target weight when some assets dropped.
/// The remainder is split by decline magnitude.
const PANIC_WEIGHT_HALF: f64 = 0.5;

/// Computes the monthly buy guide.
///
/// Stateless and infallible: every division is guarded and every non-finite
/// intermediate is replaced by 0, so a partial price snapshot still yields a
/// plan (with the affected assets at zero quantity).
pub struct AllocationService;

/// Per-asset working values between the passes.
struct Working {
    key: AssetKey,
    kind: QuantityKind,
    weight: f64,
    price: f64,
    base_alloc: f64,
    base_qty: f64,
    drop_pct: f64,
    extra_alloc: f64,
}

impl AllocationService {
    pub fn new() -> Self {
        Self
    }

    /// Build the purchase plan for one cycle.
    ///
    /// Plan entries follow universe order; weighted keys that are not in the
    /// universe come after, quantized as whole units.
    pub fn compute_plan(&self, universe: &AssetUniverse, inputs: &AllocationInputs) -> AllocationPlan {
        let budget = sanitize(inputs.budget);
        let cash_balance = sanitize(inputs.cash_balance);
        let weights = &inputs.target_weights;
        let ratio_sum = weights.sum();

        // 1–2. Base allocation, quantities and drop percentages
        let mut rows: Vec<Working> = Self::plan_keys(universe, inputs)
            .into_iter()
            .map(|key| {
                let weight = weights.effective(&key);
                let price = inputs.current_prices.local_price_of(universe, &key);
                let previous = inputs.previous_prices.local_price_of(universe, &key);
                let kind = universe.quantity_kind(&key);

                let base_alloc = if ratio_sum > 0.0 {
                    sanitize(budget * (weight / ratio_sum))
                } else {
                    0.0
                };
                if price <= 0.0 {
                    debug!("No usable price for {key}; it is skipped this cycle");
                }

                Working {
                    base_qty: quantity_for(kind, base_alloc, price),
                    drop_pct: drop_pct(price, previous),
                    key,
                    kind,
                    weight,
                    price,
                    base_alloc,
                    extra_alloc: 0.0,
                }
            })
            .collect();

        let dropped_assets: Vec<AssetKey> = rows
            .iter()
            .filter(|r| r.drop_pct <= PANIC_DROP_THRESHOLD_PCT)
            .map(|r| r.key.clone())
            .collect();

        // 3–4. Panic budget and its distribution
        let mut panic_budget = 0.0;
        if inputs.panic_mode {
            let base_spend_estimate: f64 = rows.iter().map(|r| sanitize(r.base_qty * r.price)).sum();
            let est_residue = (budget - base_spend_estimate).max(0.0);
            panic_budget = sanitize((cash_balance + est_residue) * PANIC_DEPLOY_RATIO).max(0.0);

            if panic_budget > 0.0 {
                Self::distribute_panic_budget(&mut rows, panic_budget, ratio_sum, !dropped_assets.is_empty());
            }
        }

        // 5–7. Final quantities, spend, and what counts against this month
        let mut entries = Vec::with_capacity(rows.len());
        let mut total_monthly_spend = 0.0;
        let mut total_expected_spend = 0.0;

        for row in rows {
            let extra_qty = quantity_for(row.kind, row.extra_alloc, row.price);
            let base_qty = clamp_quantity(row.base_qty);

            let (qty, extra_qty, overridden) = match inputs.overrides.get(&row.key) {
                Some(manual) => {
                    let qty = clamp_quantity(manual);
                    (qty, clamp_quantity(qty - base_qty), true)
                }
                None => (clamp_quantity(base_qty + extra_qty), clamp_quantity(extra_qty), false),
            };

            let spent = sanitize(qty * row.price).max(0.0);
            let base_spend = sanitize(base_qty * row.price).max(0.0);
            let counted = if inputs.panic_mode || overridden {
                spent
            } else {
                spent.min(base_spend)
            };

            total_monthly_spend += counted;
            total_expected_spend += spent;

            entries.push(AllocationPlanEntry {
                key: row.key,
                base_alloc: row.base_alloc,
                extra_alloc: row.extra_alloc,
                base_qty,
                extra_qty,
                qty,
                price: row.price,
                spent,
                drop_pct: row.drop_pct,
                overridden,
            });
        }

        // 8–9. Residue; negative is reported as is
        let this_month_residue = if inputs.panic_mode {
            budget + cash_balance - total_monthly_spend
        } else {
            budget - total_monthly_spend
        };

        // 10. CMA projection
        let cma_balance_for_interest = if inputs.panic_mode {
            this_month_residue
        } else {
            cash_balance.max(0.0) + this_month_residue.max(0.0)
        };
        let monthly_rate = sanitize(inputs.cma_annual_rate_pct).max(0.0) / 100.0 / 12.0;
        let cma_monthly_interest = sanitize(cma_balance_for_interest.max(0.0) * monthly_rate);

        AllocationPlan {
            entries,
            panic_mode: inputs.panic_mode,
            panic_budget,
            dropped_assets,
            total_monthly_spend,
            total_expected_spend,
            this_month_residue,
            cma_balance_for_interest,
            cma_monthly_interest,
        }
    }

    /// True when any asset in the plan dropped past the panic threshold.
    /// A frontend uses this to suggest switching panic mode on.
    pub fn needs_panic_attention(&self, plan: &AllocationPlan) -> bool {
        !plan.dropped_assets.is_empty()
    }

    /// Non-cash keys with a weight entry, in universe order first.
    fn plan_keys(universe: &AssetUniverse, inputs: &AllocationInputs) -> Vec<AssetKey> {
        let weights = &inputs.target_weights;
        let mut keys: Vec<AssetKey> = universe
            .keys()
            .filter(|k| weights.contains(k))
            .cloned()
            .collect();
        for key in weights.keys() {
            if !key.is_cash() && universe.get(key).is_none() {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Fill `extra_alloc` for every row.
    ///
    /// With dropped assets, half of the budget goes by halved target weight
    /// across all rows and half by decline magnitude across the dropped ones.
    /// Without, the whole budget goes by `weight / ratio_sum`.
    fn distribute_panic_budget(rows: &mut [Working], panic_budget: f64, ratio_sum: f64, any_dropped: bool) {
        if any_dropped {
            let weight_pool = panic_budget * PANIC_WEIGHT_HALF;
            let decline_pool = panic_budget - weight_pool;
            let halved_sum: f64 = rows.iter().map(|r| r.weight / 2.0).sum();
            let decline_sum: f64 = rows
                .iter()
                .filter(|r| r.drop_pct <= PANIC_DROP_THRESHOLD_PCT)
                .map(|r| r.drop_pct.abs())
                .sum();

            for row in rows.iter_mut() {
                let weight_share = if halved_sum > 0.0 {
                    weight_pool * (row.weight / 2.0) / halved_sum
                } else {
                    0.0
                };
                let decline_share = if row.drop_pct <= PANIC_DROP_THRESHOLD_PCT && decline_sum > 0.0 {
                    decline_pool * (row.drop_pct.abs() / decline_sum)
                } else {
                    0.0
                };
                row.extra_alloc = sanitize(weight_share + decline_share);
            }
        } else {
            for row in rows.iter_mut() {
                row.extra_alloc = if ratio_sum > 0.0 {
                    sanitize(panic_budget * (row.weight / ratio_sum))
                } else {
                    0.0
                };
            }
        }
    }
}

impl Default for AllocationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Month-over-month change in percent.
///
/// A missing or non-positive price on either side counts as no change, so an
/// unpriced asset can never look like a crash.
pub fn drop_pct(current: f64, previous: f64) -> f64 {
    if previous <= 0.0 || current <= 0.0 {
        return 0.0;
    }
    sanitize((current / previous - 1.0) * 100.0)
}

/// Quantity `alloc` buys at `price`; 0 for unusable prices.
fn quantity_for(kind: QuantityKind, alloc: f64, price: f64) -> f64 {
    if price <= 0.0 || !price.is_finite() {
        return 0.0;
    }
    kind.quantize(alloc / price)
}

fn clamp_quantity(qty: f64) -> f64 {
    sanitize(qty).max(0.0)
}
