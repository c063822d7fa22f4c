use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::CoreError;

use super::allocation::TargetWeights;
use super::asset::{AssetKey, AssetUniverse};
use super::price::ExchangeRate;

/// User-configurable settings. Every value has a documented default so a
/// fresh install computes a plan without any setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub universe: AssetUniverse,

    /// Feed symbol of the local/foreign exchange rate (e.g. "KRW=X")
    pub fx_symbol: String,

    /// Rate used when the feed has no exchange rate for a month
    pub default_fx: f64,

    pub target_weights: TargetWeights,

    /// Pre-filled monthly contribution
    pub monthly_budget: f64,

    /// Annual CMA interest rate in percent
    #[serde(default)]
    pub cma_annual_rate_pct: f64,

    /// Return goal in percent; 0 disables it
    #[serde(default)]
    pub goal_roi_pct: f64,

    /// Total asset value goal; 0 disables it
    #[serde(default)]
    pub goal_asset_value: f64,

    /// How many years of monthly history to request
    pub history_years: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            universe: AssetUniverse::default(),
            fx_symbol: "KRW=X".to_string(),
            default_fx: ExchangeRate::DEFAULT_LOCAL_PER_FOREIGN,
            target_weights: default_weights(),
            monthly_budget: 1_000_000.0,
            cma_annual_rate_pct: 0.0,
            goal_roi_pct: 0.0,
            goal_asset_value: 0.0,
            history_years: 10,
        }
    }
}

impl Settings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize settings: {e}")))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for spec in self.universe.iter() {
            if spec.key.is_cash() {
                return Err(CoreError::Config(
                    "'cash' is reserved and cannot be a tradeable asset".into(),
                ));
            }
            if spec.key.as_str().is_empty() {
                return Err(CoreError::Config("Asset key must not be empty".into()));
            }
            if !seen.insert(spec.key.clone()) {
                return Err(CoreError::Config(format!("Duplicate asset key: {}", spec.key)));
            }
        }

        for (key, weight) in self.target_weights.iter() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(CoreError::Config(format!(
                    "Target weight for {key} must be a non-negative number, got {weight}"
                )));
            }
        }

        if !self.monthly_budget.is_finite() || self.monthly_budget < 0.0 {
            return Err(CoreError::Config(format!(
                "Monthly budget must be non-negative, got {}",
                self.monthly_budget
            )));
        }
        if !self.cma_annual_rate_pct.is_finite() || self.cma_annual_rate_pct < 0.0 {
            return Err(CoreError::Config(format!(
                "CMA rate must be non-negative, got {}",
                self.cma_annual_rate_pct
            )));
        }
        if !self.default_fx.is_finite() || self.default_fx <= 0.0 {
            return Err(CoreError::Config(format!(
                "Default exchange rate must be positive, got {}",
                self.default_fx
            )));
        }
        if self.history_years == 0 {
            return Err(CoreError::Config("History window must be at least one year".into()));
        }
        Ok(())
    }
}

/// 30/25/25/10/5 across the default universe, 5 kept as cash.
pub fn default_weights() -> TargetWeights {
    TargetWeights::new()
        .with("tech10", 30.0)
        .with("nasdaq", 25.0)
        .with("snp", 25.0)
        .with("gold", 10.0)
        .with("btc", 5.0)
        .with(AssetKey::cash(), 5.0)
}
