use serde::{Deserialize, Serialize};

use super::asset::AssetKey;

/// Target vs actual weight of one asset (cash included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightComparison {
    pub key: AssetKey,

    /// weight / Σ weights × 100
    pub target_pct: f64,

    /// Current share of total asset value × 100
    pub current_pct: f64,
}

impl WeightComparison {
    /// Positive when the asset is above its target share.
    pub fn deviation_pct(&self) -> f64 {
        self.current_pct - self.target_pct
    }
}

/// Which configured goals the portfolio has reached.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalProgress {
    /// Current return over deposits in percent
    pub return_pct: f64,

    pub total_asset_value: f64,

    /// `None` when no ROI goal is configured
    pub roi_goal_reached: Option<bool>,

    /// `None` when no asset goal is configured
    pub asset_goal_reached: Option<bool>,
}

impl GoalProgress {
    pub fn any_reached(&self) -> bool {
        self.roi_goal_reached == Some(true) || self.asset_goal_reached == Some(true)
    }
}
