use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::AssetKey;

/// A single point of the growth chart.
///
/// The core computes all the numbers; a frontend only renders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,

    /// Deposits made up to and including this month
    pub principal: f64,

    /// Σ asset values + uninvested cash at this month's prices
    pub investment: f64,

    /// Per-asset drill-down
    pub assets: BTreeMap<AssetKey, AssetHistory>,

    /// Valued with live quotes instead of the month's close
    #[serde(default)]
    pub is_live: bool,
}

/// Principal and value of one asset at a history point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetHistory {
    /// Σ purchase amounts up to this point
    pub principal: f64,

    /// quantity held × price at this point
    pub value: f64,
}
