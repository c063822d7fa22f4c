use serde::{Deserialize, Serialize};

/// Key of the pseudo-asset holding uninvested balance.
pub const CASH_KEY: &str = "cash";

/// Identifier of a tracked asset class (e.g. "tech10", "gold", "btc").
///
/// Keys are lowercased on construction so that lookups do not depend on how
/// the user typed them in settings. The reserved key `cash` stands for the
/// uninvested balance: it is never priced and never purchased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_lowercase())
    }

    pub fn cash() -> Self {
        Self(CASH_KEY.to_string())
    }

    pub fn is_cash(&self) -> bool {
        self.0 == CASH_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// How purchase quantities of an asset are quantized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityKind {
    /// Exchange-traded units: quantities are floored to whole units.
    Whole,
    /// Divisible assets (crypto): quantities keep full precision.
    Fractional,
}

impl QuantityKind {
    /// Quantize a raw quantity. Non-finite or negative input becomes 0.
    pub fn quantize(self, raw: f64) -> f64 {
        if !raw.is_finite() || raw <= 0.0 {
            return 0.0;
        }
        match self {
            QuantityKind::Whole => raw.floor(),
            QuantityKind::Fractional => raw,
        }
    }
}

impl std::fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityKind::Whole => write!(f, "Whole"),
            QuantityKind::Fractional => write!(f, "Fractional"),
        }
    }
}

/// Currency an asset is quoted in by the market feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Denomination {
    /// Quoted in the local (display) currency.
    Local,
    /// Quoted in the foreign currency; multiply by the exchange rate for local value.
    Foreign,
}

/// Static description of one tradeable asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub key: AssetKey,

    /// Human-readable name (e.g. "TIGER US Tech TOP10")
    pub name: String,

    /// Ticker used by the market feed (e.g. "381170.KS", "BTC-USD")
    pub symbol: String,

    pub quantity_kind: QuantityKind,

    pub denomination: Denomination,
}

impl AssetSpec {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        quantity_kind: QuantityKind,
        denomination: Denomination,
    ) -> Self {
        Self {
            key: AssetKey::new(key),
            name: name.into(),
            symbol: symbol.into().to_uppercase(),
            quantity_kind,
            denomination,
        }
    }

    /// Whole-unit asset quoted in local currency (domestic ETFs).
    pub fn local_etf(key: impl Into<String>, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::new(key, name, symbol, QuantityKind::Whole, Denomination::Local)
    }

    /// Fractional asset quoted in the foreign currency (crypto).
    pub fn foreign_fractional(
        key: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self::new(key, name, symbol, QuantityKind::Fractional, Denomination::Foreign)
    }
}

/// The configured, ordered set of tradeable assets.
///
/// Order matters: the first asset is the master calendar when monthly series
/// are aligned. `cash` is implicit and never listed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUniverse {
    pub assets: Vec<AssetSpec>,
}

impl AssetUniverse {
    pub fn new(assets: Vec<AssetSpec>) -> Self {
        Self { assets }
    }

    pub fn get(&self, key: &AssetKey) -> Option<&AssetSpec> {
        self.assets.iter().find(|a| &a.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.assets.iter().map(|a| &a.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetSpec> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// The asset whose monthly calendar drives series alignment.
    pub fn master(&self) -> Option<&AssetSpec> {
        self.assets.first()
    }

    /// Quantity kind for a key; unknown keys are treated as whole units.
    pub fn quantity_kind(&self, key: &AssetKey) -> QuantityKind {
        self.get(key).map(|a| a.quantity_kind).unwrap_or(QuantityKind::Whole)
    }
}

impl Default for AssetUniverse {
    fn default() -> Self {
        Self::new(vec![
            AssetSpec::local_etf("tech10", "TIGER US Tech TOP10", "381170.KS"),
            AssetSpec::local_etf("nasdaq", "TIGER US Nasdaq100", "133690.KS"),
            AssetSpec::local_etf("snp", "TIGER US S&P500", "360750.KS"),
            AssetSpec::local_etf("gold", "TIGER Gold & Silver Futures(H)", "139320.KS"),
            AssetSpec::foreign_fractional("btc", "Bitcoin", "BTC-USD"),
        ])
    }
}
