pub mod traits;

// Market data provider implementations
pub mod market_proxy;
#[cfg(not(target_arch = "wasm32"))]
pub mod yahoo_finance;
