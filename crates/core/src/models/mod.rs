pub mod allocation;
pub mod analytics;
pub mod asset;
pub mod history;
pub mod ledger;
pub mod portfolio;
pub mod price;
pub mod settings;
