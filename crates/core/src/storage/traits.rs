use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::ledger::{DepositRecord, Ledger, PurchaseRecord};

/// Trait abstraction for the deposit/purchase ledger.
///
/// Implementations only store and return records; the rules for what gets
/// written (same-month deposit merge, plan → purchases) live in
/// `LedgerService`. A failed read must be an `Err`, never an empty list.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait LedgerStore: Send + Sync {
    /// All deposits, ascending by month.
    async fn list_deposits(&self) -> Result<Vec<DepositRecord>, CoreError>;

    /// All purchases, ascending by date.
    async fn list_purchases(&self) -> Result<Vec<PurchaseRecord>, CoreError>;

    /// Both tables. Stores that hold them in one unit should read it once.
    async fn load_ledger(&self) -> Result<Ledger, CoreError> {
        let (deposits, purchases) =
            futures::try_join!(self.list_deposits(), self.list_purchases())?;
        Ok(Ledger::new(deposits, purchases))
    }

    async fn insert_deposit(&self, record: DepositRecord) -> Result<(), CoreError>;

    async fn update_deposit_amount(&self, id: Uuid, new_amount: f64) -> Result<(), CoreError>;

    /// Bulk insert. Records with `quantity <= 0` are dropped, not stored.
    /// Returns the number of records stored.
    async fn insert_purchases(&self, records: Vec<PurchaseRecord>) -> Result<usize, CoreError>;

    async fn delete_all_deposits(&self) -> Result<(), CoreError>;

    async fn delete_all_purchases(&self) -> Result<(), CoreError>;

    /// Returns the number of records removed.
    async fn delete_purchases_by_date(&self, date: NaiveDate) -> Result<usize, CoreError>;

    /// Delete one save batch of a given date. `None` targets records stored
    /// without a batch id. Returns the number of records removed.
    async fn delete_purchases_by_batch(
        &self,
        date: NaiveDate,
        batch_id: Option<Uuid>,
    ) -> Result<usize, CoreError>;
}

/// Keep only records that represent an actual purchase.
pub fn retain_purchasable(records: Vec<PurchaseRecord>) -> Vec<PurchaseRecord> {
    records
        .into_iter()
        .filter(|r| r.quantity.is_finite() && r.quantity > 0.0)
        .collect()
}
