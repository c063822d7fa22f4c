use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::ledger::{DepositRecord, Ledger, PurchaseRecord};
use super::traits::{retain_purchasable, LedgerStore};

/// In-process ledger. Useful for tests, demos and WASM sessions that
/// persist through `StorageManager::save_to_bytes` themselves.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: Mutex<Ledger>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing records (e.g. a decrypted file).
    pub fn from_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Ledger {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl LedgerStore for MemoryLedgerStore {
    async fn list_deposits(&self) -> Result<Vec<DepositRecord>, CoreError> {
        Ok(self.lock().deposits.clone())
    }

    async fn list_purchases(&self) -> Result<Vec<PurchaseRecord>, CoreError> {
        Ok(self.lock().purchases.clone())
    }

    async fn insert_deposit(&self, record: DepositRecord) -> Result<(), CoreError> {
        self.lock().insert_deposit(record);
        Ok(())
    }

    async fn update_deposit_amount(&self, id: Uuid, new_amount: f64) -> Result<(), CoreError> {
        if self.lock().update_deposit_amount(id, new_amount) {
            Ok(())
        } else {
            Err(CoreError::RecordNotFound(id.to_string()))
        }
    }

    async fn insert_purchases(&self, records: Vec<PurchaseRecord>) -> Result<usize, CoreError> {
        let records = retain_purchasable(records);
        let count = records.len();
        let mut ledger = self.lock();
        for record in records {
            ledger.insert_purchase(record);
        }
        Ok(count)
    }

    async fn delete_all_deposits(&self) -> Result<(), CoreError> {
        self.lock().deposits.clear();
        Ok(())
    }

    async fn delete_all_purchases(&self) -> Result<(), CoreError> {
        self.lock().purchases.clear();
        Ok(())
    }

    async fn delete_purchases_by_date(&self, date: NaiveDate) -> Result<usize, CoreError> {
        Ok(self.lock().delete_purchases_where(|p| p.date == date))
    }

    async fn delete_purchases_by_batch(
        &self,
        date: NaiveDate,
        batch_id: Option<Uuid>,
    ) -> Result<usize, CoreError> {
        Ok(self
            .lock()
            .delete_purchases_where(|p| p.date == date && p.batch_id == batch_id))
    }
}
