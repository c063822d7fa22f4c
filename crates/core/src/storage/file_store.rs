#![cfg(not(target_arch = "wasm32"))]

use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::ledger::{DepositRecord, Ledger, PurchaseRecord};
use super::encryption::KdfParams;
use super::manager::StorageManager;
use super::traits::{retain_purchasable, LedgerStore};

/// Ledger kept in one encrypted file.
///
/// Every call reads the whole file, applies the change and writes it back.
/// A missing file reads as an empty ledger; any other read failure is an error.
///
/// File I/O and key derivation run on the calling task without yielding, so
/// this store suits a single user saving a few times a month. `load_ledger`
/// decrypts the file once for both tables.
pub struct EncryptedFileStore {
    path: PathBuf,
    password: String,
    kdf_params: KdfParams,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl EncryptedFileStore {
    pub fn new(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            password: password.into(),
            kdf_params: KdfParams::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Override the KDF cost used for subsequent writes.
    pub fn with_kdf_params(mut self, kdf_params: KdfParams) -> Self {
        self.kdf_params = kdf_params;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-encrypt the file under a new password.
    pub fn change_password(&mut self, new_password: impl Into<String>) -> Result<(), CoreError> {
        let ledger = self.read()?;
        self.password = new_password.into();
        self.write(&ledger)
    }

    fn read(&self) -> Result<Ledger, CoreError> {
        if !self.path.exists() {
            debug!("Ledger file {} does not exist yet", self.path.display());
            return Ok(Ledger::default());
        }
        StorageManager::load_from_file(&self.path, &self.password)
    }

    fn write(&self, ledger: &Ledger) -> Result<(), CoreError> {
        StorageManager::save_to_file(ledger, &self.path, &self.password, &self.kdf_params)
    }

    fn modify<T>(&self, change: impl FnOnce(&mut Ledger) -> Result<T, CoreError>) -> Result<T, CoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut ledger = self.read()?;
        let out = change(&mut ledger)?;
        self.write(&ledger)?;
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for EncryptedFileStore {
    async fn list_deposits(&self) -> Result<Vec<DepositRecord>, CoreError> {
        Ok(self.read()?.deposits)
    }

    async fn list_purchases(&self) -> Result<Vec<PurchaseRecord>, CoreError> {
        Ok(self.read()?.purchases)
    }

    async fn load_ledger(&self) -> Result<Ledger, CoreError> {
        self.read()
    }

    async fn insert_deposit(&self, record: DepositRecord) -> Result<(), CoreError> {
        self.modify(|ledger| {
            ledger.insert_deposit(record);
            Ok(())
        })
    }

    async fn update_deposit_amount(&self, id: Uuid, new_amount: f64) -> Result<(), CoreError> {
        self.modify(|ledger| {
            if ledger.update_deposit_amount(id, new_amount) {
                Ok(())
            } else {
                Err(CoreError::RecordNotFound(id.to_string()))
            }
        })
    }

    async fn insert_purchases(&self, records: Vec<PurchaseRecord>) -> Result<usize, CoreError> {
        let records = retain_purchasable(records);
        if records.is_empty() {
            return Ok(0);
        }
        self.modify(|ledger| {
            let count = records.len();
            for record in records {
                ledger.insert_purchase(record);
            }
            Ok(count)
        })
    }

    async fn delete_all_deposits(&self) -> Result<(), CoreError> {
        self.modify(|ledger| {
            ledger.deposits.clear();
            Ok(())
        })
    }

    async fn delete_all_purchases(&self) -> Result<(), CoreError> {
        self.modify(|ledger| {
            ledger.purchases.clear();
            Ok(())
        })
    }

    async fn delete_purchases_by_date(&self, date: NaiveDate) -> Result<usize, CoreError> {
        self.modify(|ledger| Ok(ledger.delete_purchases_where(|p| p.date == date)))
    }

    async fn delete_purchases_by_batch(
        &self,
        date: NaiveDate,
        batch_id: Option<Uuid>,
    ) -> Result<usize, CoreError> {
        self.modify(|ledger| {
            Ok(ledger.delete_purchases_where(|p| p.date == date && p.batch_id == batch_id))
        })
    }
}
