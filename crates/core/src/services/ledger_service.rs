use chrono::NaiveDate;
use log::info;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::allocation::AllocationPlan;
use crate::models::ledger::{DepositRecord, Ledger, PurchaseRecord, RecordBatch};
use crate::storage::traits::LedgerStore;

/// Rules for what gets written to the ledger.
///
/// The store only persists; this service decides how a deposit merges into
/// the month and which plan entries become purchase records.
pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        Self
    }

    pub async fn load<S: LedgerStore + ?Sized>(&self, store: &S) -> Result<Ledger, CoreError> {
        store.load_ledger().await
    }

    /// Record a deposit for the month containing `today`.
    ///
    /// If that month already has a record, `amount` is added to it in place.
    /// Returns the record as stored.
    pub async fn save_deposit<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        amount: f64,
        today: NaiveDate,
    ) -> Result<DepositRecord, CoreError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Deposit amount must be positive, got {amount}"
            )));
        }

        let deposits = store.list_deposits().await?;
        match deposits.into_iter().find(|d| d.is_same_month(today)) {
            Some(mut existing) => {
                existing.amount += amount;
                store.update_deposit_amount(existing.id, existing.amount).await?;
                info!("Added {amount} to the deposit of {}", existing.month_date);
                Ok(existing)
            }
            None => {
                let record = DepositRecord::new(today, amount);
                store.insert_deposit(record.clone()).await?;
                info!("Recorded deposit of {amount} for {}", record.month_date);
                Ok(record)
            }
        }
    }

    /// Turn a plan into purchase records: one per entry with `qty > 0`, all
    /// sharing `date` and a fresh batch id, flagged as panic buys when the
    /// plan was computed in panic mode.
    pub fn build_purchases(&self, plan: &AllocationPlan, date: NaiveDate) -> Vec<PurchaseRecord> {
        let batch_id = Uuid::new_v4();
        plan.purchasable()
            .map(|entry| {
                PurchaseRecord::new(date, entry.key.clone(), entry.price, entry.qty, entry.spent)
                    .panic_buy(plan.panic_mode)
                    .in_batch(batch_id)
            })
            .collect()
    }

    /// Persist a confirmed plan. Returns the records that were stored.
    pub async fn record_plan<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        plan: &AllocationPlan,
        date: NaiveDate,
    ) -> Result<Vec<PurchaseRecord>, CoreError> {
        let records = self.build_purchases(plan, date);
        if records.is_empty() {
            return Ok(records);
        }
        let stored = store.insert_purchases(records.clone()).await?;
        info!("Recorded {stored} purchases for {date}");
        Ok(records)
    }

    /// Group purchases by (date, batch) in ledger order, numbering batches
    /// within each date from 1.
    pub fn record_batches(&self, purchases: &[PurchaseRecord]) -> Vec<RecordBatch> {
        let mut batches: Vec<RecordBatch> = Vec::new();
        for purchase in purchases {
            if let Some(batch) = batches
                .iter_mut()
                .find(|b| b.date == purchase.date && b.batch_id == purchase.batch_id)
            {
                batch.count += 1;
                continue;
            }
            let ordinal = batches.iter().filter(|b| b.date == purchase.date).count() + 1;
            batches.push(RecordBatch {
                date: purchase.date,
                batch_id: purchase.batch_id,
                count: 1,
                ordinal,
            });
        }
        batches
    }

    pub async fn delete_by_date<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
    ) -> Result<usize, CoreError> {
        let removed = store.delete_purchases_by_date(date).await?;
        info!("Deleted {removed} purchases dated {date}");
        Ok(removed)
    }

    /// Delete one save batch, as listed by [`LedgerService::record_batches`].
    pub async fn delete_batch<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        batch: &RecordBatch,
    ) -> Result<usize, CoreError> {
        let removed = store.delete_purchases_by_batch(batch.date, batch.batch_id).await?;
        info!("Deleted batch #{} of {} ({removed} purchases)", batch.ordinal, batch.date);
        Ok(removed)
    }

    /// Wipe deposits and purchases.
    pub async fn reset<S: LedgerStore + ?Sized>(&self, store: &S) -> Result<(), CoreError> {
        store.delete_all_purchases().await?;
        store.delete_all_deposits().await?;
        info!("Ledger reset");
        Ok(())
    }

    /// Purchases as CSV.
    /// Columns: date, asset_key, price, quantity, amount, is_panic_buy
    pub fn export_purchases_csv(&self, purchases: &[PurchaseRecord]) -> String {
        let mut csv = String::from("date,asset_key,price,quantity,amount,is_panic_buy\n");
        for p in purchases {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                p.date, p.asset_key, p.price, p.quantity, p.amount, p.is_panic_buy
            ));
        }
        csv
    }
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new()
    }
}
