use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::AssetKey;

/// Cash deposited for one month.
///
/// A second save in the same month adds to `amount` instead of inserting a
/// new record, so there is at most one record per month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: Uuid,

    /// First day of the deposit month
    pub month_date: NaiveDate,

    pub amount: f64,
}

impl DepositRecord {
    pub fn new(month_date: NaiveDate, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            month_date: month_start(month_date),
            amount,
        }
    }

    /// Whether this record belongs to the same calendar month as `date`.
    pub fn is_same_month(&self, date: NaiveDate) -> bool {
        self.month_date.year() == date.year() && self.month_date.month() == date.month()
    }
}

/// One executed purchase. Immutable once stored.
///
/// `amount` is recorded separately from `price × quantity` and is the
/// authoritative cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: Uuid,

    pub date: NaiveDate,

    pub asset_key: AssetKey,

    /// Execution price in local currency
    pub price: f64,

    pub quantity: f64,

    pub amount: f64,

    /// Bought with idle cash during a drop rather than the regular monthly deposit
    #[serde(default)]
    pub is_panic_buy: bool,

    /// Groups records saved together by one "record this plan" action
    #[serde(default)]
    pub batch_id: Option<Uuid>,
}

impl PurchaseRecord {
    pub fn new(
        date: NaiveDate,
        asset_key: impl Into<AssetKey>,
        price: f64,
        quantity: f64,
        amount: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            asset_key: asset_key.into(),
            price,
            quantity,
            amount,
            is_panic_buy: false,
            batch_id: None,
        }
    }

    pub fn panic_buy(mut self, is_panic_buy: bool) -> Self {
        self.is_panic_buy = is_panic_buy;
        self
    }

    pub fn in_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

/// Full contents of the ledger: deposits ascending by month, purchases ascending by date.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub deposits: Vec<DepositRecord>,
    pub purchases: Vec<PurchaseRecord>,
}

impl Ledger {
    pub fn new(deposits: Vec<DepositRecord>, purchases: Vec<PurchaseRecord>) -> Self {
        Self {
            deposits,
            purchases,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.purchases.is_empty()
    }

    pub fn total_deposited(&self) -> f64 {
        self.deposits.iter().map(|d| d.amount).sum()
    }

    pub fn total_spent(&self) -> f64 {
        self.purchases.iter().map(|p| p.amount).sum()
    }

    /// The deposit record for the month containing `date`, if any.
    pub fn deposit_for_month(&self, date: NaiveDate) -> Option<&DepositRecord> {
        self.deposits.iter().find(|d| d.is_same_month(date))
    }

    // ── Table operations shared by the store implementations ────────

    /// Insert keeping month order (O(log n) search).
    pub(crate) fn insert_deposit(&mut self, record: DepositRecord) {
        let pos = self
            .deposits
            .partition_point(|d| d.month_date <= record.month_date);
        self.deposits.insert(pos, record);
    }

    pub(crate) fn update_deposit_amount(&mut self, id: Uuid, new_amount: f64) -> bool {
        match self.deposits.iter_mut().find(|d| d.id == id) {
            Some(deposit) => {
                deposit.amount = new_amount;
                true
            }
            None => false,
        }
    }

    /// Insert keeping date order; same-date records stay in insertion order.
    pub(crate) fn insert_purchase(&mut self, record: PurchaseRecord) {
        let pos = self.purchases.partition_point(|p| p.date <= record.date);
        self.purchases.insert(pos, record);
    }

    pub(crate) fn delete_purchases_where(&mut self, pred: impl Fn(&PurchaseRecord) -> bool) -> usize {
        let before = self.purchases.len();
        self.purchases.retain(|p| !pred(p));
        before - self.purchases.len()
    }
}

/// Purchases saved together, listed so a user can delete one save at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub date: NaiveDate,

    /// `None` groups records that were stored without a batch id
    pub batch_id: Option<Uuid>,

    pub count: usize,

    /// 1-based position of this batch among the batches of the same date
    pub ordinal: usize,
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
