//! Datastore collaborator contract used by the accrual engines.
//!
//! Reads are plain selects. Writes for one customer are collected in a
//! [`CustomerBatch`] and committed atomically; each write states the
//! precondition it was computed under, and the store rejects the whole batch
//! with [`RewardsError::Conflict`] if another writer got there first.

use rewards_core::loyalty::{MembershipPeriod, PeriodKey, RewardLedgerEntry};
use rewards_core::program::{ProgramConfigKey, ProgramSnapshot};
use rewards_core::types::{CustomerId, Transaction, TransactionFilter};
use rewards_core::{RewardsError, RewardsResult};

/// What the writer saw when it read the row it is upserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The row did not exist.
    Absent,
    /// The row existed at this version.
    Version(u64),
}

#[derive(Debug, Clone)]
pub struct PeriodUpsert {
    pub period: MembershipPeriod,
    pub expect: Expect,
}

/// Back-fill of `points_earned`; requires the transaction to still have none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsUpdate {
    pub transaction_id: String,
    pub points: i64,
}

/// All writes for one customer, applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct CustomerBatch {
    customer_id: CustomerId,
    pub period_upserts: Vec<PeriodUpsert>,
    pub ledger_entries: Vec<RewardLedgerEntry>,
    pub point_updates: Vec<PointsUpdate>,
}

impl CustomerBatch {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            period_upserts: Vec::new(),
            ledger_entries: Vec::new(),
            point_updates: Vec::new(),
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn upsert_membership_period(&mut self, period: MembershipPeriod, expect: Expect) {
        self.period_upserts.push(PeriodUpsert { period, expect });
    }

    pub fn insert_reward_ledger_entry(&mut self, entry: RewardLedgerEntry) {
        self.ledger_entries.push(entry);
    }

    pub fn update_transaction_points(&mut self, transaction_id: &str, points: i64) {
        self.point_updates.push(PointsUpdate {
            transaction_id: transaction_id.to_string(),
            points,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.period_upserts.is_empty()
            && self.ledger_entries.is_empty()
            && self.point_updates.is_empty()
    }

    /// Rows and entries in a batch must all belong to its customer.
    pub fn validate(&self) -> RewardsResult<()> {
        let foreign_period = self
            .period_upserts
            .iter()
            .any(|u| u.period.customer_id != self.customer_id);
        let foreign_entry = self
            .ledger_entries
            .iter()
            .any(|e| e.customer_id != self.customer_id);
        if foreign_period || foreign_entry {
            return Err(RewardsError::Validation(format!(
                "batch for customer {} contains writes for another customer",
                self.customer_id
            )));
        }
        Ok(())
    }
}

pub trait RewardsStore: Send + Sync {
    /// Distinct customers that have at least one transaction.
    fn customer_ids(&self) -> RewardsResult<Vec<CustomerId>>;

    /// Matching transactions ordered by (customer, date, id).
    fn select_transactions(&self, filter: &TransactionFilter) -> RewardsResult<Vec<Transaction>>;

    fn select_membership_period(&self, key: &PeriodKey) -> RewardsResult<Option<MembershipPeriod>>;

    /// All periods of a customer ordered by period start.
    fn select_membership_periods(&self, customer_id: &str) -> RewardsResult<Vec<MembershipPeriod>>;

    /// Ledger entries of a customer in append order.
    fn ledger_entries(&self, customer_id: &str) -> RewardsResult<Vec<RewardLedgerEntry>>;

    fn load_program_config(&self, key: ProgramConfigKey)
        -> RewardsResult<Option<serde_json::Value>>;

    fn insert_transaction(&self, transaction: Transaction) -> RewardsResult<()>;

    /// Apply every write in the batch atomically, or none of them.
    fn commit(&self, batch: CustomerBatch) -> RewardsResult<()>;

    /// Append a single standalone ledger entry.
    fn insert_reward_ledger_entry(&self, entry: RewardLedgerEntry) -> RewardsResult<()> {
        let mut batch = CustomerBatch::new(&entry.customer_id);
        batch.insert_reward_ledger_entry(entry);
        self.commit(batch)
    }
}

/// Read every program configuration document once into an immutable snapshot.
pub fn load_program_snapshot(store: &dyn RewardsStore) -> RewardsResult<ProgramSnapshot> {
    ProgramSnapshot::from_documents(|key| store.load_program_config(key))
}
