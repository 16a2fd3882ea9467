//! In-memory rewards store.
//!
//! All customer-facing tables live behind one lock so a [`CustomerBatch`]
//! commits atomically. Program configuration documents are independent keyed
//! values held in a DashMap. The whole store can be loaded from and saved to a
//! JSON snapshot for batch runs.

use crate::store::{CustomerBatch, Expect, RewardsStore};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use rewards_core::loyalty::{MembershipPeriod, PeriodKey, RewardLedgerEntry};
use rewards_core::program::ProgramConfigKey;
use rewards_core::types::{CustomerId, Transaction, TransactionFilter};
use rewards_core::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub membership_periods: Vec<MembershipPeriod>,
    #[serde(default)]
    pub reward_ledger: Vec<RewardLedgerEntry>,
    #[serde(default)]
    pub program_config: BTreeMap<String, serde_json::Value>,
}

#[derive(Default)]
struct Tables {
    transactions: HashMap<String, Transaction>,
    periods: BTreeMap<PeriodKey, MembershipPeriod>,
    ledger: Vec<RewardLedgerEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    program_config: DashMap<ProgramConfigKey, serde_json::Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> RewardsResult<Self> {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for tx in snapshot.transactions {
                if tables.transactions.contains_key(&tx.id) {
                    return Err(RewardsError::Validation(format!(
                        "duplicate transaction id {}",
                        tx.id
                    )));
                }
                tables.transactions.insert(tx.id.clone(), tx);
            }
            for period in snapshot.membership_periods {
                tables.periods.insert(period.key(), period);
            }
            tables.ledger = snapshot.reward_ledger;
        }
        for (key, value) in snapshot.program_config {
            let parsed = ProgramConfigKey::parse(&key).ok_or_else(|| {
                RewardsError::Validation(format!("unknown program config key {}", key))
            })?;
            store.program_config.insert(parsed, value);
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read();
        let mut transactions: Vec<Transaction> = tables.transactions.values().cloned().collect();
        sort_transactions(&mut transactions);
        StoreSnapshot {
            transactions,
            membership_periods: tables.periods.values().cloned().collect(),
            reward_ledger: tables.ledger.clone(),
            program_config: self
                .program_config
                .iter()
                .map(|r| (r.key().as_str().to_string(), r.value().clone()))
                .collect(),
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> RewardsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            transactions = snapshot.transactions.len(),
            periods = snapshot.membership_periods.len(),
            ledger = snapshot.reward_ledger.len(),
            "Store loaded from snapshot"
        );
        Self::from_snapshot(snapshot)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> RewardsResult<()> {
        let raw = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path.as_ref(), raw)?;
        info!(path = %path.as_ref().display(), "Store snapshot written");
        Ok(())
    }

    pub fn put_program_config(&self, key: ProgramConfigKey, value: serde_json::Value) {
        self.program_config.insert(key, value);
    }

    pub fn remove_program_config(&self, key: ProgramConfigKey) {
        self.program_config.remove(&key);
    }

    pub fn ledger_len(&self) -> usize {
        self.tables.read().ledger.len()
    }
}

fn sort_transactions(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        (&a.customer_id, a.date, &a.id).cmp(&(&b.customer_id, b.date, &b.id))
    });
}

fn check_preconditions(tables: &Tables, batch: &CustomerBatch) -> RewardsResult<()> {
    for upsert in &batch.period_upserts {
        let key = upsert.period.key();
        let stored = tables.periods.get(&key).map(|p| p.version);
        let ok = match (upsert.expect, stored) {
            (Expect::Absent, None) => true,
            (Expect::Version(v), Some(current)) => v == current,
            _ => false,
        };
        if !ok {
            return Err(RewardsError::Conflict(format!(
                "membership period {} [{}, {}) changed since read (expected {:?}, found {:?})",
                key.customer_id, key.period_start, key.period_end, upsert.expect, stored
            )));
        }
    }

    for update in &batch.point_updates {
        let tx = tables.transactions.get(&update.transaction_id).ok_or_else(|| {
            RewardsError::NotFound(format!("transaction {}", update.transaction_id))
        })?;
        if tx.customer_id != batch.customer_id() {
            return Err(RewardsError::Validation(format!(
                "transaction {} does not belong to customer {}",
                tx.id,
                batch.customer_id()
            )));
        }
        if tx.has_points() {
            return Err(RewardsError::Conflict(format!(
                "transaction {} already has points",
                tx.id
            )));
        }
    }
    Ok(())
}

impl RewardsStore for InMemoryStore {
    fn customer_ids(&self) -> RewardsResult<Vec<CustomerId>> {
        let tables = self.tables.read();
        let ids: BTreeSet<&CustomerId> =
            tables.transactions.values().map(|t| &t.customer_id).collect();
        Ok(ids.into_iter().cloned().collect())
    }

    fn select_transactions(&self, filter: &TransactionFilter) -> RewardsResult<Vec<Transaction>> {
        let tables = self.tables.read();
        let mut matching: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        sort_transactions(&mut matching);
        Ok(matching)
    }

    fn select_membership_period(&self, key: &PeriodKey) -> RewardsResult<Option<MembershipPeriod>> {
        Ok(self.tables.read().periods.get(key).cloned())
    }

    fn select_membership_periods(&self, customer_id: &str) -> RewardsResult<Vec<MembershipPeriod>> {
        Ok(self
            .tables
            .read()
            .periods
            .values()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect())
    }

    fn ledger_entries(&self, customer_id: &str) -> RewardsResult<Vec<RewardLedgerEntry>> {
        Ok(self
            .tables
            .read()
            .ledger
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect())
    }

    fn load_program_config(
        &self,
        key: ProgramConfigKey,
    ) -> RewardsResult<Option<serde_json::Value>> {
        Ok(self.program_config.get(&key).map(|r| r.value().clone()))
    }

    fn insert_transaction(&self, transaction: Transaction) -> RewardsResult<()> {
        let mut tables = self.tables.write();
        if tables.transactions.contains_key(&transaction.id) {
            return Err(RewardsError::Conflict(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        tables
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    fn commit(&self, batch: CustomerBatch) -> RewardsResult<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write();
        check_preconditions(&tables, &batch)?;

        let customer_id = batch.customer_id().to_string();
        let appended = batch.ledger_entries.len();
        let points_updated = batch.point_updates.len();
        let now = Utc::now();
        for upsert in batch.period_upserts {
            let mut period = upsert.period;
            period.version = match upsert.expect {
                Expect::Absent => 1,
                Expect::Version(v) => v + 1,
            };
            period.updated_at = now;
            tables.periods.insert(period.key(), period);
        }
        for update in &batch.point_updates {
            if let Some(tx) = tables.transactions.get_mut(&update.transaction_id) {
                tx.points_earned = Some(update.points);
            }
        }
        tables.ledger.extend(batch.ledger_entries);

        debug!(
            customer_id = %customer_id,
            ledger_appended = appended,
            points_updated = points_updated,
            "Customer batch committed"
        );
        Ok(())
    }
}
