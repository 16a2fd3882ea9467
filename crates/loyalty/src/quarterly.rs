//! Quarterly accrual engine: maintains every anchored period of a customer
//! and back-fills per-transaction points.
//!
//! A period's tier is earned by the preceding period's spending. Points start
//! with the second period; first-period transactions never earn. A transaction
//! that already carries positive points is never re-pointed, even if tiers or
//! multipliers change afterwards.

use crate::periods::{build_periods, chain_periods, containing, ChainPeriod, PeriodKind};
use crate::rules::transaction_points;
use crate::store::{CustomerBatch, Expect, RewardsStore};
use chrono::{NaiveDate, Utc};
use rewards_core::loyalty::{
    period_label, LedgerEntryType, MembershipPeriod, PeriodKey, RewardLedgerEntry,
};
use rewards_core::program::{ProgramConfigKey, ProgramSnapshot};
use rewards_core::types::TransactionFilter;
use rewards_core::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, info};

/// Counts produced for one customer, summed over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlyCounts {
    pub periods_created: usize,
    pub periods_updated: usize,
    pub periods_unchanged: usize,
    pub transactions_pointed: usize,
    pub points_awarded: i64,
}

impl AddAssign for QuarterlyCounts {
    fn add_assign(&mut self, other: Self) {
        self.periods_created += other.periods_created;
        self.periods_updated += other.periods_updated;
        self.periods_unchanged += other.periods_unchanged;
        self.transactions_pointed += other.transactions_pointed;
        self.points_awarded += other.points_awarded;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterlyRunReport {
    pub run_date: NaiveDate,
    pub customers_processed: usize,
    #[serde(flatten)]
    pub counts: QuarterlyCounts,
}

/// Tier computation is structurally required: a run without membership tiers
/// or points configuration is refused.
pub fn require_quarterly_config(program: &ProgramSnapshot) -> RewardsResult<()> {
    if program.tiers.is_none() {
        return Err(RewardsError::ConfigurationMissing(
            ProgramConfigKey::MembershipTiers.to_string(),
        ));
    }
    if program.points.is_none() {
        return Err(RewardsError::ConfigurationMissing(
            ProgramConfigKey::PointsConfig.to_string(),
        ));
    }
    Ok(())
}

pub struct QuarterlyEngine {
    store: Arc<dyn RewardsStore>,
    program: Arc<ProgramSnapshot>,
    today: NaiveDate,
    max_periods: usize,
}

impl QuarterlyEngine {
    pub fn new(
        store: Arc<dyn RewardsStore>,
        program: Arc<ProgramSnapshot>,
        today: NaiveDate,
        max_periods: usize,
    ) -> Self {
        Self {
            store,
            program,
            today,
            max_periods,
        }
    }

    /// Rebuild and persist one customer's period chain, then back-fill points.
    /// `None` if the customer has no transactions.
    pub fn process_customer(&self, customer_id: &str) -> RewardsResult<Option<QuarterlyCounts>> {
        let transactions = self
            .store
            .select_transactions(&TransactionFilter::customer(customer_id))?;
        if transactions.is_empty() {
            return Ok(None);
        }

        let bare = build_periods(&transactions, self.today, self.max_periods)?;
        let chain = chain_periods(&bare, &self.program);
        let mut batch = CustomerBatch::new(customer_id);
        let mut counts = QuarterlyCounts::default();

        for link in &chain {
            let key = PeriodKey::new(customer_id, link.range);
            let existing = self.store.select_membership_period(&key)?;
            let desired = desired_row(customer_id, link, existing.as_ref());
            match existing {
                None => {
                    counts.periods_created += 1;
                    batch.upsert_membership_period(desired, Expect::Absent);
                }
                Some(row) if !row.same_content(&desired) => {
                    counts.periods_updated += 1;
                    batch.upsert_membership_period(desired, Expect::Version(row.version));
                }
                Some(_) => counts.periods_unchanged += 1,
            }
        }

        for tx in transactions.iter().filter(|t| !t.has_points()) {
            let Some((prev_spending, tier)) =
                containing(&chain, tx.date).and_then(ChainPeriod::earning_tier)
            else {
                continue;
            };
            if prev_spending == 0 {
                continue;
            }
            let points = transaction_points(&self.program, tx.publish_rate, tier);
            if points <= 0 {
                continue;
            }
            batch.update_transaction_points(&tx.id, points);
            batch.insert_reward_ledger_entry(
                RewardLedgerEntry::points(
                    customer_id,
                    LedgerEntryType::PointTx,
                    points,
                    format!("Points for shipment on {} at {} tier", tx.date, tier),
                )
                .with_reference(tx.id.clone()),
            );
            counts.transactions_pointed += 1;
            counts.points_awarded += points;
        }

        self.store.commit(batch)?;

        metrics::counter!("accrual.transactions_pointed")
            .increment(counts.transactions_pointed as u64);
        metrics::counter!("accrual.points_awarded")
            .increment(counts.points_awarded.max(0) as u64);
        debug!(
            customer_id = %customer_id,
            periods = chain.len(),
            created = counts.periods_created,
            updated = counts.periods_updated,
            pointed = counts.transactions_pointed,
            "Customer period chain processed"
        );
        if counts.transactions_pointed > 0 {
            info!(
                customer_id = %customer_id,
                transactions = counts.transactions_pointed,
                points = counts.points_awarded,
                "Points back-filled"
            );
        }

        Ok(Some(counts))
    }
}

/// The row this engine wants stored for a chain link.
///
/// An existing first period keeps the spending, tier and grant flags the
/// initial engine owns; only its position in the chain is refreshed.
/// Trailing periods always take the preceding period's spending and the tier
/// it earns under the current program.
fn desired_row(
    customer_id: &str,
    link: &ChainPeriod,
    existing: Option<&MembershipPeriod>,
) -> MembershipPeriod {
    let mut row = match existing {
        Some(row) => row.clone(),
        None => MembershipPeriod {
            customer_id: customer_id.to_string(),
            period_index: link.index,
            label: period_label(link.index),
            period_start: link.range.start,
            period_end: link.range.end,
            prev_period_start: None,
            prev_period_end: None,
            total_spending: 0,
            tier: Default::default(),
            cashback_given: false,
            welcome_bonus_given: false,
            status: link.status,
            version: 0,
            updated_at: Utc::now(),
        },
    };

    row.period_index = link.index;
    row.label = period_label(link.index);
    row.status = link.status;
    row.prev_period_start = link.prev.map(|p| p.start);
    row.prev_period_end = link.prev.map(|p| p.end);

    match link.kind {
        PeriodKind::First { spending, tier } => {
            if existing.is_none() {
                row.total_spending = spending;
                row.tier = tier;
            }
        }
        PeriodKind::Trailing { prev_spending, tier } => {
            row.total_spending = prev_spending;
            row.tier = tier;
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initial::InitialEngine;
    use crate::memory::InMemoryStore;
    use crate::rules::tests::test_program;
    use rewards_core::loyalty::{MembershipTier, PeriodStatus};
    use rewards_core::types::{Amount, Transaction};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(store: &InMemoryStore, id: &str, d: NaiveDate, amount: Amount) {
        store
            .insert_transaction(Transaction {
                id: id.to_string(),
                customer_id: "c1".to_string(),
                date: d,
                publish_rate: amount,
                discount_amount: 0,
                points_earned: None,
            })
            .unwrap();
    }

    fn engine(
        store: &Arc<InMemoryStore>,
        program: ProgramSnapshot,
        today: NaiveDate,
    ) -> QuarterlyEngine {
        QuarterlyEngine::new(store.clone(), Arc::new(program), today, 40)
    }

    fn points_of(store: &InMemoryStore, id: &str) -> Option<i64> {
        store
            .select_transactions(&TransactionFilter::customer("c1"))
            .unwrap()
            .into_iter()
            .find(|t| t.id == id)
            .and_then(|t| t.points_earned)
    }

    #[test]
    fn test_requires_tiers_and_points_config() {
        let mut program = test_program();
        assert!(require_quarterly_config(&program).is_ok());
        program.points = None;
        assert!(matches!(
            require_quarterly_config(&program),
            Err(RewardsError::ConfigurationMissing(key)) if key == "points_config"
        ));
        program.tiers = None;
        assert!(matches!(
            require_quarterly_config(&program),
            Err(RewardsError::ConfigurationMissing(key)) if key == "membership_tiers"
        ));
    }

    #[test]
    fn test_builds_chain_with_trailing_spending() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        seed(&store, "t2", date(2024, 4, 1), 16_000_000);

        let counts = engine(&store, test_program(), date(2024, 8, 1))
            .process_customer("c1")
            .unwrap()
            .unwrap();
        assert_eq!(counts.periods_created, 3);

        let periods = store.select_membership_periods("c1").unwrap();
        assert_eq!(periods[0].total_spending, 6_000_000);
        assert_eq!(periods[0].tier, MembershipTier::Gold);
        assert_eq!(periods[0].status, PeriodStatus::Past);
        assert_eq!(periods[1].total_spending, 6_000_000);
        assert_eq!(periods[1].tier, MembershipTier::Gold);
        assert_eq!(periods[1].status, PeriodStatus::Previous);
        assert_eq!(periods[2].total_spending, 16_000_000);
        assert_eq!(periods[2].tier, MembershipTier::Platinum);
        assert_eq!(periods[2].status, PeriodStatus::Current);
        assert_eq!(periods[2].prev_period_start, Some(date(2024, 4, 1)));
    }

    #[test]
    fn test_points_only_from_second_period() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        seed(&store, "t2", date(2024, 4, 1), 105_000);

        let counts = engine(&store, test_program(), date(2024, 5, 1))
            .process_customer("c1")
            .unwrap()
            .unwrap();
        assert_eq!(counts.transactions_pointed, 1);
        assert_eq!(counts.points_awarded, 12);
        assert_eq!(points_of(&store, "t1"), None);
        assert_eq!(points_of(&store, "t2"), Some(12));

        let ledger = store.ledger_entries("c1").unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].entry_type, LedgerEntryType::PointTx);
        assert_eq!(ledger[0].reference_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_no_points_after_empty_previous_period() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 100_000);
        seed(&store, "t2", date(2024, 7, 15), 500_000);

        let counts = engine(&store, test_program(), date(2024, 8, 1))
            .process_customer("c1")
            .unwrap()
            .unwrap();
        // Period 2 had no spending, so period 3 earns nothing.
        assert_eq!(counts.transactions_pointed, 0);
        assert_eq!(points_of(&store, "t2"), None);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        seed(&store, "t2", date(2024, 4, 5), 250_000);
        let today = date(2024, 5, 1);

        engine(&store, test_program(), today).process_customer("c1").unwrap();
        let ledger_after_first = store.ledger_len();

        let counts = engine(&store, test_program(), today)
            .process_customer("c1")
            .unwrap()
            .unwrap();
        assert_eq!(counts.periods_created, 0);
        assert_eq!(counts.periods_updated, 0);
        assert_eq!(counts.periods_unchanged, 2);
        assert_eq!(counts.transactions_pointed, 0);
        assert_eq!(store.ledger_len(), ledger_after_first);
    }

    #[test]
    fn test_first_period_owned_by_initial_engine() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        let today = date(2024, 5, 1);
        InitialEngine::new(store.clone(), Arc::new(test_program()), today)
            .process_customer("c1")
            .unwrap();
        let granted = store.select_membership_periods("c1").unwrap()[0].clone();
        assert!(granted.cashback_given && granted.welcome_bonus_given);

        // Thresholds move so a fresh recomputation would differ.
        let mut program = test_program();
        if let Some(tiers) = program.tiers.as_mut() {
            tiers.gold.min = 7_000_000;
        }
        let counts = engine(&store, program, today).process_customer("c1").unwrap().unwrap();
        assert_eq!(counts.periods_created, 1);

        let periods = store.select_membership_periods("c1").unwrap();
        assert_eq!(periods[0].tier, MembershipTier::Gold);
        assert_eq!(periods[0].total_spending, 6_000_000);
        assert!(periods[0].cashback_given && periods[0].welcome_bonus_given);
        assert_eq!(periods[0].status, PeriodStatus::Previous);
        // Trailing periods follow the live program.
        assert_eq!(periods[1].tier, MembershipTier::Silver);
    }

    #[test]
    fn test_pointed_transactions_frozen_under_new_config() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        seed(&store, "t2", date(2024, 4, 5), 105_000);
        let today = date(2024, 5, 1);
        engine(&store, test_program(), today).process_customer("c1").unwrap();
        assert_eq!(points_of(&store, "t2"), Some(12));

        let mut program = test_program();
        if let Some(points) = program.points.as_mut() {
            points.multipliers.gold = 3.0;
        }
        let counts = engine(&store, program, today).process_customer("c1").unwrap().unwrap();
        assert_eq!(counts.transactions_pointed, 0);
        assert_eq!(points_of(&store, "t2"), Some(12));
    }

    #[test]
    fn test_tier_recomputed_for_trailing_periods() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "t1", date(2024, 1, 1), 6_000_000);
        let today = date(2024, 5, 1);
        engine(&store, test_program(), today).process_customer("c1").unwrap();

        let mut program = test_program();
        if let Some(tiers) = program.tiers.as_mut() {
            tiers.platinum.min = 6_000_000;
        }
        let counts = engine(&store, program, today).process_customer("c1").unwrap().unwrap();
        assert_eq!(counts.periods_updated, 1);
        let periods = store.select_membership_periods("c1").unwrap();
        assert_eq!(periods[1].tier, MembershipTier::Platinum);
        assert_eq!(periods[0].tier, MembershipTier::Gold);
    }
}
