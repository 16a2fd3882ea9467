//! Initial accrual engine: one-time lifetime grants on a customer's first
//! anchored period.
//!
//! Once the first 3-month window has fully elapsed the customer receives, at
//! most once ever, the Active Cashback on that window's spending and the
//! Welcome Bonus for the tier it earned. Grant flags live on the period row
//! and are committed in the same batch as the ledger entries they guard.

use crate::periods::{first_transaction_date, period_bounds, spending_within};
use crate::rules::{
    active_cashback_percent, cashback_amount, tier_from_spending, welcome_bonus_points,
};
use crate::store::{CustomerBatch, Expect, RewardsStore};
use chrono::{NaiveDate, Utc};
use rewards_core::loyalty::{
    period_label, LedgerEntryType, MembershipPeriod, MembershipTier, PeriodKey, PeriodStatus,
    RewardLedgerEntry,
};
use rewards_core::program::ProgramSnapshot;
use rewards_core::types::{Amount, TransactionFilter};
use rewards_core::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-customer outcome of an initial engine pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCustomerSummary {
    pub customer_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_spending: Amount,
    pub tier: MembershipTier,
    /// Whether today is on or after the period end.
    pub elapsed: bool,
    pub cashback_given: bool,
    pub welcome_bonus_given: bool,
    /// Cashback appended during this run, if any.
    pub cashback_granted: Option<Amount>,
    /// Welcome Bonus points appended during this run, if any.
    pub welcome_bonus_granted: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialRunReport {
    pub run_date: NaiveDate,
    pub customers: Vec<InitialCustomerSummary>,
}

impl InitialRunReport {
    pub fn cashback_grants(&self) -> usize {
        self.customers
            .iter()
            .filter(|c| c.cashback_granted.is_some())
            .count()
    }

    pub fn welcome_bonus_grants(&self) -> usize {
        self.customers
            .iter()
            .filter(|c| c.welcome_bonus_granted.is_some())
            .count()
    }
}

pub struct InitialEngine {
    store: Arc<dyn RewardsStore>,
    program: Arc<ProgramSnapshot>,
    today: NaiveDate,
}

impl InitialEngine {
    pub fn new(
        store: Arc<dyn RewardsStore>,
        program: Arc<ProgramSnapshot>,
        today: NaiveDate,
    ) -> Self {
        Self {
            store,
            program,
            today,
        }
    }

    /// Process one customer's first period. `None` if the customer has no
    /// transactions.
    pub fn process_customer(
        &self,
        customer_id: &str,
    ) -> RewardsResult<Option<InitialCustomerSummary>> {
        let transactions = self
            .store
            .select_transactions(&TransactionFilter::customer(customer_id))?;
        let Some(anchor) = first_transaction_date(&transactions) else {
            return Ok(None);
        };
        let range = period_bounds(anchor, 1).ok_or_else(|| {
            RewardsError::Validation(format!("first transaction date {} out of range", anchor))
        })?;

        let spending = spending_within(&transactions, range)?;
        let fresh_tier = tier_from_spending(&self.program, spending);
        let key = PeriodKey::new(customer_id, range);
        let existing = self.store.select_membership_period(&key)?;

        let (mut period, expect) = match &existing {
            Some(row) => {
                let mut period = row.clone();
                // Late-arriving transactions: refresh only when the total drifted,
                // otherwise keep the stored tier.
                if period.total_spending != spending {
                    debug!(
                        customer_id = %customer_id,
                        stored = period.total_spending,
                        fresh = spending,
                        "First period spending drifted, refreshing"
                    );
                    period.total_spending = spending;
                    period.tier = fresh_tier;
                }
                (period, Expect::Version(row.version))
            }
            None => (
                MembershipPeriod {
                    customer_id: customer_id.to_string(),
                    period_index: 1,
                    label: period_label(1),
                    period_start: range.start,
                    period_end: range.end,
                    prev_period_start: None,
                    prev_period_end: None,
                    total_spending: spending,
                    tier: fresh_tier,
                    cashback_given: false,
                    welcome_bonus_given: false,
                    status: self.first_period_status(anchor),
                    version: 0,
                    updated_at: Utc::now(),
                },
                Expect::Absent,
            ),
        };

        let elapsed = self.today >= range.end;
        let mut batch = CustomerBatch::new(customer_id);
        let mut cashback_granted = None;
        let mut welcome_bonus_granted = None;

        if elapsed
            && !period.cashback_given
            && period.total_spending > 0
            && self.program.cashback_enabled()
        {
            let percent = active_cashback_percent(&self.program, period.total_spending);
            let amount = cashback_amount(&self.program, period.total_spending);
            if amount > 0 {
                batch.insert_reward_ledger_entry(RewardLedgerEntry::amount(
                    customer_id,
                    LedgerEntryType::ActiveCashback3m,
                    amount,
                    format!(
                        "Active cashback {}% on {} spent {}..{}",
                        percent, period.total_spending, range.start, range.end
                    ),
                ));
                period.cashback_given = true;
                cashback_granted = Some(amount);
            }
        }

        if elapsed && !period.welcome_bonus_given && self.program.points_enabled() {
            let bonus = welcome_bonus_points(&self.program, period.tier);
            if bonus > 0 {
                batch.insert_reward_ledger_entry(RewardLedgerEntry::points(
                    customer_id,
                    LedgerEntryType::WelcomeBonus,
                    bonus,
                    format!("Welcome bonus for {} tier", period.tier),
                ));
                period.welcome_bonus_given = true;
                welcome_bonus_granted = Some(bonus);
            }
        }

        let changed = existing.as_ref().map_or(true, |row| !row.same_content(&period));
        if changed {
            batch.upsert_membership_period(period.clone(), expect);
        }
        self.store.commit(batch)?;

        if let Some(amount) = cashback_granted {
            metrics::counter!("accrual.cashback_granted").increment(1);
            info!(
                customer_id = %customer_id,
                amount = amount,
                spending = period.total_spending,
                "Active cashback granted"
            );
        }
        if let Some(points) = welcome_bonus_granted {
            metrics::counter!("accrual.welcome_bonus_granted").increment(1);
            info!(
                customer_id = %customer_id,
                points = points,
                tier = ?period.tier,
                "Welcome bonus granted"
            );
        }

        Ok(Some(InitialCustomerSummary {
            customer_id: customer_id.to_string(),
            period_start: range.start,
            period_end: range.end,
            total_spending: period.total_spending,
            tier: period.tier,
            elapsed,
            cashback_given: period.cashback_given,
            welcome_bonus_given: period.welcome_bonus_given,
            cashback_granted,
            welcome_bonus_granted,
        }))
    }

    /// Status of a newly created first period, relative to today.
    fn first_period_status(&self, anchor: NaiveDate) -> PeriodStatus {
        match (period_bounds(anchor, 1), period_bounds(anchor, 2)) {
            (Some(first), _) if self.today < first.end => PeriodStatus::Current,
            (_, Some(second)) if self.today < second.end => PeriodStatus::Previous,
            _ => PeriodStatus::Past,
        }
    }
}
