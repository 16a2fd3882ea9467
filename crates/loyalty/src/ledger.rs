//! Reward ledger queries and administrative adjustments.

use crate::store::RewardsStore;
use rewards_core::loyalty::{CustomerBalance, LedgerEntryType, MembershipPeriod, RewardLedgerEntry};
use rewards_core::types::Amount;
use rewards_core::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Authoritative balance of a customer: the sum of every ledger entry.
pub fn customer_balance(
    store: &dyn RewardsStore,
    customer_id: &str,
) -> RewardsResult<CustomerBalance> {
    let entries = store.ledger_entries(customer_id)?;
    CustomerBalance::from_entries(&entries)
}

/// A customer's membership periods ordered by period index.
pub fn customer_periods(
    store: &dyn RewardsStore,
    customer_id: &str,
) -> RewardsResult<Vec<MembershipPeriod>> {
    let mut periods = store.select_membership_periods(customer_id)?;
    periods.sort_by_key(|p| (p.period_index, p.period_start));
    Ok(periods)
}

/// Manual correction requested by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub reference_id: Option<String>,
    pub note: String,
}

/// Append an `ADJUST` entry. At least one of points/amount must be non-zero
/// and a note is required.
pub fn adjust(
    store: &dyn RewardsStore,
    customer_id: &str,
    adjustment: Adjustment,
) -> RewardsResult<RewardLedgerEntry> {
    let points = adjustment.points.filter(|p| *p != 0);
    let amount = adjustment.amount.filter(|a| *a != 0);
    if points.is_none() && amount.is_none() {
        return Err(RewardsError::Validation(
            "adjustment must change points or amount".to_string(),
        ));
    }
    if adjustment.note.trim().is_empty() {
        return Err(RewardsError::Validation("adjustment note is required".to_string()));
    }

    let mut entry = RewardLedgerEntry::points(
        customer_id,
        LedgerEntryType::Adjust,
        points.unwrap_or(0),
        adjustment.note,
    );
    entry.points = points;
    entry.amount = amount;
    entry.reference_id = adjustment.reference_id;
    store.insert_reward_ledger_entry(entry.clone())?;

    metrics::counter!("ledger.adjustments").increment(1);
    info!(
        customer_id = %customer_id,
        points = ?entry.points,
        amount = ?entry.amount,
        "Ledger adjustment recorded"
    );
    Ok(entry)
}
