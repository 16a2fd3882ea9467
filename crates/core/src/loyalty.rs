//! Loyalty program domain types: membership tiers, anchored membership
//! periods and the append-only reward ledger.
//!
//! - Three-tier structure: Silver → Gold → Platinum
//! - Tier for a period is earned by the preceding period's spending
//! - One-time lifetime grants (Active Cashback, Welcome Bonus) tracked as
//!   flags on the customer's first period

use crate::error::{RewardsError, RewardsResult};
use crate::types::{Amount, CustomerId, DateRange};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Tier System ────────────────────────────────────────────────────────────

/// Membership tier levels with escalating benefits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipTier {
    /// Floor tier. Assigned whenever no higher range matches.
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Silver => "SILVER",
            MembershipTier::Gold => "GOLD",
            MembershipTier::Platinum => "PLATINUM",
        }
    }
}

impl Default for MembershipTier {
    fn default() -> Self {
        MembershipTier::Silver
    }
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Membership Periods ─────────────────────────────────────────────────────

/// Position of a period relative to "today" in a customer's chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Current,
    Previous,
    Past,
}

/// Identity of a membership period row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub customer_id: CustomerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl PeriodKey {
    pub fn new(customer_id: &str, range: DateRange) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            period_start: range.start,
            period_end: range.end,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.period_start, self.period_end)
    }
}

/// Derived per-customer, per-period state: spending, tier and one-time flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipPeriod {
    pub customer_id: CustomerId,
    /// 1 = first anchored period.
    pub period_index: u32,
    pub label: String,
    /// Inclusive.
    pub period_start: NaiveDate,
    /// Exclusive.
    pub period_end: NaiveDate,
    pub prev_period_start: Option<NaiveDate>,
    pub prev_period_end: Option<NaiveDate>,
    /// Period 1: its own spending. Later periods: the preceding period's spending.
    pub total_spending: Amount,
    pub tier: MembershipTier,
    #[serde(default)]
    pub cashback_given: bool,
    #[serde(default)]
    pub welcome_bonus_given: bool,
    pub status: PeriodStatus,
    /// Bumped by the store on every committed write.
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl MembershipPeriod {
    pub fn key(&self) -> PeriodKey {
        PeriodKey {
            customer_id: self.customer_id.clone(),
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }

    pub fn is_first(&self) -> bool {
        self.period_index == 1
    }

    /// Compare everything an engine writes, ignoring bookkeeping fields.
    pub fn same_content(&self, other: &MembershipPeriod) -> bool {
        self.period_index == other.period_index
            && self.label == other.label
            && self.prev_period_start == other.prev_period_start
            && self.prev_period_end == other.prev_period_end
            && self.total_spending == other.total_spending
            && self.tier == other.tier
            && self.cashback_given == other.cashback_given
            && self.welcome_bonus_given == other.welcome_bonus_given
            && self.status == other.status
    }
}

/// Human-readable label for an anchored period index.
pub fn period_label(index: u32) -> String {
    format!("Q{}", index)
}

// ─── Reward Ledger ──────────────────────────────────────────────────────────

/// Kinds of events recorded in the reward ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LedgerEntryType {
    /// One-time cashback on the first anchored window's spending.
    #[serde(rename = "ACTIVE_CASHBACK_3M")]
    ActiveCashback3m,
    #[serde(rename = "WELCOME_BONUS")]
    WelcomeBonus,
    /// Points for a single transaction.
    #[serde(rename = "POINT_TX")]
    PointTx,
    /// Manual administrative correction.
    #[serde(rename = "ADJUST")]
    Adjust,
}

/// Append-only point or monetary grant/debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardLedgerEntry {
    pub id: Uuid,
    pub customer_id: CustomerId,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub points: Option<i64>,
    pub amount: Option<Amount>,
    pub reference_id: Option<String>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl RewardLedgerEntry {
    fn new(customer_id: &str, entry_type: LedgerEntryType, note: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            entry_type,
            points: None,
            amount: None,
            reference_id: None,
            note: note.into(),
            created_at: Utc::now(),
        }
    }

    /// A point-denominated entry.
    pub fn points(
        customer_id: &str,
        entry_type: LedgerEntryType,
        points: i64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            points: Some(points),
            ..Self::new(customer_id, entry_type, note)
        }
    }

    /// A money-denominated entry.
    pub fn amount(
        customer_id: &str,
        entry_type: LedgerEntryType,
        amount: Amount,
        note: impl Into<String>,
    ) -> Self {
        Self {
            amount: Some(amount),
            ..Self::new(customer_id, entry_type, note)
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}

/// Authoritative customer balance: the sum of all ledger entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBalance {
    pub points: i64,
    pub cashback: Amount,
}

impl CustomerBalance {
    /// Sum the entries. A total outside the `i64` range is rejected.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a RewardLedgerEntry>,
    ) -> RewardsResult<Self> {
        let mut balance = Self::default();
        for e in entries {
            balance.points = balance
                .points
                .checked_add(e.points.unwrap_or(0))
                .ok_or_else(|| overflow(&e.customer_id, "points"))?;
            balance.cashback = balance
                .cashback
                .checked_add(e.amount.unwrap_or(0))
                .ok_or_else(|| overflow(&e.customer_id, "cashback"))?;
        }
        Ok(balance)
    }
}

fn overflow(customer_id: &str, field: &str) -> RewardsError {
    RewardsError::Validation(format!(
        "{} balance of customer {} overflows",
        field, customer_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_serializes_uppercase() {
        let json = serde_json::to_string(&MembershipTier::Platinum).unwrap();
        assert_eq!(json, "\"PLATINUM\"");
        let tier: MembershipTier = serde_json::from_str("\"GOLD\"").unwrap();
        assert_eq!(tier, MembershipTier::Gold);
    }

    #[test]
    fn test_ledger_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&LedgerEntryType::ActiveCashback3m).unwrap(),
            "\"ACTIVE_CASHBACK_3M\""
        );
        assert_eq!(
            serde_json::to_string(&LedgerEntryType::PointTx).unwrap(),
            "\"POINT_TX\""
        );
    }

    #[test]
    fn test_balance_sums_points_and_amounts() {
        let entries = vec![
            RewardLedgerEntry::amount("c1", LedgerEntryType::ActiveCashback3m, 60_000, "cashback"),
            RewardLedgerEntry::points("c1", LedgerEntryType::WelcomeBonus, 500, "welcome"),
            RewardLedgerEntry::points("c1", LedgerEntryType::PointTx, 12, "tx")
                .with_reference("tx-9"),
            RewardLedgerEntry::points("c1", LedgerEntryType::Adjust, -2, "correction"),
        ];
        let balance = CustomerBalance::from_entries(&entries).unwrap();
        assert_eq!(balance.points, 510);
        assert_eq!(balance.cashback, 60_000);
        assert_eq!(entries[2].reference_id.as_deref(), Some("tx-9"));
    }

    #[test]
    fn test_balance_overflow_is_rejected() {
        let entries = vec![
            RewardLedgerEntry::points("c1", LedgerEntryType::Adjust, i64::MAX, "a"),
            RewardLedgerEntry::points("c1", LedgerEntryType::Adjust, 1, "b"),
        ];
        assert!(matches!(
            CustomerBalance::from_entries(&entries),
            Err(RewardsError::Validation(_))
        ));
    }

    #[test]
    fn test_period_label() {
        assert_eq!(period_label(1), "Q1");
        assert_eq!(period_label(12), "Q12");
    }
}
