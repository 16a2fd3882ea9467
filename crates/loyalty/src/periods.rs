//! Period builder: anchored, contiguous 3-month windows per customer.
//!
//! Period 1 starts on the customer's first transaction date. Each period is
//! `[start, start + 3 months)` and the next one starts where it ended, so
//! every period is exactly three calendar months long. Month-end clamping
//! carries forward: a Nov 30 anchor gives Feb 29, then May 29.

use chrono::{Months, NaiveDate};
use rewards_core::loyalty::{MembershipTier, PeriodStatus};
use rewards_core::program::ProgramSnapshot;
use rewards_core::types::{Amount, DateRange, Transaction};
use rewards_core::{RewardsError, RewardsResult};

use crate::rules::tier_from_spending;

/// Length of one anchored period.
pub const PERIOD_MONTHS: u32 = 3;

/// A period with its own spending, before any tier logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarePeriod {
    pub index: u32,
    pub range: DateRange,
    pub spending: Amount,
    pub status: PeriodStatus,
}

/// The period starting on `start`.
fn period_from(start: NaiveDate) -> Option<DateRange> {
    let end = start.checked_add_months(Months::new(PERIOD_MONTHS))?;
    Some(DateRange::new(start, end))
}

/// Bounds of the `index`-th period from `anchor`. `None` past the calendar's range.
pub fn period_bounds(anchor: NaiveDate, index: u32) -> Option<DateRange> {
    if index == 0 {
        return None;
    }
    let mut range = period_from(anchor)?;
    for _ in 1..index {
        range = period_from(range.end)?;
    }
    Some(range)
}

/// Earliest transaction date, if any.
pub fn first_transaction_date(transactions: &[Transaction]) -> Option<NaiveDate> {
    transactions.iter().map(|t| t.date).min()
}

/// Sum of publish rates dated inside `range`. A total outside the `i64`
/// range is rejected rather than wrapped.
pub fn spending_within(transactions: &[Transaction], range: DateRange) -> RewardsResult<Amount> {
    transactions
        .iter()
        .filter(|t| range.contains(t.date))
        .try_fold(0 as Amount, |total, t| {
            total.checked_add(t.publish_rate).ok_or_else(|| {
                RewardsError::Validation(format!(
                    "spending of customer {} in [{}, {}) overflows",
                    t.customer_id, range.start, range.end
                ))
            })
        })
}

/// Partition a customer's history into anchored periods up to the one
/// containing `today`, stopping after `max_periods` regardless.
///
/// Empty history yields no periods. The last period is `Current`, the one
/// before it `Previous`, every other `Past`.
pub fn build_periods(
    transactions: &[Transaction],
    today: NaiveDate,
    max_periods: usize,
) -> RewardsResult<Vec<BarePeriod>> {
    let Some(anchor) = first_transaction_date(transactions) else {
        return Ok(Vec::new());
    };

    let mut periods = Vec::new();
    let mut start = anchor;
    for index in 1..=max_periods as u32 {
        let Some(range) = period_from(start) else {
            break;
        };
        periods.push(BarePeriod {
            index,
            range,
            spending: spending_within(transactions, range)?,
            status: PeriodStatus::Past,
        });
        if today < range.end {
            break;
        }
        start = range.end;
    }

    let count = periods.len();
    for (position, period) in periods.iter_mut().enumerate() {
        period.status = status_for(position, count);
    }
    Ok(periods)
}

fn status_for(position: usize, count: usize) -> PeriodStatus {
    if position + 1 == count {
        PeriodStatus::Current
    } else if position + 2 == count {
        PeriodStatus::Previous
    } else {
        PeriodStatus::Past
    }
}

/// Which engine owns a period's spending and tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    /// Period 1. Spending is the period's own; stamped by the initial engine.
    First { spending: Amount, tier: MembershipTier },
    /// Period 2+. Spending is the preceding period's; tier is earned by it.
    Trailing { prev_spending: Amount, tier: MembershipTier },
}

/// A bare period placed in its chain, with its predecessor and ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPeriod {
    pub index: u32,
    pub range: DateRange,
    pub prev: Option<DateRange>,
    pub status: PeriodStatus,
    pub kind: PeriodKind,
}

impl ChainPeriod {
    /// Tier that governs points for transactions inside this period.
    pub fn earning_tier(&self) -> Option<(Amount, MembershipTier)> {
        match self.kind {
            PeriodKind::First { .. } => None,
            PeriodKind::Trailing { prev_spending, tier } => Some((prev_spending, tier)),
        }
    }
}

/// Attach trailing-window tiers: period `i`'s tier depends only on period
/// `i-1`'s spending.
pub fn chain_periods(periods: &[BarePeriod], program: &ProgramSnapshot) -> Vec<ChainPeriod> {
    let mut chain: Vec<ChainPeriod> = Vec::with_capacity(periods.len());
    let mut previous: Option<&BarePeriod> = None;
    for period in periods {
        let kind = match previous {
            None => PeriodKind::First {
                spending: period.spending,
                tier: tier_from_spending(program, period.spending),
            },
            Some(prev) => PeriodKind::Trailing {
                prev_spending: prev.spending,
                tier: tier_from_spending(program, prev.spending),
            },
        };
        chain.push(ChainPeriod {
            index: period.index,
            range: period.range,
            prev: previous.map(|p| p.range),
            status: period.status,
            kind,
        });
        previous = Some(period);
    }
    chain
}

/// The period whose half-open range holds `date`.
pub fn containing(chain: &[ChainPeriod], date: NaiveDate) -> Option<&ChainPeriod> {
    chain.iter().find(|p| p.range.contains(date))
}
