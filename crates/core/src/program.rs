//! Program configuration: the versioned business-rule documents the accrual
//! engines evaluate, and the immutable snapshot a single run holds.

use crate::loyalty::MembershipTier;
use crate::types::Amount;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Keys of the program configuration documents in the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramConfigKey {
    HelloDiscount,
    CashbackRules,
    PointsConfig,
    MembershipTiers,
}

impl ProgramConfigKey {
    pub const ALL: [ProgramConfigKey; 4] = [
        ProgramConfigKey::HelloDiscount,
        ProgramConfigKey::CashbackRules,
        ProgramConfigKey::PointsConfig,
        ProgramConfigKey::MembershipTiers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramConfigKey::HelloDiscount => "hello_discount",
            ProgramConfigKey::CashbackRules => "cashback_rules",
            ProgramConfigKey::PointsConfig => "points_config",
            ProgramConfigKey::MembershipTiers => "membership_tiers",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for ProgramConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

// ─── Rule Documents ─────────────────────────────────────────────────────────

/// One `{min, max, percent}` rule. Lower bound inclusive, upper bound
/// inclusive when present, else unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub min: Amount,
    #[serde(default)]
    pub max: Option<Amount>,
    /// Whole percentage: 5 means 5%.
    pub percent: f64,
}

impl RateTier {
    pub fn matches(&self, amount: Amount) -> bool {
        amount >= self.min && self.max.map_or(true, |max| amount <= max)
    }
}

/// Tiered discount on a customer's first shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloDiscountConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tiers: Vec<RateTier>,
}

/// Cashback tiers over the first anchored window's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashbackRules {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tiers: Vec<RateTier>,
}

/// Per-tier values keyed by `SILVER` / `GOLD` / `PLATINUM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierTable<T> {
    #[serde(rename = "SILVER", default)]
    pub silver: T,
    #[serde(rename = "GOLD", default)]
    pub gold: T,
    #[serde(rename = "PLATINUM", default)]
    pub platinum: T,
}

impl<T: Copy> TierTable<T> {
    pub fn get(&self, tier: MembershipTier) -> T {
        match tier {
            MembershipTier::Silver => self.silver,
            MembershipTier::Gold => self.gold,
            MembershipTier::Platinum => self.platinum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Spending that earns one base point. Non-positive values earn nothing.
    pub base_amount_per_point: Amount,
    #[serde(default)]
    pub multipliers: TierTable<f64>,
    #[serde(default)]
    pub welcome_bonus: TierTable<i64>,
}

/// Spending range with inclusive bounds; `max` absent means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingRange {
    pub min: Amount,
    #[serde(default)]
    pub max: Option<Amount>,
}

impl SpendingRange {
    pub fn contains(&self, amount: Amount) -> bool {
        amount >= self.min && self.max.map_or(true, |max| amount <= max)
    }
}

/// Spending thresholds. Silver is the floor and is never range-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipTiersConfig {
    #[serde(default)]
    pub silver: Option<SpendingRange>,
    pub gold: SpendingRange,
    pub platinum: SpendingRange,
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Immutable view of all program configuration, read once per engine run and
/// passed by reference through the call chain. An absent document means the
/// feature it configures is disabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramSnapshot {
    pub hello_discount: Option<HelloDiscountConfig>,
    pub cashback: Option<CashbackRules>,
    pub points: Option<PointsConfig>,
    pub tiers: Option<MembershipTiersConfig>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl ProgramSnapshot {
    /// Build a snapshot by fetching each document once. Fetch errors propagate;
    /// documents that do not parse are logged and treated as absent.
    pub fn from_documents<E, F>(mut fetch: F) -> Result<Self, E>
    where
        F: FnMut(ProgramConfigKey) -> Result<Option<serde_json::Value>, E>,
    {
        Ok(Self {
            hello_discount: parse_document(
                ProgramConfigKey::HelloDiscount,
                fetch(ProgramConfigKey::HelloDiscount)?,
            ),
            cashback: parse_document(
                ProgramConfigKey::CashbackRules,
                fetch(ProgramConfigKey::CashbackRules)?,
            ),
            points: parse_document(
                ProgramConfigKey::PointsConfig,
                fetch(ProgramConfigKey::PointsConfig)?,
            ),
            tiers: parse_document(
                ProgramConfigKey::MembershipTiers,
                fetch(ProgramConfigKey::MembershipTiers)?,
            ),
            loaded_at: Some(Utc::now()),
        })
    }

    pub fn cashback_enabled(&self) -> bool {
        self.cashback.as_ref().map_or(false, |c| c.enabled)
    }

    pub fn points_enabled(&self) -> bool {
        self.points.as_ref().map_or(false, |p| p.enabled)
    }
}

fn parse_document<T: DeserializeOwned>(
    key: ProgramConfigKey,
    value: Option<serde_json::Value>,
) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key = %key, error = %e, "Malformed program configuration, treating as absent");
            None
        }
    }
}
