use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque customer identifier.
pub type CustomerId = String;

/// Monetary amount in whole base-currency units (no fractional sub-units).
pub type Amount = i64;

/// One shipment billed to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub customer_id: CustomerId,
    pub date: NaiveDate,
    /// Published shipping rate; the amount all spending and points derive from.
    pub publish_rate: Amount,
    /// Hello Discount stamped at creation. Never changed afterwards.
    #[serde(default)]
    pub discount_amount: Amount,
    /// Back-filled once by the quarterly engine.
    #[serde(default)]
    pub points_earned: Option<i64>,
}

impl Transaction {
    /// A transaction that already carries positive points is never re-pointed.
    pub fn has_points(&self) -> bool {
        self.points_earned.map_or(false, |p| p > 0)
    }
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Filter for `select_transactions`. Results are always ordered by
/// (customer, date, id).
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub customer_id: Option<CustomerId>,
    pub date_range: Option<DateRange>,
}

impl TransactionFilter {
    pub fn customer(customer_id: &str) -> Self {
        Self {
            customer_id: Some(customer_id.to_string()),
            date_range: None,
        }
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(customer) = &self.customer_id {
            if &tx.customer_id != customer {
                return false;
            }
        }
        self.date_range.map_or(true, |r| r.contains(tx.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(customer: &str, d: NaiveDate, points: Option<i64>) -> Transaction {
        Transaction {
            id: "tx-1".to_string(),
            customer_id: customer.to_string(),
            date: d,
            publish_rate: 100_000,
            discount_amount: 0,
            points_earned: points,
        }
    }

    #[test]
    fn test_date_range_is_half_open() {
        let range = DateRange::new(date(2024, 1, 15), date(2024, 4, 15));
        assert!(range.contains(date(2024, 1, 15)));
        assert!(range.contains(date(2024, 4, 14)));
        assert!(!range.contains(date(2024, 4, 15)));
    }

    #[test]
    fn test_has_points() {
        assert!(!tx("c1", date(2024, 1, 1), None).has_points());
        assert!(!tx("c1", date(2024, 1, 1), Some(0)).has_points());
        assert!(!tx("c1", date(2024, 1, 1), Some(-3)).has_points());
        assert!(tx("c1", date(2024, 1, 1), Some(7)).has_points());
    }

    #[test]
    fn test_filter_matches() {
        let t = tx("c1", date(2024, 2, 1), None);
        assert!(TransactionFilter::default().matches(&t));
        assert!(TransactionFilter::customer("c1").matches(&t));
        assert!(!TransactionFilter::customer("c2").matches(&t));
        let outside = TransactionFilter::customer("c1")
            .within(DateRange::new(date(2024, 2, 2), date(2024, 5, 2)));
        assert!(!outside.matches(&t));
    }
}
