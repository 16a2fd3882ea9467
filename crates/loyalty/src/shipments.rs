//! Shipment recording. Stamps the Hello Discount on a customer's first
//! shipment; later shipments are recorded without discount.

use crate::rules::{apply_percent, hello_discount_percent};
use crate::store::{load_program_snapshot, RewardsStore};
use chrono::NaiveDate;
use rewards_core::types::{Amount, Transaction, TransactionFilter};
use rewards_core::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Maximum length of caller-supplied identifiers.
const MAX_ID_LEN: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    /// Caller-assigned id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub customer_id: String,
    pub date: NaiveDate,
    pub publish_rate: Amount,
}

fn validate(shipment: &NewShipment) -> RewardsResult<()> {
    if shipment.customer_id.trim().is_empty() {
        return Err(RewardsError::Validation("customer_id must not be empty".to_string()));
    }
    if shipment.customer_id.len() > MAX_ID_LEN {
        return Err(RewardsError::Validation("customer_id exceeds maximum length".to_string()));
    }
    if let Some(id) = &shipment.id {
        if id.trim().is_empty() || id.len() > MAX_ID_LEN {
            return Err(RewardsError::Validation("transaction id is empty or too long".to_string()));
        }
    }
    if shipment.publish_rate < 0 {
        return Err(RewardsError::Validation("publish_rate must be non-negative".to_string()));
    }
    Ok(())
}

/// Record a shipment as a transaction, applying the Hello Discount when it is
/// the customer's first.
pub fn record_shipment(
    store: &dyn RewardsStore,
    shipment: NewShipment,
) -> RewardsResult<Transaction> {
    validate(&shipment)?;

    let is_first = store
        .select_transactions(&TransactionFilter::customer(&shipment.customer_id))?
        .is_empty();
    let discount_amount = if is_first {
        let program = load_program_snapshot(store)?;
        apply_percent(
            shipment.publish_rate,
            hello_discount_percent(&program, shipment.publish_rate),
        )
    } else {
        0
    };

    let transaction = Transaction {
        id: shipment.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        customer_id: shipment.customer_id,
        date: shipment.date,
        publish_rate: shipment.publish_rate,
        discount_amount,
        points_earned: None,
    };
    store.insert_transaction(transaction.clone())?;

    metrics::counter!("shipments.recorded").increment(1);
    if discount_amount > 0 {
        metrics::counter!("shipments.hello_discount_applied").increment(1);
    }
    info!(
        customer_id = %transaction.customer_id,
        transaction_id = %transaction.id,
        publish_rate = transaction.publish_rate,
        discount = discount_amount,
        "Shipment recorded"
    );
    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use rewards_core::program::ProgramConfigKey;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn shipment(customer: &str, amount: Amount) -> NewShipment {
        NewShipment {
            id: None,
            customer_id: customer.to_string(),
            date: date(2024, 3, 1),
            publish_rate: amount,
        }
    }

    fn store_with_discount() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.put_program_config(
            ProgramConfigKey::HelloDiscount,
            json!({ "tiers": [
                { "min": 0, "max": 499_999, "percent": 5 },
                { "min": 500_000, "percent": 10 }
            ]}),
        );
        store
    }

    #[test]
    fn test_first_shipment_gets_hello_discount() {
        let store = store_with_discount();
        let first = record_shipment(&store, shipment("c1", 600_000)).unwrap();
        assert_eq!(first.discount_amount, 60_000);
        assert_eq!(first.points_earned, None);

        let second = record_shipment(&store, shipment("c1", 600_000)).unwrap();
        assert_eq!(second.discount_amount, 0);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_no_discount_without_config() {
        let store = InMemoryStore::new();
        let tx = record_shipment(&store, shipment("c1", 600_000)).unwrap();
        assert_eq!(tx.discount_amount, 0);
    }

    #[test]
    fn test_rejects_negative_amount_and_blank_customer() {
        let store = store_with_discount();
        assert!(matches!(
            record_shipment(&store, shipment("c1", -1)),
            Err(RewardsError::Validation(_))
        ));
        assert!(matches!(
            record_shipment(&store, shipment("  ", 100)),
            Err(RewardsError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_caller_id_conflicts() {
        let store = store_with_discount();
        let mut s = shipment("c1", 100);
        s.id = Some("awb-1".to_string());
        record_shipment(&store, s.clone()).unwrap();
        assert!(matches!(record_shipment(&store, s), Err(RewardsError::Conflict(_))));
    }
}
