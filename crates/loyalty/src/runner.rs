//! Bounded cross-customer worker pool for engine runs.

use rewards_core::types::CustomerId;
use rewards_core::{RewardsError, RewardsResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Run `work` for every customer with at most `workers` customers in flight.
///
/// Each customer runs start to finish on one blocking task, so its period
/// chain is processed in order. The first failure closes the pool: no new
/// customers start, those in flight finish, and the error is returned.
/// Results come back in completion order.
pub async fn for_each_customer<T, F>(
    customers: Vec<CustomerId>,
    workers: usize,
    work: F,
) -> RewardsResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&str) -> RewardsResult<T> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for customer_id in customers {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let work = work.clone();
        let pool = semaphore.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = work(&customer_id);
            if let Err(e) = &result {
                error!(
                    customer_id = %customer_id,
                    error = %e,
                    "Customer processing failed, stopping run"
                );
                pool.close();
            }
            result
        });
    }

    let mut results = Vec::new();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| {
            semaphore.close();
            RewardsError::Internal(anyhow::anyhow!("customer worker failed: {}", e))
        });
        match outcome.and_then(|r| r) {
            Ok(value) => results.push(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids(n: usize) -> Vec<CustomerId> {
        (0..n).map(|i| format!("c{:02}", i)).collect()
    }

    #[tokio::test]
    async fn test_processes_every_customer() {
        let mut out = for_each_customer(ids(10), 3, |id| Ok(id.to_string()))
            .await
            .unwrap();
        out.sort();
        assert_eq!(out, ids(10));
    }

    #[tokio::test]
    async fn test_zero_workers_still_runs_sequentially() {
        let out = for_each_customer(ids(3), 0, |_| Ok(1)).await.unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_customers() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let result = for_each_customer(ids(20), 1, move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            if id == "c03" {
                Err(RewardsError::DataStore("connection reset".to_string()))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(RewardsError::DataStore(_))));
        // Sequential pool: nothing after the failing customer starts.
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }
}
