//! Engine entry points. Each run loads one program snapshot, processes every
//! customer through the worker pool and reports a single success summary or
//! a single error.

use crate::initial::{InitialEngine, InitialRunReport};
use crate::quarterly::{
    require_quarterly_config, QuarterlyCounts, QuarterlyEngine, QuarterlyRunReport,
};
use crate::runner::for_each_customer;
use crate::store::{load_program_snapshot, RewardsStore};
use chrono::NaiveDate;
use rewards_core::config::EngineConfig;
use rewards_core::{RewardsError, RewardsResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Owns the datastore handle and serializes engine runs in this process.
pub struct AccrualService {
    store: Arc<dyn RewardsStore>,
    config: EngineConfig,
    run_guard: Mutex<()>,
}

impl AccrualService {
    pub fn new(store: Arc<dyn RewardsStore>, config: EngineConfig) -> Self {
        info!(
            workers = config.workers,
            max_periods = config.max_periods,
            fixed_today = ?config.today,
            "Accrual service initialized"
        );
        Self {
            store,
            config,
            run_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RewardsStore> {
        &self.store
    }

    /// "Today" for runs triggered without an explicit date.
    pub fn today(&self) -> NaiveDate {
        self.config.today()
    }

    /// Grant first-period cashback and welcome bonus where due.
    pub async fn run_initial_engine(&self, today: NaiveDate) -> RewardsResult<InitialRunReport> {
        let _guard = self.run_guard.try_lock().map_err(|_| RewardsError::EngineBusy)?;
        let started = Instant::now();
        info!(today = %today, "Initial engine run started");

        let result = async {
            let program = Arc::new(load_program_snapshot(self.store.as_ref())?);
            let engine = Arc::new(InitialEngine::new(self.store.clone(), program, today));
            let customers = self.store.customer_ids()?;
            let summaries =
                for_each_customer(customers, self.config.workers, move |customer_id: &str| {
                    engine.process_customer(customer_id)
                })
                .await?;

            let mut customers: Vec<_> = summaries.into_iter().flatten().collect();
            customers.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
            Ok::<_, RewardsError>(InitialRunReport {
                run_date: today,
                customers,
            })
        }
        .await;

        record_outcome("initial", &result, started);
        if let Ok(report) = &result {
            info!(
                customers = report.customers.len(),
                cashback_grants = report.cashback_grants(),
                welcome_bonus_grants = report.welcome_bonus_grants(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Initial engine run completed"
            );
        }
        result
    }

    /// Rebuild every customer's period chain and back-fill points.
    pub async fn run_quarterly_engine(
        &self,
        today: NaiveDate,
    ) -> RewardsResult<QuarterlyRunReport> {
        let _guard = self.run_guard.try_lock().map_err(|_| RewardsError::EngineBusy)?;
        let started = Instant::now();
        info!(today = %today, "Quarterly engine run started");

        let result = async {
            let program = load_program_snapshot(self.store.as_ref())?;
            require_quarterly_config(&program)?;
            let engine = Arc::new(QuarterlyEngine::new(
                self.store.clone(),
                Arc::new(program),
                today,
                self.config.max_periods,
            ));
            let customers = self.store.customer_ids()?;
            let outcomes =
                for_each_customer(customers, self.config.workers, move |customer_id: &str| {
                    engine.process_customer(customer_id)
                })
                .await?;

            let mut counts = QuarterlyCounts::default();
            let mut customers_processed = 0;
            for outcome in outcomes.into_iter().flatten() {
                customers_processed += 1;
                counts += outcome;
            }
            Ok::<_, RewardsError>(QuarterlyRunReport {
                run_date: today,
                customers_processed,
                counts,
            })
        }
        .await;

        record_outcome("quarterly", &result, started);
        if let Ok(report) = &result {
            info!(
                customers = report.customers_processed,
                periods_created = report.counts.periods_created,
                periods_updated = report.counts.periods_updated,
                transactions_pointed = report.counts.transactions_pointed,
                points_awarded = report.counts.points_awarded,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Quarterly engine run completed"
            );
        }
        result
    }
}

fn record_outcome<T>(engine: &'static str, result: &RewardsResult<T>, started: Instant) {
    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::counter!("accrual.runs", "engine" => engine, "outcome" => outcome).increment(1);
    metrics::histogram!("accrual.run_duration_seconds", "engine" => engine)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        error!(engine = engine, error = %e, "Engine run aborted");
    }
}
