//! Rewards Server: loyalty accrual engines for shipment customers.
//!
//! Serves the REST API or runs one engine pass as a batch job against a JSON
//! datastore snapshot.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rewards_api::ApiServer;
use rewards_core::config::AppConfig;
use rewards_loyalty::{AccrualService, InMemoryStore, RewardsStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rewards-server")]
#[command(about = "Rewards accrual engine for a logistics loyalty program")]
#[command(version)]
struct Cli {
    /// JSON datastore snapshot (overrides config)
    #[arg(long, global = true, env = "REWARDS__STORE__DATA_FILE")]
    data: Option<String>,

    /// Evaluation date as YYYY-MM-DD (overrides config)
    #[arg(long, global = true, env = "REWARDS__ENGINE__TODAY")]
    today: Option<NaiveDate>,

    /// Customers processed concurrently (overrides config)
    #[arg(long, global = true, env = "REWARDS__ENGINE__WORKERS")]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST API
    Serve {
        /// HTTP port (overrides config)
        #[arg(long, env = "REWARDS__API__HTTP_PORT")]
        http_port: Option<u16>,

        /// Metrics port (overrides config)
        #[arg(long, env = "REWARDS__METRICS__PORT")]
        metrics_port: Option<u16>,
    },
    /// Run the initial engine once and print its report
    RunInitial,
    /// Run the quarterly engine once and print its report
    RunQuarterly,
}

fn open_store(data_file: Option<&str>) -> anyhow::Result<Arc<InMemoryStore>> {
    match data_file {
        Some(path) if Path::new(path).exists() => {
            let store = InMemoryStore::load_json(path)?;
            info!(path = %path, "Datastore snapshot loaded");
            Ok(Arc::new(store))
        }
        Some(path) => {
            warn!(path = %path, "Datastore snapshot not found, starting empty");
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => {
            warn!("No datastore snapshot configured, state will not persist");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn persist(store: &InMemoryStore, data_file: Option<&str>) -> anyhow::Result<()> {
    if let Some(path) = data_file {
        store.save_json(path)?;
        info!(path = %path, "Datastore snapshot saved");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rewards_server=info,rewards_loyalty=info,rewards_api=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Rewards server starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(data) = cli.data {
        config.store.data_file = Some(data);
    }
    if let Some(today) = cli.today {
        config.engine.today = Some(today);
    }
    if let Some(workers) = cli.workers {
        config.engine.workers = workers;
    }
    if let Command::Serve {
        http_port,
        metrics_port,
    } = &cli.command
    {
        if let Some(port) = http_port {
            config.api.http_port = *port;
        }
        if let Some(port) = metrics_port {
            config.metrics.port = *port;
        }
    }

    info!(
        http_port = config.api.http_port,
        workers = config.engine.workers,
        max_periods = config.engine.max_periods,
        data_file = ?config.store.data_file,
        "Configuration loaded"
    );

    let data_file = config.store.data_file.clone();
    let store = open_store(data_file.as_deref())?;
    let dyn_store: Arc<dyn RewardsStore> = store.clone();
    let service = Arc::new(AccrualService::new(dyn_store, config.engine.clone()));
    let today = service.today();

    match cli.command {
        Command::Serve { .. } => {
            let api_server = ApiServer::new(config.clone(), service);

            // Start metrics exporter
            if let Err(e) = api_server.start_metrics() {
                error!(error = %e, "Failed to start metrics exporter");
            }

            info!("Rewards server is ready to serve traffic");

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown signal received");
            };
            api_server.start_http(shutdown).await?;
            persist(&store, data_file.as_deref())?;
        }
        Command::RunInitial => {
            // Customers committed before a failure stay committed.
            let result = service.run_initial_engine(today).await;
            persist(&store, data_file.as_deref())?;
            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::RunQuarterly => {
            // Customers committed before a failure stay committed.
            let result = service.run_quarterly_engine(today).await;
            persist(&store, data_file.as_deref())?;
            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
