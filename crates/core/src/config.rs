use chrono::NaiveDate;
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `REWARDS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bearer token required on administrative routes (engine triggers, adjustments).
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// ─── Engine Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on anchored periods built per customer. Guards against
    /// runaway period construction on corrupted dates (40 = 10 years).
    #[serde(default = "default_max_periods")]
    pub max_periods: usize,
    /// Customers processed concurrently. A single customer's period chain
    /// is always processed by one worker, in order.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Fixed "today" for reproducible batch runs. `None` uses the UTC date.
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot loaded into the in-memory store at startup.
    #[serde(default)]
    pub data_file: Option<String>,
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_admin_token() -> String {
    String::new()
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_periods() -> usize {
    40
}
fn default_workers() -> usize {
    4
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            admin_token: default_admin_token(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_periods: default_max_periods(),
            workers: default_workers(),
            today: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl EngineConfig {
    /// The date engine runs treat as "today".
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("REWARDS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_periods, 40);
        assert_eq!(config.engine.workers, 4);
        assert_eq!(config.api.http_port, 8080);
        assert!(config.store.data_file.is_none());
        assert!(config.api.admin_token.is_empty());
    }

    #[test]
    fn test_fixed_today() {
        let engine = EngineConfig {
            today: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert_eq!(engine.today(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AppConfig =
            serde_json::from_str(r#"{"engine": {"workers": 2, "today": "2024-03-31"}}"#).unwrap();
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.engine.max_periods, 40);
        assert_eq!(config.engine.today, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(config.api.host, "0.0.0.0");
    }
}
