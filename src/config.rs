use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Execution loop and supervisor tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Delay before retrying a failed cycle
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Ceiling for the retry delay; above `retry_backoff_secs` the delay
    /// doubles per consecutive failure
    #[serde(default = "default_retry_backoff_secs")]
    pub max_retry_backoff_secs: u64,
    /// Upper bound on one market data request
    #[serde(default = "default_market_data_timeout_secs")]
    pub market_data_timeout_secs: u64,
    /// Number of candles requested per cycle
    #[serde(default = "default_candle_window")]
    pub candle_window: usize,
    /// How long restart waits for the old loop to exit
    #[serde(default = "default_restart_join_timeout_secs")]
    pub restart_join_timeout_secs: u64,
    /// Daemon pass that starts newly activated strategies
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_market_data_timeout_secs() -> u64 {
    30
}

fn default_candle_window() -> usize {
    100
}

fn default_restart_join_timeout_secs() -> u64 {
    10
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_backoff_secs: default_retry_backoff_secs(),
            max_retry_backoff_secs: default_retry_backoff_secs(),
            market_data_timeout_secs: default_market_data_timeout_secs(),
            candle_window: default_candle_window(),
            restart_join_timeout_secs: default_restart_join_timeout_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl EngineConfig {
    /// Delay after the `consecutive_failures`-th failure in a row (1-based)
    pub fn retry_delay(&self, consecutive_failures: u32) -> Duration {
        let base = self.retry_backoff_secs;
        let ceiling = self.max_retry_backoff_secs.max(base);
        let doublings = consecutive_failures.saturating_sub(1).min(20);
        Duration::from_secs(base.saturating_mul(1u64 << doublings).min(ceiling))
    }

    pub fn market_data_timeout(&self) -> Duration {
        Duration::from_secs(self.market_data_timeout_secs)
    }

    pub fn restart_join_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_join_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// REST endpoint serving klines
    #[serde(default = "default_market_data_url")]
    pub base_url: String,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_market_data_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotated log files, stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific file, e.g. config/production.toml
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STRATEGY_RUNNER_ENV")
                        .unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // STRATEGY_RUNNER_DATABASE__URL, STRATEGY_RUNNER_ENGINE__CANDLE_WINDOW, ...
            .add_source(
                Environment::with_prefix("STRATEGY_RUNNER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.retry_backoff_secs == 0 {
            errors.push("engine.retry_backoff_secs must be positive".to_string());
        }

        if self.engine.max_retry_backoff_secs < self.engine.retry_backoff_secs {
            errors.push(
                "engine.max_retry_backoff_secs must not be below engine.retry_backoff_secs"
                    .to_string(),
            );
        }

        if self.engine.market_data_timeout_secs == 0 {
            errors.push("engine.market_data_timeout_secs must be positive".to_string());
        }

        if self.engine.candle_window == 0 || self.engine.candle_window > 1000 {
            errors.push("engine.candle_window must be between 1 and 1000".to_string());
        }

        if self.engine.reconcile_interval_secs == 0 {
            errors.push("engine.reconcile_interval_secs must be positive".to_string());
        }

        if self.database.url.is_empty() {
            errors.push("database.url must be set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(engine: EngineConfig) -> AppConfig {
        AppConfig {
            engine,
            database: DatabaseConfig {
                url: "postgres://localhost/strategies".to_string(),
                max_connections: 5,
            },
            market_data: MarketDataConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_default_retry_delay_is_fixed() {
        let engine = EngineConfig::default();
        assert_eq!(engine.retry_delay(1), Duration::from_secs(60));
        assert_eq!(engine.retry_delay(2), Duration::from_secs(60));
        assert_eq!(engine.retry_delay(50), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_delay_doubles_up_to_ceiling() {
        let engine = EngineConfig {
            retry_backoff_secs: 60,
            max_retry_backoff_secs: 300,
            ..EngineConfig::default()
        };
        assert_eq!(engine.retry_delay(1), Duration::from_secs(60));
        assert_eq!(engine.retry_delay(2), Duration::from_secs(120));
        assert_eq!(engine.retry_delay(3), Duration::from_secs(240));
        assert_eq!(engine.retry_delay(4), Duration::from_secs(300));
        assert_eq!(engine.retry_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_validate() {
        assert!(app_config(EngineConfig::default()).validate().is_ok());

        let errors = app_config(EngineConfig {
            retry_backoff_secs: 0,
            candle_window: 0,
            ..EngineConfig::default()
        })
        .validate()
        .unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
