use thiserror::Error;

use crate::domain::StrategyId;

/// Main error type for the strategy engine
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Strategy record errors
    #[error("Strategy not found: {0}")]
    StrategyNotFound(StrategyId),

    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure reasons surfaced by the control surface (start / stop / restart)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Strategy not found: {0}")]
    NotFound(StrategyId),

    #[error("Failed to persist transition for strategy {id}: {reason}")]
    Persistence { id: StrategyId, reason: String },
}

impl ControlError {
    pub(crate) fn persistence(id: StrategyId, err: impl std::fmt::Display) -> Self {
        ControlError::Persistence {
            id,
            reason: err.to_string(),
        }
    }
}

impl From<ControlError> for EngineError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NotFound(id) => EngineError::StrategyNotFound(id),
            ControlError::Persistence { .. } => EngineError::Persistence(err.to_string()),
        }
    }
}
