use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored strategy record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(pub i64);

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StrategyId {
    fn from(id: i64) -> Self {
        StrategyId(id)
    }
}

/// Signal algorithm a strategy runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyType {
    #[serde(rename = "ma_crossover")]
    MaCrossover,
    #[serde(rename = "rsi", alias = "rsi_trading")]
    RsiTrading,
    #[serde(rename = "macd", alias = "macd_trading")]
    MacdTrading,
    #[serde(rename = "dca")]
    Dca,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::MaCrossover => "ma_crossover",
            StrategyType::RsiTrading => "rsi",
            StrategyType::MacdTrading => "macd",
            StrategyType::Dca => "dca",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for StrategyType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "ma_crossover" => Ok(StrategyType::MaCrossover),
            "rsi" | "rsi_trading" => Ok(StrategyType::RsiTrading),
            "macd" | "macd_trading" => Ok(StrategyType::MacdTrading),
            "dca" => Ok(StrategyType::Dca),
            _ => Err(format!("Unknown strategy type: {}", s)),
        }
    }
}

/// Persisted run status, mirrors `is_active` at transition boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Inactive,
    Active,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Inactive => "inactive",
            StrategyStatus::Active => "active",
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for StrategyStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "inactive" => Ok(StrategyStatus::Inactive),
            "active" => Ok(StrategyStatus::Active),
            _ => Err(format!("Unknown strategy status: {}", s)),
        }
    }
}

/// A stored strategy record.
///
/// Created and edited by the management surface; the engine only reads it to
/// seed a loop and writes back the lifecycle and ledger fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    pub name: String,
    pub strategy_type: StrategyType,
    /// Type-specific options, see [`crate::strategy::StrategyParams`]
    pub parameters: serde_json::Value,
    pub symbol: String,
    pub timeframe: String,
    pub is_active: bool,
    pub status: StrategyStatus,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub total_trades: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl StrategyConfig {
    /// New inactive record with its balance set to `initial_balance`
    pub fn new(
        id: impl Into<StrategyId>,
        name: &str,
        strategy_type: StrategyType,
        symbol: &str,
        timeframe: &str,
        initial_balance: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            strategy_type,
            parameters: serde_json::Value::Object(serde_json::Map::new()),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            is_active: false,
            status: StrategyStatus::Inactive,
            initial_balance,
            current_balance: initial_balance,
            total_trades: 0,
            started_at: None,
            stopped_at: None,
            last_run_at: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Mark as running from `now`
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.is_active = true;
        self.status = StrategyStatus::Active;
        self.started_at = Some(now);
    }

    /// Mark as stopped at `now`
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.status = StrategyStatus::Inactive;
        self.stopped_at = Some(now);
    }

    /// Reference point for interval scheduling: last cycle, else start time
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_run_at.or(self.started_at)
    }
}
