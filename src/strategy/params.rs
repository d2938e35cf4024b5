//! Typed view over a strategy's free-form `parameters` object.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::domain::StrategyType;
use crate::error::{EngineError, Result};

/// Options read from a strategy record's `parameters` JSON.
///
/// Keys are accepted in both the stored snake_case form and camelCase.
/// Missing keys fall back to their defaults; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Short SMA length for MA crossover
    #[serde(alias = "shortPeriod")]
    pub short_period: usize,
    /// Long SMA length for MA crossover
    #[serde(alias = "longPeriod")]
    pub long_period: usize,
    /// Accepted for compatibility; the RSI generator always uses 14
    #[serde(alias = "rsiPeriod")]
    pub rsi_period: usize,
    /// Accepted for compatibility; the RSI generator always uses 30
    #[serde(alias = "oversoldThreshold")]
    pub oversold_threshold: f64,
    /// Accepted for compatibility; the RSI generator always uses 70
    #[serde(alias = "overboughtThreshold")]
    pub overbought_threshold: f64,
    /// Fraction of the current balance committed per buy
    #[serde(alias = "riskPerTrade")]
    pub risk_per_trade: Decimal,
    /// Hours between two DCA buys
    #[serde(alias = "intervalHours")]
    pub interval_hours: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            short_period: 10,
            long_period: 20,
            rsi_period: 14,
            oversold_threshold: 30.0,
            overbought_threshold: 70.0,
            risk_per_trade: dec!(0.02),
            interval_hours: 24.0,
        }
    }
}

impl StrategyParams {
    /// Parse and validate a record's parameters. `null` yields the defaults.
    ///
    /// Only the keys `strategy_type` reads are range-checked.
    pub fn from_value(strategy_type: StrategyType, value: &serde_json::Value) -> Result<Self> {
        let params: StrategyParams = if value.is_null() {
            StrategyParams::default()
        } else {
            serde_json::from_value(value.clone())
                .map_err(|e| EngineError::InvalidParameters(e.to_string()))?
        };
        params.validate(strategy_type)?;
        Ok(params)
    }

    fn validate(&self, strategy_type: StrategyType) -> Result<()> {
        match strategy_type {
            StrategyType::MaCrossover => self.validate_moving_averages()?,
            StrategyType::Dca => self.validate_interval()?,
            StrategyType::RsiTrading | StrategyType::MacdTrading => {}
        }
        if self.risk_per_trade < Decimal::ZERO || self.risk_per_trade > Decimal::ONE {
            return Err(EngineError::InvalidParameters(format!(
                "risk_per_trade must be between 0 and 1, got {}",
                self.risk_per_trade
            )));
        }
        Ok(())
    }

    fn validate_moving_averages(&self) -> Result<()> {
        if self.short_period == 0 || self.long_period == 0 {
            return Err(EngineError::InvalidParameters(
                "moving average periods must be positive".to_string(),
            ));
        }
        if self.short_period > self.long_period {
            return Err(EngineError::InvalidParameters(format!(
                "short_period {} exceeds long_period {}",
                self.short_period, self.long_period
            )));
        }
        Ok(())
    }

    fn validate_interval(&self) -> Result<()> {
        if !self.interval_hours.is_finite() || self.interval_hours < 0.0 {
            return Err(EngineError::InvalidParameters(format!(
                "interval_hours must be a non-negative number, got {}",
                self.interval_hours
            )));
        }
        Ok(())
    }
}
