//! Per-cycle signal generation
//!
//! Each strategy type maps a candle window to one [`Decision`]. Generators
//! are pure: they never touch the ledger or storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::indicators::{self, MACD_SLOW, RSI_PERIOD};
use super::params::StrategyParams;
use crate::domain::{closes, Candle, StrategyConfig, StrategyType};

/// RSI below this is oversold
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI above this is overbought
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    /// No action this cycle
    Hold,
}

impl Decision {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::Hold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time inputs for schedule-driven generators
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
    /// `last_run_at`, else `started_at`
    pub last_activity: Option<DateTime<Utc>>,
}

impl EvalContext {
    pub fn for_strategy(strategy: &StrategyConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            last_activity: strategy.last_activity(),
        }
    }
}

/// Signal algorithm bound to its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum SignalGenerator {
    MaCrossover { short_period: usize, long_period: usize },
    Rsi,
    Macd,
    Dca { interval_secs: f64 },
}

impl SignalGenerator {
    pub fn new(strategy_type: StrategyType, params: &StrategyParams) -> Self {
        match strategy_type {
            StrategyType::MaCrossover => SignalGenerator::MaCrossover {
                short_period: params.short_period,
                long_period: params.long_period,
            },
            StrategyType::RsiTrading => SignalGenerator::Rsi,
            StrategyType::MacdTrading => SignalGenerator::Macd,
            StrategyType::Dca => SignalGenerator::Dca {
                interval_secs: params.interval_hours * 3600.0,
            },
        }
    }

    pub fn evaluate(&self, window: &[Candle], ctx: &EvalContext) -> Decision {
        match self {
            SignalGenerator::MaCrossover {
                short_period,
                long_period,
            } => ma_crossover(window, *short_period, *long_period),
            SignalGenerator::Rsi => rsi_trading(window),
            SignalGenerator::Macd => macd_trading(window),
            SignalGenerator::Dca { interval_secs } => dca(ctx, *interval_secs),
        }
    }
}

fn ma_crossover(window: &[Candle], short_period: usize, long_period: usize) -> Decision {
    if short_period == 0 || short_period > long_period || window.len() < long_period + 1 {
        return Decision::Hold;
    }

    let closes = closes(window);
    let n = closes.len();
    let current = &closes[n - long_period..];
    let previous = &closes[n - long_period - 1..n - 1];

    let averages = |slice: &[f64]| {
        let short = indicators::sma(&slice[slice.len() - short_period..]);
        let long = indicators::sma(slice);
        short.zip(long)
    };

    let (Some((short_ma, long_ma)), Some((prev_short_ma, prev_long_ma))) =
        (averages(current), averages(previous))
    else {
        return Decision::Hold;
    };

    if prev_short_ma <= prev_long_ma && short_ma > long_ma {
        Decision::Buy
    } else if prev_short_ma >= prev_long_ma && short_ma < long_ma {
        Decision::Sell
    } else {
        Decision::Hold
    }
}

fn rsi_trading(window: &[Candle]) -> Decision {
    if window.len() < RSI_PERIOD {
        return Decision::Hold;
    }

    let closes = closes(&window[window.len() - RSI_PERIOD..]);
    rsi_decision(indicators::rsi(&closes))
}

/// Strict thresholds: exactly 30 or 70 holds
pub fn rsi_decision(rsi: f64) -> Decision {
    if rsi < RSI_OVERSOLD {
        Decision::Buy
    } else if rsi > RSI_OVERBOUGHT {
        Decision::Sell
    } else {
        Decision::Hold
    }
}

fn macd_trading(window: &[Candle]) -> Decision {
    if window.len() < MACD_SLOW {
        return Decision::Hold;
    }

    let closes = closes(&window[window.len() - MACD_SLOW..]);
    let value = indicators::macd(&closes);

    if value.macd_line > value.signal_line && value.macd_line > 0.0 {
        Decision::Buy
    } else if value.macd_line < value.signal_line && value.macd_line < 0.0 {
        Decision::Sell
    } else {
        Decision::Hold
    }
}

fn dca(ctx: &EvalContext, interval_secs: f64) -> Decision {
    let Some(last) = ctx.last_activity else {
        return Decision::Hold;
    };

    let elapsed = (ctx.now - last).num_milliseconds() as f64 / 1000.0;
    if elapsed >= interval_secs {
        Decision::Buy
    } else {
        Decision::Hold
    }
}
