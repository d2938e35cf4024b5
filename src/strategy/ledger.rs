//! Simulated position ledger
//!
//! Buys move a fraction of the running balance into a notional position.
//! Sells are only recorded as events: no open-position table is kept, so no
//! realized P&L is computed.

use rust_decimal::Decimal;
use tracing::info;

use super::signal::Decision;
use crate::domain::{Candle, StrategyConfig};
use crate::error::{EngineError, Result};

/// What a decision did to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Buy {
        price: Decimal,
        position_size: Decimal,
        quantity: Decimal,
        balance_after: Decimal,
    },
    Sell {
        price: Decimal,
    },
}

pub struct PositionLedger;

impl PositionLedger {
    /// Apply `decision` to the in-memory record. Returns `None` for a hold.
    ///
    /// Nothing is mutated when an error is returned.
    pub fn apply(
        strategy: &mut StrategyConfig,
        decision: Decision,
        last_candle: &Candle,
        risk_per_trade: Decimal,
    ) -> Result<Option<LedgerEntry>> {
        let price = last_candle.close;

        match decision {
            Decision::Hold => Ok(None),
            Decision::Buy => {
                if price <= Decimal::ZERO {
                    return Err(EngineError::InvalidMarketData(format!(
                        "non-positive close {} for {}",
                        price, strategy.symbol
                    )));
                }

                let position_size = strategy.current_balance * risk_per_trade;
                let quantity = position_size / price;

                strategy.current_balance -= position_size;
                strategy.total_trades += 1;

                info!(
                    strategy_id = %strategy.id,
                    symbol = %strategy.symbol,
                    "BUY {} at {} (size {}, balance {})",
                    quantity.round_dp(8),
                    price,
                    position_size,
                    strategy.current_balance
                );

                Ok(Some(LedgerEntry::Buy {
                    price,
                    position_size,
                    quantity,
                    balance_after: strategy.current_balance,
                }))
            }
            Decision::Sell => {
                info!(
                    strategy_id = %strategy.id,
                    symbol = %strategy.symbol,
                    "SELL signal at {}",
                    price
                );
                Ok(Some(LedgerEntry::Sell { price }))
            }
        }
    }
}
