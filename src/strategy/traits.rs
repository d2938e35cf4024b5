//! Collaborator ports the engine consumes
//!
//! Storage and market data live outside the engine; these traits are the
//! only surface it depends on.

use async_trait::async_trait;

use crate::domain::{Candle, StrategyConfig, StrategyId};
use crate::error::Result;

// ============================================================================
// Strategy Repository
// ============================================================================

/// Persistent store of strategy records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    /// Load one record, `None` when the id is unknown
    async fn get_by_id(&self, id: StrategyId) -> Result<Option<StrategyConfig>>;

    /// Persist lifecycle fields: `is_active`, `status`, `started_at`, `stopped_at`
    async fn save_lifecycle(&self, strategy: &StrategyConfig) -> Result<()>;

    /// Persist ledger and scheduling fields: `current_balance`,
    /// `total_trades`, `last_run_at`
    ///
    /// Never touches lifecycle fields, so a cycle finishing after a stop
    /// cannot flip the record back to active.
    async fn save_progress(&self, strategy: &StrategyConfig) -> Result<()>;

    /// All records, ordered by id
    async fn list_all(&self) -> Result<Vec<StrategyConfig>>;

    /// Records flagged `is_active`, ordered by id
    async fn list_active(&self) -> Result<Vec<StrategyConfig>>;
}

// ============================================================================
// Market Data Source
// ============================================================================

/// Supplier of recent candles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `limit` most recent candles for `symbol` on `timeframe`,
    /// oldest first. May be empty.
    async fn latest(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
}
