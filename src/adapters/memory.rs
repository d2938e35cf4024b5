//! In-process collaborators for tests and demos

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Candle, StrategyConfig, StrategyId};
use crate::error::{EngineError, Result};
use crate::strategy::traits::{MarketDataSource, StrategyRepository};

/// Thread-safe strategy store keyed by id
#[derive(Debug, Clone, Default)]
pub struct InMemoryStrategyStore {
    records: Arc<RwLock<HashMap<StrategyId, StrategyConfig>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole record
    pub async fn insert(&self, strategy: StrategyConfig) {
        let mut records = self.records.write().await;
        records.insert(strategy.id, strategy);
    }

    pub async fn get(&self, id: StrategyId) -> Option<StrategyConfig> {
        let records = self.records.read().await;
        records.get(&id).cloned()
    }

    /// Edit a record in place, as an operator would out of band
    pub async fn update<F>(&self, id: StrategyId, edit: F) -> bool
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(strategy) => {
                edit(strategy);
                true
            }
            None => false,
        }
    }

    /// Make every subsequent write fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, id: StrategyId) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Persistence(format!(
                "write rejected for strategy {}",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StrategyRepository for InMemoryStrategyStore {
    async fn get_by_id(&self, id: StrategyId) -> Result<Option<StrategyConfig>> {
        Ok(self.get(id).await)
    }

    async fn save_lifecycle(&self, strategy: &StrategyConfig) -> Result<()> {
        self.check_writable(strategy.id)?;
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&strategy.id)
            .ok_or(EngineError::StrategyNotFound(strategy.id))?;

        stored.is_active = strategy.is_active;
        stored.status = strategy.status;
        stored.started_at = strategy.started_at;
        stored.stopped_at = strategy.stopped_at;
        Ok(())
    }

    async fn save_progress(&self, strategy: &StrategyConfig) -> Result<()> {
        self.check_writable(strategy.id)?;
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&strategy.id)
            .ok_or(EngineError::StrategyNotFound(strategy.id))?;

        stored.current_balance = strategy.current_balance;
        stored.total_trades = strategy.total_trades;
        stored.last_run_at = strategy.last_run_at;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StrategyConfig>> {
        let records = self.records.read().await;
        let mut all: Vec<StrategyConfig> = records.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }

    async fn list_active(&self) -> Result<Vec<StrategyConfig>> {
        let mut all = self.list_all().await?;
        all.retain(|s| s.is_active);
        Ok(all)
    }
}

/// Fixed candle windows per symbol
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    windows: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the window served for `symbol` (any timeframe)
    pub async fn set(&self, symbol: &str, candles: Vec<Candle>) {
        let mut windows = self.windows.write().await;
        windows.insert(symbol.to_string(), candles);
    }

    /// Fail every request while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Requests served so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn latest(&self, symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::MarketDataUnavailable(format!(
                "no feed for {}",
                symbol
            )));
        }

        let windows = self.windows.read().await;
        let candles = windows.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }
}
