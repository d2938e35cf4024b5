//! Task Supervisor
//!
//! Owns the registry of running execution loops:
//! - start/stop/restart strategies by id
//! - at most one live loop per id
//! - status projections over stored records
//!
//! Every lifecycle transition is persisted before the registry changes.
//! Operations on the same id serialise on a per-id lock; different ids never
//! contend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::runner::{ExecutionLoop, LoopHandle, LoopState};
use super::traits::{MarketDataSource, StrategyRepository};
use crate::config::EngineConfig;
use crate::domain::{StrategyConfig, StrategyId, StrategyStatus, StrategyType};
use crate::error::{ControlError, Result};

// ============================================================================
// Task Supervisor
// ============================================================================

pub struct TaskSupervisor {
    repo: Arc<dyn StrategyRepository>,
    market_data: Arc<dyn MarketDataSource>,
    config: EngineConfig,
    /// Running loops
    registry: DashMap<StrategyId, LoopHandle>,
    /// Per-id transition locks
    locks: DashMap<StrategyId, Arc<Mutex<()>>>,
}

impl TaskSupervisor {
    pub fn new(
        repo: Arc<dyn StrategyRepository>,
        market_data: Arc<dyn MarketDataSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            market_data,
            config,
            registry: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Serialise transitions on `id`. The map entry is dropped with the last
    /// holder, so ids that never resolve leave nothing behind.
    async fn transition_lock(&self, id: StrategyId) -> TransitionGuard<'_> {
        let lock = self.locks.entry(id).or_default().value().clone();
        TransitionGuard {
            locks: &self.locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn load(&self, id: StrategyId) -> std::result::Result<StrategyConfig, ControlError> {
        self.repo
            .get_by_id(id)
            .await
            .map_err(|e| ControlError::persistence(id, e))?
            .ok_or(ControlError::NotFound(id))
    }

    /// Start a strategy's loop. A no-op if one is already live.
    pub async fn start(&self, id: StrategyId) -> std::result::Result<(), ControlError> {
        let _guard = self.transition_lock(id).await;
        self.start_locked(id).await
    }

    async fn start_locked(&self, id: StrategyId) -> std::result::Result<(), ControlError> {
        let mut strategy = self.load(id).await?;

        let live = self.registry.get(&id).map(|h| h.is_live()).unwrap_or(false);
        if live {
            if !strategy.is_active {
                // Deactivated out of band while the loop was sleeping
                strategy.activate(Utc::now());
                self.repo
                    .save_lifecycle(&strategy)
                    .await
                    .map_err(|e| ControlError::persistence(id, e))?;
            }
            debug!(strategy_id = %id, "Strategy already running");
            return Ok(());
        }

        if let Some((_, stale)) = self.registry.remove(&id) {
            let state = stale.join(self.config.restart_join_timeout()).await;
            debug!(strategy_id = %id, state = %state, "Reaped finished loop");
        }

        strategy.activate(Utc::now());
        self.repo
            .save_lifecycle(&strategy)
            .await
            .map_err(|e| ControlError::persistence(id, e))?;

        let handle = ExecutionLoop::spawn(
            id,
            self.repo.clone(),
            self.market_data.clone(),
            self.config.clone(),
        );
        self.registry.insert(id, handle);

        info!(
            strategy_id = %id,
            name = %strategy.name,
            strategy_type = %strategy.strategy_type,
            symbol = %strategy.symbol,
            timeframe = %strategy.timeframe,
            "Strategy started"
        );
        Ok(())
    }

    /// Stop a strategy's loop. A no-op if the record is already inactive.
    pub async fn stop(&self, id: StrategyId) -> std::result::Result<(), ControlError> {
        let _guard = self.transition_lock(id).await;
        self.stop_locked(id).await
    }

    async fn stop_locked(&self, id: StrategyId) -> std::result::Result<(), ControlError> {
        let mut strategy = self.load(id).await?;

        if !strategy.is_active {
            debug!(strategy_id = %id, "Strategy already inactive");
            return Ok(());
        }

        strategy.deactivate(Utc::now());
        self.repo
            .save_lifecycle(&strategy)
            .await
            .map_err(|e| ControlError::persistence(id, e))?;

        match self.registry.remove(&id) {
            Some((_, handle)) => {
                handle.join(self.config.restart_join_timeout()).await;
            }
            None => debug!(strategy_id = %id, "No loop registered"),
        }

        info!(strategy_id = %id, name = %strategy.name, "Strategy stopped");
        Ok(())
    }

    /// Stop, wait for the old loop to exit, then start
    pub async fn restart(&self, id: StrategyId) -> std::result::Result<(), ControlError> {
        let _guard = self.transition_lock(id).await;

        self.stop_locked(id).await?;

        // Record was already inactive but a loop may still be winding down
        if let Some((_, handle)) = self.registry.remove(&id) {
            handle.join(self.config.restart_join_timeout()).await;
        }

        self.start_locked(id).await?;
        info!(strategy_id = %id, "Strategy restarted");
        Ok(())
    }

    /// Stop every registered strategy
    pub async fn stop_all(&self) {
        let ids = self.registry_ids();

        for id in ids {
            if let Err(e) = self.stop(id).await {
                error!(strategy_id = %id, "Error stopping strategy: {}", e);
            }
        }
    }

    /// Start every stored strategy flagged active. Returns how many loops
    /// were spawned.
    pub async fn resume_active(&self) -> Result<usize> {
        let active = self.repo.list_active().await?;
        let mut started = 0;

        for strategy in active {
            if self.is_running(strategy.id) {
                continue;
            }
            match self.start(strategy.id).await {
                Ok(()) => started += 1,
                Err(e) => warn!(strategy_id = %strategy.id, "Failed to resume strategy: {}", e),
            }
        }

        if started > 0 {
            info!("Resumed {} active strategies", started);
        }
        Ok(started)
    }

    /// Drop finished handles, then start anything newly flagged active
    pub async fn reconcile(&self) -> Result<usize> {
        let finished: Vec<StrategyId> = self
            .registry
            .iter()
            .filter(|entry| !entry.value().is_live())
            .map(|entry| *entry.key())
            .collect();

        for id in finished {
            let _guard = self.transition_lock(id).await;
            if let Some((_, handle)) = self.registry.remove_if(&id, |_, h| !h.is_live()) {
                let state = handle.join(self.config.restart_join_timeout()).await;
                debug!(strategy_id = %id, state = %state, "Reaped finished loop");
            }
        }

        self.resume_active().await
    }

    /// Cancel every loop and wait for them to exit, leaving stored flags
    /// untouched so the next process can resume them.
    pub async fn shutdown(&self) {
        let ids = self.registry_ids();
        let handles: Vec<LoopHandle> = ids
            .into_iter()
            .filter_map(|id| self.registry.remove(&id).map(|(_, h)| h))
            .collect();

        if handles.is_empty() {
            return;
        }

        info!("Shutting down {} execution loops", handles.len());
        for handle in &handles {
            handle.cancel();
        }

        let timeout = self.config.restart_join_timeout();
        join_all(handles.into_iter().map(|h| h.join(timeout))).await;
        info!("All execution loops stopped");
    }

    /// Projection of one stored record
    pub async fn status(
        &self,
        id: StrategyId,
    ) -> std::result::Result<StrategyStatusView, ControlError> {
        let strategy = self.load(id).await?;
        Ok(self.project(strategy))
    }

    /// Projections of all stored records, ordered by id
    pub async fn status_all(&self) -> Result<Vec<StrategyStatusView>> {
        let all = self.repo.list_all().await?;
        Ok(all.into_iter().map(|s| self.project(s)).collect())
    }

    fn project(&self, strategy: StrategyConfig) -> StrategyStatusView {
        let loop_state = self.registry.get(&strategy.id).map(|h| h.state());
        let running = self.is_running(strategy.id);
        StrategyStatusView::new(strategy, running, loop_state)
    }

    /// Ids with a live loop, ascending
    pub fn list_running(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self
            .registry
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_running(&self, id: StrategyId) -> bool {
        self.registry.get(&id).map(|h| h.is_live()).unwrap_or(false)
    }

    fn registry_ids(&self) -> Vec<StrategyId> {
        self.registry.iter().map(|entry| *entry.key()).collect()
    }
}

struct TransitionGuard<'a> {
    locks: &'a DashMap<StrategyId, Arc<Mutex<()>>>,
    id: StrategyId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ============================================================================
// Strategy Status View
// ============================================================================

/// Read-only projection of a strategy record plus its loop
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatusView {
    pub id: StrategyId,
    pub name: String,
    pub strategy_type: StrategyType,
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
    /// A live loop exists in this process
    pub running: bool,
    #[serde(skip)]
    pub loop_state: Option<LoopState>,
}

impl StrategyStatusView {
    pub fn new(strategy: StrategyConfig, running: bool, loop_state: Option<LoopState>) -> Self {
        Self {
            id: strategy.id,
            name: strategy.name,
            strategy_type: strategy.strategy_type,
            symbol: strategy.symbol,
            timeframe: strategy.timeframe,
            is_active: strategy.is_active,
            status: strategy.status,
            initial_balance: strategy.initial_balance,
            current_balance: strategy.current_balance,
            total_trades: strategy.total_trades,
            started_at: strategy.started_at,
            stopped_at: strategy.stopped_at,
            last_run_at: strategy.last_run_at,
            running,
            loop_state,
        }
    }

    /// Time since `started_at` while active, as a human-readable string
    pub fn uptime(&self) -> Option<String> {
        if !self.is_active {
            return None;
        }
        let started_at = self.started_at?;
        Some(format_uptime(Utc::now() - started_at))
    }
}

fn format_uptime(duration: chrono::Duration) -> String {
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    let seconds = duration.num_seconds() % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::StaticMarketData;
    use crate::error::EngineError;
    use crate::strategy::traits::MockStrategyRepository;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(active: bool) -> StrategyConfig {
        let mut record =
            StrategyConfig::new(1, "btc", StrategyType::RsiTrading, "BTCUSDT", "1h", dec!(1000));
        if active {
            record.activate(Utc::now());
        }
        record
    }

    fn supervisor(repo: MockStrategyRepository) -> TaskSupervisor {
        TaskSupervisor::new(
            Arc::new(repo),
            Arc::new(StaticMarketData::new()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let mut repo = MockStrategyRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(None));
        repo.expect_save_lifecycle().never();
        let supervisor = supervisor(repo);

        let id = StrategyId(42);
        assert_eq!(supervisor.start(id).await, Err(ControlError::NotFound(id)));
        assert_eq!(supervisor.stop(id).await, Err(ControlError::NotFound(id)));
        assert_eq!(supervisor.restart(id).await, Err(ControlError::NotFound(id)));
        assert!(matches!(
            supervisor.status(id).await,
            Err(ControlError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_locks_do_not_accumulate() {
        let mut repo = MockStrategyRepository::new();
        repo.expect_get_by_id()
            .returning(|id| Ok((id == StrategyId(1)).then(|| record(false))));
        repo.expect_save_lifecycle().returning(|_| Ok(()));
        repo.expect_save_progress().returning(|_| Ok(()));
        let supervisor = supervisor(repo);

        for raw in 1000..2000 {
            let id = StrategyId(raw);
            assert_eq!(supervisor.start(id).await, Err(ControlError::NotFound(id)));
        }
        assert!(supervisor.locks.is_empty());

        supervisor.start(StrategyId(1)).await.unwrap();
        supervisor.restart(StrategyId(1)).await.unwrap();
        supervisor.stop(StrategyId(1)).await.unwrap();
        assert!(supervisor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_start_persistence_failure_spawns_nothing() {
        let mut repo = MockStrategyRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(Some(record(false))));
        repo.expect_save_lifecycle()
            .times(1)
            .returning(|_| Err(EngineError::Persistence("connection reset".to_string())));
        let supervisor = supervisor(repo);

        let result = supervisor.start(StrategyId(1)).await;
        assert!(matches!(result, Err(ControlError::Persistence { .. })));
        assert!(!supervisor.is_running(StrategyId(1)));
        assert!(supervisor.list_running().is_empty());
    }

    #[tokio::test]
    async fn test_stop_persistence_failure_leaves_loop_running() {
        let lifecycle_writes = Arc::new(AtomicUsize::new(0));
        let writes = lifecycle_writes.clone();

        let mut repo = MockStrategyRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(Some(record(true))));
        repo.expect_save_lifecycle().returning(move |_| {
            if writes.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(EngineError::Persistence("read-only replica".to_string()))
            }
        });
        repo.expect_save_progress().returning(|_| Ok(()));
        let supervisor = supervisor(repo);

        supervisor.start(StrategyId(1)).await.unwrap();
        assert!(supervisor.is_running(StrategyId(1)));

        let result = supervisor.stop(StrategyId(1)).await;
        assert!(matches!(result, Err(ControlError::Persistence { .. })));
        assert!(supervisor.is_running(StrategyId(1)));
        assert_eq!(lifecycle_writes.load(Ordering::SeqCst), 2);

        supervisor.shutdown().await;
        assert!(!supervisor.is_running(StrategyId(1)));
    }

    #[tokio::test]
    async fn test_stop_inactive_record_writes_nothing() {
        let mut repo = MockStrategyRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(Some(record(false))));
        repo.expect_save_lifecycle().never();
        let supervisor = supervisor(repo);

        assert_eq!(supervisor.stop(StrategyId(1)).await, Ok(()));
    }

    #[test]
    fn test_uptime_formatting() {
        assert_eq!(format_uptime(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_uptime(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_uptime(chrono::Duration::seconds(3 * 3600 + 61)), "3h 1m 1s");

        let view = StrategyStatusView::new(record(false), false, None);
        assert_eq!(view.uptime(), None);

        let view = StrategyStatusView::new(record(true), true, Some(LoopState::Running));
        assert!(view.uptime().is_some());
    }
}
