use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use strategy_runner::adapters::{InMemoryStrategyStore, StaticMarketData};
use strategy_runner::config::EngineConfig;
use strategy_runner::domain::{Candle, StrategyConfig, StrategyId, StrategyStatus, StrategyType};
use strategy_runner::error::ControlError;
use strategy_runner::strategy::TaskSupervisor;

struct Harness {
    store: InMemoryStrategyStore,
    market: StaticMarketData,
    supervisor: Arc<TaskSupervisor>,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryStrategyStore::new();
        let market = StaticMarketData::new();
        let supervisor = Arc::new(TaskSupervisor::new(
            Arc::new(store.clone()),
            Arc::new(market.clone()),
            EngineConfig::default(),
        ));
        Self {
            store,
            market,
            supervisor,
        }
    }

    /// Fresh supervisor over the same store, as after a process restart
    fn reboot(&self) -> TaskSupervisor {
        TaskSupervisor::new(
            Arc::new(self.store.clone()),
            Arc::new(self.market.clone()),
            EngineConfig::default(),
        )
    }

    async fn add(&self, id: i64, strategy_type: StrategyType, timeframe: &str) {
        let record = StrategyConfig::new(
            id,
            &format!("strategy-{}", id),
            strategy_type,
            "BTCUSDT",
            timeframe,
            dec!(10000),
        );
        self.store.insert(record).await;
    }

    async fn record(&self, id: i64) -> StrategyConfig {
        self.store.get(StrategyId(id)).await.unwrap()
    }
}

fn falling_window() -> Vec<Candle> {
    let now = Utc::now();
    (100..114)
        .rev()
        .map(|c| Candle::from_close(now, Decimal::from(c)))
        .collect()
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_spawn_one_loop() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let supervisor = h.supervisor.clone();
            tokio::spawn(async move { supervisor.start(StrategyId(1)).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    settle().await;
    assert_eq!(h.supervisor.list_running(), vec![StrategyId(1)]);
    assert_eq!(h.market.calls(), 1);

    h.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_across_threads_spawn_one_loop() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;

    let barrier = Arc::new(Barrier::new(32));
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let supervisor = h.supervisor.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                supervisor.start(StrategyId(1)).await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.market.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.supervisor.list_running(), vec![StrategyId(1)]);
    assert_eq!(h.market.calls(), 1);

    h.supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_start_is_a_no_op() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;
    let started_at = h.record(1).await.started_at;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;

    assert_eq!(h.record(1).await.started_at, started_at);
    assert_eq!(h.market.calls(), 1);

    h.supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_never_started_strategy_is_a_no_op() {
    let h = Harness::new();
    h.add(1, StrategyType::Dca, "1d").await;
    let before = h.record(1).await;

    assert_eq!(h.supervisor.stop(StrategyId(1)).await, Ok(()));
    assert_eq!(h.record(1).await, before);
    assert!(!h.supervisor.is_running(StrategyId(1)));
}

#[tokio::test(start_paused = true)]
async fn unknown_ids_are_not_found() {
    let h = Harness::new();
    let id = StrategyId(404);

    assert_eq!(h.supervisor.start(id).await, Err(ControlError::NotFound(id)));
    assert_eq!(h.supervisor.stop(id).await, Err(ControlError::NotFound(id)));
    assert_eq!(h.supervisor.restart(id).await, Err(ControlError::NotFound(id)));
}

#[tokio::test(start_paused = true)]
async fn start_then_stop_persists_both_transitions() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1m").await;
    h.market.set("BTCUSDT", falling_window()).await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    let record = h.record(1).await;
    assert!(record.is_active);
    assert_eq!(record.status, StrategyStatus::Active);
    assert!(record.started_at.is_some());

    // Cycles at t = 0, 60
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(h.record(1).await.total_trades, 2);

    h.supervisor.stop(StrategyId(1)).await.unwrap();
    let record = h.record(1).await;
    assert!(!record.is_active);
    assert_eq!(record.status, StrategyStatus::Inactive);
    assert!(record.stopped_at.is_some());
    assert!(!h.supervisor.is_running(StrategyId(1)));

    // No further cycles
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.market.calls(), 2);
    assert_eq!(h.record(1).await.total_trades, 2);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_loop() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;
    let first_start = h.record(1).await.started_at;

    h.supervisor.restart(StrategyId(1)).await.unwrap();
    settle().await;

    let record = h.record(1).await;
    assert!(record.is_active);
    assert_eq!(record.status, StrategyStatus::Active);
    assert!(record.started_at >= first_start);
    assert!(h.supervisor.is_running(StrategyId(1)));
    assert_eq!(h.supervisor.list_running().len(), 1);
    // One cycle per loop, the old one never ran again
    assert_eq!(h.market.calls(), 2);

    h.supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_persistence_failure_spawns_nothing() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;
    h.store.set_fail_writes(true);

    let result = h.supervisor.start(StrategyId(1)).await;
    assert!(matches!(result, Err(ControlError::Persistence { .. })));

    settle().await;
    assert!(!h.supervisor.is_running(StrategyId(1)));
    assert_eq!(h.market.calls(), 0);
    assert!(!h.record(1).await.is_active);
}

#[tokio::test(start_paused = true)]
async fn stop_persistence_failure_keeps_loop_running() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;

    h.store.set_fail_writes(true);
    let result = h.supervisor.stop(StrategyId(1)).await;
    assert!(matches!(result, Err(ControlError::Persistence { .. })));
    assert!(h.supervisor.is_running(StrategyId(1)));
    assert!(h.record(1).await.is_active);

    h.store.set_fail_writes(false);
    h.supervisor.stop(StrategyId(1)).await.unwrap();
    assert!(!h.supervisor.is_running(StrategyId(1)));
}

#[tokio::test(start_paused = true)]
async fn strategies_run_independently() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;
    h.add(2, StrategyType::RsiTrading, "1h").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    h.supervisor.start(StrategyId(2)).await.unwrap();
    settle().await;

    h.supervisor.stop(StrategyId(1)).await.unwrap();
    assert_eq!(h.supervisor.list_running(), vec![StrategyId(2)]);
    assert!(h.record(2).await.is_active);

    h.supervisor.stop_all().await;
    assert!(h.supervisor.list_running().is_empty());
    assert!(!h.record(2).await.is_active);
}

#[tokio::test(start_paused = true)]
async fn shutdown_keeps_active_flags_for_resume() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;
    h.add(2, StrategyType::MaCrossover, "4h").await;
    h.add(3, StrategyType::Dca, "1d").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    h.supervisor.start(StrategyId(2)).await.unwrap();
    settle().await;

    h.supervisor.shutdown().await;
    assert!(h.supervisor.list_running().is_empty());
    assert!(h.record(1).await.is_active);
    assert!(h.record(2).await.is_active);

    let rebooted = h.reboot();
    assert_eq!(rebooted.resume_active().await.unwrap(), 2);
    assert_eq!(rebooted.list_running(), vec![StrategyId(1), StrategyId(2)]);
    assert!(!rebooted.is_running(StrategyId(3)));

    // Already running: nothing more to resume
    assert_eq!(rebooted.resume_active().await.unwrap(), 0);

    rebooted.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconcile_follows_out_of_band_flag_changes() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1m").await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;

    h.store
        .update(StrategyId(1), |s| s.deactivate(Utc::now()))
        .await;
    // Loop notices at the top of its next cycle
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!h.supervisor.is_running(StrategyId(1)));
    assert_eq!(h.supervisor.reconcile().await.unwrap(), 0);

    h.store
        .update(StrategyId(1), |s| s.activate(Utc::now()))
        .await;
    assert_eq!(h.supervisor.reconcile().await.unwrap(), 1);
    assert!(h.supervisor.is_running(StrategyId(1)));

    h.supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn status_projects_stored_fields() {
    let h = Harness::new();
    h.add(1, StrategyType::RsiTrading, "1h").await;
    h.add(2, StrategyType::Dca, "1d").await;
    h.market.set("BTCUSDT", falling_window()).await;

    h.supervisor.start(StrategyId(1)).await.unwrap();
    settle().await;

    let view = h.supervisor.status(StrategyId(1)).await.unwrap();
    assert!(view.running);
    assert!(view.is_active);
    assert_eq!(view.total_trades, 1);
    assert_eq!(view.current_balance, dec!(9800));
    assert_eq!(view.initial_balance, dec!(10000));
    assert!(view.uptime().is_some());

    let all = h.supervisor.status_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all[1].running);
    assert_eq!(all[1].uptime(), None);

    h.supervisor.shutdown().await;
}
