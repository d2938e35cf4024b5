//! Execution Loop
//!
//! Drives one strategy's evaluate-then-sleep cycle:
//! - re-read the record, exit once it is no longer active
//! - fetch the latest candle window
//! - evaluate the signal generator and apply the decision to the ledger
//! - persist progress and sleep until the next timeframe tick
//!
//! Cycle failures are transient: they are logged and retried after a backoff
//! without touching the record's lifecycle fields. Cancellation is observed at
//! every await point.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ledger::PositionLedger;
use super::params::StrategyParams;
use super::signal::{EvalContext, SignalGenerator};
use super::traits::{MarketDataSource, StrategyRepository};
use crate::config::EngineConfig;
use crate::domain::{cycle_interval, StrategyId};
use crate::error::{EngineError, Result};

// ============================================================================
// Loop State
// ============================================================================

/// Lifecycle of one execution loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Spawned, first cycle not yet begun
    Starting,
    Running,
    /// Stopped by its handle
    Cancelled,
    /// Exited because the record is gone or no longer active
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Cancelled | LoopState::Exhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Cancelled => "cancelled",
            LoopState::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Loop Handle
// ============================================================================

/// Owner side of a spawned loop
#[derive(Debug)]
pub struct LoopHandle {
    id: StrategyId,
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<LoopState>,
    task: JoinHandle<LoopState>,
    started_at: DateTime<Utc>,
}

impl LoopHandle {
    pub fn id(&self) -> StrategyId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Last state the loop published
    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Not cancelled and still executing
    pub fn is_live(&self) -> bool {
        !self.is_cancelled() && !self.task.is_finished() && !self.state().is_terminal()
    }

    /// Cancel and wait for the task to exit. On timeout the task is aborted.
    pub async fn join(mut self, timeout: Duration) -> LoopState {
        self.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                error!(strategy_id = %self.id, "Execution loop task failed: {}", e);
                LoopState::Cancelled
            }
            Err(_) => {
                warn!(
                    strategy_id = %self.id,
                    "Execution loop did not exit within {:?}, aborting",
                    timeout
                );
                self.task.abort();
                LoopState::Cancelled
            }
        }
    }
}

// ============================================================================
// Execution Loop
// ============================================================================

/// What a successful cycle asks the loop to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// Sleep this long, then run again
    Continue(Duration),
    /// Record missing or inactive
    Finished,
}

pub struct ExecutionLoop {
    id: StrategyId,
    repo: Arc<dyn StrategyRepository>,
    market_data: Arc<dyn MarketDataSource>,
    config: EngineConfig,
    state_tx: watch::Sender<LoopState>,
}

impl ExecutionLoop {
    /// Spawn a loop for `id` on the current runtime
    pub fn spawn(
        id: StrategyId,
        repo: Arc<dyn StrategyRepository>,
        market_data: Arc<dyn MarketDataSource>,
        config: EngineConfig,
    ) -> LoopHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LoopState::Starting);

        let execution = ExecutionLoop {
            id,
            repo,
            market_data,
            config,
            state_tx,
        };
        let task = tokio::spawn(execution.run(cancel_rx));

        LoopHandle {
            id,
            cancel_tx,
            state_rx,
            task,
            started_at: Utc::now(),
        }
    }

    async fn run(self, mut cancel_rx: watch::Receiver<bool>) -> LoopState {
        info!(strategy_id = %self.id, "Execution loop started");
        self.state_tx.send_replace(LoopState::Running);

        let mut consecutive_failures: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => return self.finish(LoopState::Cancelled),
                outcome = self.run_cycle() => outcome,
            };

            let delay = match outcome {
                Ok(CycleOutcome::Continue(interval)) => {
                    consecutive_failures = 0;
                    interval
                }
                Ok(CycleOutcome::Finished) => return self.finish(LoopState::Exhausted),
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let backoff = self.config.retry_delay(consecutive_failures);
                    error!(
                        strategy_id = %self.id,
                        failures = consecutive_failures,
                        "Cycle failed: {}, retrying in {:?}",
                        e,
                        backoff
                    );
                    backoff
                }
            };

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => return self.finish(LoopState::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One evaluation pass over fresh state
    async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(mut strategy) = self.repo.get_by_id(self.id).await? else {
            warn!(strategy_id = %self.id, "Strategy record disappeared, exiting");
            return Ok(CycleOutcome::Finished);
        };

        if !strategy.is_active {
            info!(strategy_id = %self.id, "Strategy no longer active, exiting");
            return Ok(CycleOutcome::Finished);
        }

        let params = StrategyParams::from_value(strategy.strategy_type, &strategy.parameters)?;

        let window = tokio::time::timeout(
            self.config.market_data_timeout(),
            self.market_data.latest(
                &strategy.symbol,
                &strategy.timeframe,
                self.config.candle_window,
            ),
        )
        .await
        .map_err(|_| {
            EngineError::MarketDataUnavailable(format!(
                "{} {} timed out after {:?}",
                strategy.symbol,
                strategy.timeframe,
                self.config.market_data_timeout()
            ))
        })??;

        match window.last() {
            None => {
                warn!(
                    strategy_id = %self.id,
                    symbol = %strategy.symbol,
                    timeframe = %strategy.timeframe,
                    "No market data, skipping evaluation"
                );
            }
            Some(last_candle) => {
                let generator = SignalGenerator::new(strategy.strategy_type, &params);
                let ctx = EvalContext::for_strategy(&strategy, Utc::now());
                let decision = generator.evaluate(&window, &ctx);

                debug!(
                    strategy_id = %self.id,
                    strategy_type = %strategy.strategy_type,
                    candles = window.len(),
                    decision = %decision,
                    "Evaluated"
                );

                if decision.is_actionable() {
                    PositionLedger::apply(
                        &mut strategy,
                        decision,
                        last_candle,
                        params.risk_per_trade,
                    )?;
                    self.repo.save_progress(&strategy).await?;
                }
            }
        }

        strategy.last_run_at = Some(Utc::now());
        self.repo.save_progress(&strategy).await?;

        Ok(CycleOutcome::Continue(cycle_interval(&strategy.timeframe)))
    }

    fn finish(&self, state: LoopState) -> LoopState {
        info!(strategy_id = %self.id, state = %state, "Execution loop exited");
        self.state_tx.send_replace(state);
        state
    }
}

/// Resolves once cancellation is requested or the handle is dropped
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
