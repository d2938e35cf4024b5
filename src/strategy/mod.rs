//! Strategy module
//!
//! The execution engine and its building blocks.
//!
//! ## Architecture
//!
//! - `indicators`, `params`, `signal` - pure signal generation over candles
//! - `ledger` - simulated balance bookkeeping for decisions
//! - `runner` - one periodic evaluation loop per strategy
//! - `supervisor` - registry of running loops, start/stop/restart/status
//! - `traits` - storage and market data ports

pub mod indicators;
pub mod ledger;
pub mod params;
pub mod runner;
pub mod signal;
pub mod supervisor;
pub mod traits;

pub use ledger::{LedgerEntry, PositionLedger};
pub use params::StrategyParams;
pub use runner::{ExecutionLoop, LoopHandle, LoopState};
pub use signal::{Decision, EvalContext, SignalGenerator};
pub use supervisor::{StrategyStatusView, TaskSupervisor};
pub use traits::{MarketDataSource, StrategyRepository};
