pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod strategy;

pub use adapters::{
    BinanceKlineSource, InMemoryStrategyStore, PostgresStrategyStore, StaticMarketData,
};
pub use config::{AppConfig, EngineConfig};
pub use domain::{Candle, StrategyConfig, StrategyId, StrategyStatus, StrategyType, Timeframe};
pub use error::{ControlError, EngineError, Result};
pub use strategy::{
    Decision, LoopState, MarketDataSource, StrategyRepository, StrategyStatusView, TaskSupervisor,
};
