pub mod binance_klines;
pub mod memory;
pub mod postgres;

pub use binance_klines::BinanceKlineSource;
pub use memory::{InMemoryStrategyStore, StaticMarketData};
pub use postgres::PostgresStrategyStore;
