//! Binance K-line (candlestick) REST source
//!
//! Serves the most recent candles for a symbol and timeframe.

use async_trait::async_trait;
use chrono::DateTime;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MarketDataConfig;
use crate::domain::Candle;
use crate::error::{EngineError, Result};
use crate::strategy::traits::MarketDataSource;

/// Binance caps one klines request at this many rows
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Binance K-line API client
#[derive(Clone)]
pub struct BinanceKlineSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceKlineSource {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch up to `limit` candles, oldest first.
    /// interval: "1m", "5m", "15m", "1h", "4h", "1d"
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.clamp(1, MAX_KLINES_PER_REQUEST)
        );

        debug!("Fetching K-lines: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            EngineError::MarketDataUnavailable(format!("K-line request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(EngineError::MarketDataUnavailable(format!(
                "K-line API error for {} {}: {}",
                symbol,
                interval,
                response.status()
            )));
        }

        let data: Vec<Vec<serde_json::Value>> = response.json().await.map_err(|e| {
            EngineError::InvalidMarketData(format!("K-line parse error: {}", e))
        })?;

        let total = data.len();
        let mut candles: Vec<Candle> = data.iter().filter_map(|row| parse_kline_row(row)).collect();
        candles.sort_by_key(|c| c.timestamp);

        if candles.len() < total {
            warn!(
                "Dropped {} malformed K-line rows for {}",
                total - candles.len(),
                symbol
            );
        }
        debug!("Fetched {} K-lines for {}", candles.len(), symbol);
        Ok(candles)
    }
}

#[async_trait]
impl MarketDataSource for BinanceKlineSource {
    async fn latest(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.fetch_klines(symbol, timeframe, limit).await
    }
}

/// `[open_time_ms, "open", "high", "low", "close", "volume", ...]`
fn parse_kline_row(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }

    Some(Candle {
        timestamp: DateTime::from_timestamp_millis(row[0].as_i64()?)?,
        open: row[1].as_str()?.parse().ok()?,
        high: row[2].as_str()?.parse().ok()?,
        low: row[3].as_str()?.parse().ok()?,
        close: row[4].as_str()?.parse().ok()?,
        volume: row[5].as_str()?.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = json!([
            1700000000000i64,
            "37000.10",
            "37100.00",
            "36900.50",
            "37050.25",
            "12.5",
            1700003599999i64,
            "463128.1",
            1200,
            "6.1",
            "226000.0",
            "0"
        ]);
        let row = row.as_array().unwrap();

        let candle = parse_kline_row(row).unwrap();
        assert_eq!(candle.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.open, dec!(37000.10));
        assert_eq!(candle.close, dec!(37050.25));
        assert_eq!(candle.volume, dec!(12.5));
    }

    #[test]
    fn test_parse_kline_row_rejects_malformed() {
        assert!(parse_kline_row(json!([1]).as_array().unwrap()).is_none());
        assert!(parse_kline_row(
            json!([1700000000000i64, 1.0, "2", "3", "4", "5"])
                .as_array()
                .unwrap()
        )
        .is_none());
    }
}
