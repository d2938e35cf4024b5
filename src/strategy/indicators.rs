//! Indicator math over closing prices (oldest first).

/// Fixed RSI lookback
pub const RSI_PERIOD: usize = 14;
/// Fast MACD EMA length
pub const MACD_FAST: usize = 12;
/// Slow MACD EMA length, also the number of closes MACD reads
pub const MACD_SLOW: usize = 26;

/// Arithmetic mean, `None` for an empty slice
pub fn sma(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Relative strength index from simple (non-smoothed) averages of the
/// gains and losses between consecutive closes.
///
/// A window without losses reads 100.
pub fn rsi(closes: &[f64]) -> f64 {
    let (gains, losses) = closes
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), change| {
            if change > 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let avg_gain = gains / RSI_PERIOD as f64;
    let avg_loss = losses / RSI_PERIOD as f64;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Recursive EMA seeded with the first close, multiplier `2 / (period + 1)`.
///
/// Shorter inputs than `period` fall back to the plain mean.
pub fn ema(closes: &[f64], period: usize) -> f64 {
    if closes.is_empty() {
        return 0.0;
    }
    if closes.len() < period {
        return sma(closes).unwrap_or(0.0);
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    closes[1..]
        .iter()
        .fold(closes[0], |ema, close| close * multiplier + ema * (1.0 - multiplier))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd_line: f64,
    pub signal_line: f64,
}

/// MACD line (EMA12 - EMA26).
///
/// The signal line is the MACD line itself; no separate 9-period smoothing
/// is applied.
pub fn macd(closes: &[f64]) -> Macd {
    let macd_line = ema(closes, MACD_FAST) - ema(closes, MACD_SLOW);
    Macd {
        macd_line,
        signal_line: macd_line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        assert_eq!(sma(&[]), None);
        assert_eq!(sma(&[2.0, 4.0, 6.0]), Some(4.0));
    }

    #[test]
    fn test_rsi_without_losses_is_100() {
        let rising: Vec<f64> = (1..=14).map(f64::from).collect();
        assert_eq!(rsi(&rising), 100.0);

        let flat = vec![50.0; 14];
        assert_eq!(rsi(&flat), 100.0);
    }

    #[test]
    fn test_rsi_without_gains_is_0() {
        let falling: Vec<f64> = (1..=14).rev().map(f64::from).collect();
        assert_eq!(rsi(&falling), 0.0);
    }

    #[test]
    fn test_rsi_balanced_moves_is_50() {
        let closes = [10.0, 12.0, 10.0, 12.0, 10.0];
        assert_eq!(rsi(&closes), 50.0);
    }

    #[test]
    fn test_ema_seeded_with_first_close() {
        // period 3 => multiplier 0.5
        let value = ema(&[10.0, 20.0, 30.0], 3);
        // 10 -> 15 -> 22.5
        assert_eq!(value, 22.5);
    }

    #[test]
    fn test_ema_short_input_is_mean() {
        assert_eq!(ema(&[1.0, 2.0, 3.0], 12), 2.0);
    }

    #[test]
    fn test_macd_signal_line_mirrors_macd_line() {
        let rising: Vec<f64> = (1..=26).map(f64::from).collect();
        let value = macd(&rising);
        assert!(value.macd_line > 0.0);
        assert_eq!(value.macd_line, value.signal_line);

        let flat = vec![100.0; 26];
        assert!(macd(&flat).macd_line.abs() < 1e-9);
    }
}
