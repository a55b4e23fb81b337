// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the smoothed average of TR:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use crate::market_data::DailyCandle;

/// Compute the most recent ATR value from daily candles (oldest first).
///
/// Returns `None` when `period` is zero, there are fewer than `period + 1`
/// candles, or any intermediate value is non-finite.
pub fn atr(candles: &[DailyCandle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();
        tr_values.push(hl.max(hc).max(lc));
    }

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let period_f = period as f64;
    let mut value = seed;
    for &tr in &tr_values[period..] {
        value = (value * (period_f - 1.0) + tr) / period_f;
        if !value.is_finite() {
            return None;
        }
    }

    value.is_finite().then_some(value)
}

/// ATR as a fraction of the latest close (0.03 = 3% of price).
///
/// `None` when ATR is unavailable or the latest close is zero.
pub fn atr_pct(candles: &[DailyCandle], period: usize) -> Option<f64> {
    let value = atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some(value / last_close)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> DailyCandle {
        DailyCandle {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000_000.0,
        }
    }

    #[test]
    fn atr_period_zero() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 20];
        assert!(atr(&candles, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 10];
        assert!(atr(&candles, 14).is_none());
    }

    #[test]
    fn atr_exact_minimum_data() {
        let candles = vec![
            candle(100.0, 102.0, 98.0, 101.0),
            candle(101.0, 104.0, 99.0, 103.0),
            candle(103.0, 106.0, 100.0, 105.0),
            candle(105.0, 108.0, 102.0, 107.0),
        ];
        let v = atr(&candles, 3).unwrap();
        assert!(v > 0.0 && v.is_finite());
    }

    #[test]
    fn atr_constant_range_converges() {
        // Every bar has range 10; ATR must converge to 10.
        let mut candles = Vec::new();
        for i in 0..30 {
            let base = 100.0 + i as f64 * 0.1;
            candles.push(candle(base, base + 5.0, base - 5.0, base));
        }
        let v = atr(&candles, 14).unwrap();
        assert!((v - 10.0).abs() < 1.0, "expected ATR near 10.0, got {v}");
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        // Gap up: |115 - 95| = 20 dominates the bar range of 7.
        let candles = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            candle(110.0, 115.0, 108.0, 112.0),
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        let v = atr(&candles, 3).unwrap();
        assert!(v > 7.0, "ATR should reflect the gap, got {v}");
    }

    #[test]
    fn atr_pct_is_fraction_of_price() {
        let candles: Vec<DailyCandle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        let p = atr_pct(&candles, 14).unwrap();
        assert!(p > 0.0 && p < 1.0, "atr_pct must be a fraction, got {p}");
    }

    #[test]
    fn atr_nan_returns_none() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, f64::NAN, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
        ];
        assert!(atr(&candles, 3).is_none());
    }
}
