// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// Compute the EMA series for `closes` with look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev = sma;
    for &close in &closes[period..] {
        let next = close * multiplier + prev * (1.0 - multiplier);
        if !next.is_finite() {
            // A broken series must not be trusted downstream.
            break;
        }
        result.push(next);
        prev = next;
    }

    result
}

/// Most recent EMA value, or `None` when the lookback is insufficient.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    ema_series(closes, period).last().copied()
}

/// Slope of a series over its last `lookback` points via least-squares
/// regression on the index axis.
///
/// Returns `None` for fewer than two points. A flat series has slope 0.
pub fn series_slope(values: &[f64], lookback: usize) -> Option<f64> {
    let n = values.len().min(lookback);
    if n < 2 {
        return None;
    }
    let tail = &values[values.len() - n..];

    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = tail.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in tail.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    if denominator == 0.0 {
        return Some(0.0);
    }
    let slope = numerator / denominator;
    slope.is_finite().then_some(slope)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_period_zero() {
        assert!(ema_series(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data_returns_none() {
        assert!(ema(&[1.0, 2.0], 5).is_none());
        assert!(ema(&[], 14).is_none());
    }

    #[test]
    fn ema_seeded_with_sma() {
        // EMA(3) on [1,2,3]: single value = SMA = 2.0.
        let series = ema_series(&[1.0, 2.0, 3.0], 3);
        assert_eq!(series.len(), 1);
        assert!((series[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ema_tracks_rising_prices() {
        let closes: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let e = ema(&closes, 10).unwrap();
        // EMA lags the last close but must sit near the top of the range.
        assert!(e > 40.0 && e < 50.0, "ema = {e}");
    }

    #[test]
    fn ema_flat_series_equals_price() {
        let closes = vec![100.0; 30];
        let e = ema(&closes, 14).unwrap();
        assert!((e - 100.0).abs() < 1e-9);
    }

    #[test]
    fn slope_positive_for_rising_series() {
        let values: Vec<f64> = (0..30).map(|x| x as f64 * 0.5).collect();
        let s = series_slope(&values, 20).unwrap();
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn slope_zero_for_flat_series() {
        let values = vec![7.0; 25];
        let s = series_slope(&values, 20).unwrap();
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn slope_none_for_single_point() {
        assert!(series_slope(&[1.0], 20).is_none());
        assert!(series_slope(&[], 20).is_none());
    }

    #[test]
    fn slope_uses_only_lookback_tail() {
        // Falling then rising; the 10-point tail is rising.
        let mut values: Vec<f64> = (0..20).map(|x| 100.0 - x as f64).collect();
        values.extend((0..10).map(|x| 80.0 + x as f64 * 2.0));
        let s = series_slope(&values, 10).unwrap();
        assert!(s > 0.0, "tail slope should be positive, got {s}");
    }
}
