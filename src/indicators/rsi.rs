// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first
//          `period` gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
// =============================================================================

/// Compute the most recent RSI value with Wilder smoothing.
///
/// Returns `None` when `period == 0` or there are fewer than `period + 1`
/// closes (a period of deltas requires one extra close). There is no
/// partial-window fallback.
pub fn rsi_wilder(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed with the SMA of the first `period` deltas.
    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
    }

    rsi_from_averages(avg_gain, avg_loss)
}

/// Convert average gain / loss into an RSI value in [0, 100].
///
/// Both averages zero (no movement) => 50. Zero loss (only gains) => 100.
/// Non-finite results are rejected.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(rsi_wilder(&[], 14).is_none());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(rsi_wilder(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn rsi_requires_period_plus_one_closes() {
        // 14 closes => 13 deltas < 14 — not enough.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(rsi_wilder(&closes, 14).is_none());
        // 15 closes is exactly enough.
        let closes: Vec<f64> = (1..=15).map(|x| x as f64).collect();
        assert!(rsi_wilder(&closes, 14).is_some());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let v = rsi_wilder(&closes, 14).unwrap();
        assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let v = rsi_wilder(&closes, 14).unwrap();
        assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
    }

    #[test]
    fn rsi_flat_market_is_50() {
        let closes = vec![100.0; 30];
        let v = rsi_wilder(&closes, 14).unwrap();
        assert!((v - 50.0).abs() < 1e-10, "expected 50.0, got {v}");
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let v = rsi_wilder(&closes, 14).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
    }
}
