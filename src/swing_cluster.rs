// =============================================================================
// Swing-Cluster Support / Resistance Detector
// =============================================================================
//
// Pipeline:
//   1. Detect fractal swing highs/lows: a bar whose high (low) exceeds the
//      `k` bars on each side.
//   2. Discard levels outside the defensive bounds
//      (spot * 0.7, spot * 1.3) — stale extremes are not tradeable structure.
//   3. Cluster the remaining levels: sorted sweep, merge levels within the
//      tolerance into one zone, center = mean of the zone.
//      tolerance = clamp(atr_mult * ATR14, pct_floor * spot, max_pct * spot)
//   4. nearest_support    = max cluster center < spot
//      nearest_resistance = min cluster center > spot
//
// Distances are returned as fractions of spot (0.02 = 2%).

use serde::{Deserialize, Serialize};

use crate::market_data::DailyCandle;

/// Lower defensive bound: ignore swing lows below spot * 0.7.
const SWING_LOW_FLOOR_MULT: f64 = 0.7;
/// Upper defensive bound: ignore swing highs above spot * 1.3.
const SWING_HIGH_CEIL_MULT: f64 = 1.3;

/// Result of the support/resistance computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportResistance {
    pub method: String,
    pub window: usize,
    pub k: usize,
    pub swing_high_count: usize,
    pub swing_low_count: usize,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
    pub distance_to_support_pct: Option<f64>,
    pub distance_to_resistance_pct: Option<f64>,
    pub tolerance_used: Option<f64>,
}

/// Fractal swing highs: bar `i` is a swing high when its high is strictly
/// greater than every high within `k` bars on both sides.
pub fn fractal_swing_highs(candles: &[DailyCandle], k: usize) -> Vec<f64> {
    if k == 0 || candles.len() < 2 * k + 1 {
        return Vec::new();
    }
    let mut highs = Vec::new();
    for i in k..candles.len() - k {
        let center = candles[i].high;
        let left_ok = candles[i - k..i].iter().all(|c| c.high < center);
        let right_ok = candles[i + 1..=i + k].iter().all(|c| c.high < center);
        if left_ok && right_ok {
            highs.push(center);
        }
    }
    highs
}

/// Fractal swing lows: mirror of [`fractal_swing_highs`].
pub fn fractal_swing_lows(candles: &[DailyCandle], k: usize) -> Vec<f64> {
    if k == 0 || candles.len() < 2 * k + 1 {
        return Vec::new();
    }
    let mut lows = Vec::new();
    for i in k..candles.len() - k {
        let center = candles[i].low;
        let left_ok = candles[i - k..i].iter().all(|c| c.low > center);
        let right_ok = candles[i + 1..=i + k].iter().all(|c| c.low > center);
        if left_ok && right_ok {
            lows.push(center);
        }
    }
    lows
}

/// Cluster price levels: sort, sweep, merge neighbours within `tolerance`
/// into one zone. Returns the zone centers in ascending order.
pub fn cluster_levels(levels: &[f64], tolerance: f64) -> Vec<f64> {
    if levels.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<f64> = levels.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return Vec::new();
    }

    let mut centers = Vec::new();
    let mut zone: Vec<f64> = vec![sorted[0]];

    for &level in &sorted[1..] {
        let zone_start = zone[0];
        if (level - zone_start).abs() <= tolerance {
            zone.push(level);
        } else {
            centers.push(zone.iter().sum::<f64>() / zone.len() as f64);
            zone = vec![level];
        }
    }
    centers.push(zone.iter().sum::<f64>() / zone.len() as f64);

    centers
}

/// Nearest support: the highest cluster center strictly below spot.
pub fn nearest_support(spot: f64, centers: &[f64]) -> Option<f64> {
    centers
        .iter()
        .copied()
        .filter(|&c| c < spot)
        .fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.max(c))))
}

/// Nearest resistance: the lowest cluster center strictly above spot.
pub fn nearest_resistance(spot: f64, centers: &[f64]) -> Option<f64> {
    centers
        .iter()
        .copied()
        .filter(|&c| c > spot)
        .fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.min(c))))
}

/// Distance from spot to a level as a fraction of spot.
///
/// `None` when the level is absent or spot is not positive.
pub fn distance_to_level_pct(spot: f64, level: Option<f64>) -> Option<f64> {
    let level = level?;
    if spot <= 0.0 {
        return None;
    }
    Some((spot - level).abs() / spot)
}

/// Full swing-cluster S/R computation over the trailing `window` candles.
///
/// `atr14` may be `None` when the ATR lookback was insufficient; the
/// tolerance then falls back to the percent floor.
#[allow(clippy::too_many_arguments)]
pub fn compute_support_resistance(
    candles: &[DailyCandle],
    spot: f64,
    atr14: Option<f64>,
    window: usize,
    k: usize,
    atr_mult: f64,
    pct_floor: f64,
    max_pct: f64,
) -> SupportResistance {
    let mut out = SupportResistance {
        method: "swing_cluster".to_string(),
        window,
        k,
        swing_high_count: 0,
        swing_low_count: 0,
        support_level: None,
        resistance_level: None,
        distance_to_support_pct: None,
        distance_to_resistance_pct: None,
        tolerance_used: None,
    };

    if candles.is_empty() || spot <= 0.0 {
        return out;
    }

    let start = candles.len().saturating_sub(window);
    let tail = &candles[start..];

    let highs = fractal_swing_highs(tail, k);
    let lows = fractal_swing_lows(tail, k);
    out.swing_high_count = highs.len();
    out.swing_low_count = lows.len();

    // Defensive bounds: swing_low > spot*0.7 and swing_high < spot*1.3.
    let low_floor = spot * SWING_LOW_FLOOR_MULT;
    let high_ceil = spot * SWING_HIGH_CEIL_MULT;
    let mut levels: Vec<f64> = Vec::with_capacity(highs.len() + lows.len());
    levels.extend(highs.iter().copied().filter(|&h| h < high_ceil));
    levels.extend(lows.iter().copied().filter(|&l| l > low_floor));

    // tolerance = clamp(atr_mult * ATR, pct_floor * spot, max_pct * spot)
    let floor = pct_floor * spot;
    let cap = max_pct * spot;
    let raw = atr14.map(|a| atr_mult * a).unwrap_or(floor);
    let tolerance = raw.clamp(floor.min(cap), cap);
    out.tolerance_used = Some(tolerance);

    let centers = cluster_levels(&levels, tolerance);

    out.support_level = nearest_support(spot, &centers);
    out.resistance_level = nearest_resistance(spot, &centers);
    out.distance_to_support_pct = distance_to_level_pct(spot, out.support_level);
    out.distance_to_resistance_pct = distance_to_level_pct(spot, out.resistance_level);

    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candle(high: f64, low: f64, close: f64) -> DailyCandle {
        DailyCandle {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1_000_000.0,
        }
    }

    #[test]
    fn swing_high_detected() {
        let candles = vec![
            candle(10.0, 8.0, 9.0),
            candle(11.0, 9.0, 10.0),
            candle(15.0, 12.0, 14.0), // swing high
            candle(11.0, 9.0, 10.0),
            candle(10.0, 8.0, 9.0),
        ];
        let highs = fractal_swing_highs(&candles, 2);
        assert!(highs.contains(&15.0));
    }

    #[test]
    fn swing_low_detected() {
        let candles = vec![
            candle(12.0, 10.0, 11.0),
            candle(11.0, 9.0, 10.0),
            candle(10.0, 5.0, 8.0), // swing low
            candle(11.0, 9.0, 10.0),
            candle(12.0, 10.0, 11.0),
        ];
        let lows = fractal_swing_lows(&candles, 2);
        assert!(lows.contains(&5.0));
    }

    #[test]
    fn swing_detection_needs_full_window() {
        let candles = vec![candle(10.0, 8.0, 9.0); 4];
        assert!(fractal_swing_highs(&candles, 2).is_empty());
    }

    #[test]
    fn clustering_merges_close_levels() {
        let centers = cluster_levels(&[100.0, 100.5, 101.0, 101.2], 1.0);
        assert_eq!(centers.len(), 1);
        assert!(centers[0] > 100.0 && centers[0] < 102.0);
    }

    #[test]
    fn clustering_two_zones() {
        let centers = cluster_levels(&[100.0, 100.3, 100.5, 110.0, 110.5, 111.0], 1.0);
        assert_eq!(centers.len(), 2);
        assert!(centers[0] < 105.0 && centers[1] > 105.0);
    }

    #[test]
    fn nearest_support_is_max_below_spot() {
        let centers = [95.0, 98.0, 102.0, 105.0];
        assert_eq!(nearest_support(100.0, &centers), Some(98.0));
        assert_eq!(nearest_support(94.0, &centers), None);
        assert_eq!(nearest_support(106.0, &centers), Some(105.0));
    }

    #[test]
    fn nearest_resistance_is_min_above_spot() {
        let centers = [95.0, 98.0, 102.0, 105.0];
        assert_eq!(nearest_resistance(100.0, &centers), Some(102.0));
        assert_eq!(nearest_resistance(106.0, &centers), None);
        assert_eq!(nearest_resistance(94.0, &centers), Some(95.0));
    }

    #[test]
    fn distance_as_fraction() {
        let d = distance_to_level_pct(100.0, Some(98.0)).unwrap();
        assert!((d - 0.02).abs() < 1e-12);
        assert!(distance_to_level_pct(100.0, None).is_none());
        assert!(distance_to_level_pct(0.0, Some(10.0)).is_none());
    }

    #[test]
    fn support_missing_when_all_centers_above_spot() {
        // All lows at or above spot — no support below.
        let candles: Vec<DailyCandle> = (0..60)
            .map(|i| candle(101.0 + (i % 3) as f64 * 0.5, 100.0 + (i % 2) as f64 * 0.3, 100.5))
            .collect();
        let r = compute_support_resistance(&candles, 100.0, Some(1.0), 60, 2, 0.5, 0.01, 0.012);
        assert!(r.support_level.is_none());
        assert!(r.distance_to_support_pct.is_none());
    }

    #[test]
    fn resistance_missing_when_all_centers_below_spot() {
        let candles: Vec<DailyCandle> = (0..60)
            .map(|i| candle(99.0 - (i % 2) as f64 * 0.3, 98.0 - (i % 3) as f64 * 0.2, 98.5))
            .collect();
        let r = compute_support_resistance(&candles, 100.0, Some(1.0), 60, 2, 0.5, 0.01, 0.012);
        assert!(r.resistance_level.is_none());
        assert!(r.distance_to_resistance_pct.is_none());
    }

    #[test]
    fn empty_candles_safe_defaults() {
        let r = compute_support_resistance(&[], 100.0, Some(1.0), 60, 3, 0.5, 0.006, 0.012);
        assert_eq!(r.method, "swing_cluster");
        assert!(r.support_level.is_none());
        assert!(r.resistance_level.is_none());
        assert!(r.tolerance_used.is_none());
    }

    #[test]
    fn tolerance_capped_when_atr_huge() {
        let candles = vec![candle(102.0, 98.0, 100.0); 60];
        // atr_mult * atr = 0.5 * 200 = 100; cap = 100 * 0.012 = 1.2.
        let r = compute_support_resistance(&candles, 100.0, Some(200.0), 60, 2, 0.5, 0.006, 0.012);
        let tol = r.tolerance_used.unwrap();
        assert!(tol <= 1.2 + 1e-9, "tolerance {tol} not capped");
    }

    #[test]
    fn tolerance_respects_pct_floor_when_atr_small() {
        let candles = vec![candle(100.5, 99.5, 100.0); 60];
        // atr_mult * atr = 0.05; floor = 0.006 * 100 = 0.6.
        let r = compute_support_resistance(&candles, 100.0, Some(0.1), 60, 2, 0.5, 0.006, 0.012);
        let tol = r.tolerance_used.unwrap();
        assert!(tol >= 0.5, "tolerance {tol} below floor");
    }

    #[test]
    fn defensive_bounds_filter_stale_extremes() {
        // A swing low at 60 (below spot*0.7 = 70) must be ignored.
        let mut candles = vec![candle(101.0, 99.0, 100.0); 30];
        candles[10] = candle(101.0, 60.0, 100.0);
        let r = compute_support_resistance(&candles, 100.0, Some(1.0), 60, 2, 0.5, 0.006, 0.012);
        if let Some(s) = r.support_level {
            assert!(s > 70.0, "stale swing low {s} leaked through bounds");
        }
    }
}
