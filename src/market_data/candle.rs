// =============================================================================
// Candles — daily and intraday OHLCV bars
// =============================================================================
//
// Daily bars drive the eligibility engine and regime classifiers; 4H intraday
// bars feed the optional intraday confirmation gate. Weekly bars are derived
// from daily bars by resampling (never fetched).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCandle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single intraday OHLCV bar (4H timeframe for the confirmation gate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayCandle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Resample daily bars into weekly bars (ISO week buckets).
///
/// open = first, high = max, low = min, close = last, volume = sum. The
/// weekly bar is dated at the last daily bar of the week. Input must be
/// sorted ascending; output is ascending as well. Empty input yields empty
/// output.
pub fn resample_weekly(daily: &[DailyCandle]) -> Vec<DailyCandle> {
    let mut weekly: Vec<DailyCandle> = Vec::new();
    let mut current_key: Option<(i32, u32)> = None;

    for bar in daily {
        let iso = bar.date.iso_week();
        let key = (iso.year(), iso.week());

        if current_key == Some(key) {
            if let Some(agg) = weekly.last_mut() {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.date = bar.date;
                continue;
            }
        }
        weekly.push(bar.clone());
        current_key = Some(key);
    }

    weekly
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32, open: f64, high: f64, low: f64, close: f64) -> DailyCandle {
        DailyCandle {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn weekly_empty_input() {
        assert!(resample_weekly(&[]).is_empty());
    }

    #[test]
    fn weekly_aggregates_one_week() {
        // 2024-01-01 (Mon) .. 2024-01-05 (Fri) — one ISO week.
        let daily = vec![
            day(2024, 1, 1, 100.0, 105.0, 99.0, 104.0),
            day(2024, 1, 2, 104.0, 110.0, 103.0, 108.0),
            day(2024, 1, 3, 108.0, 109.0, 101.0, 102.0),
            day(2024, 1, 4, 102.0, 106.0, 100.0, 105.0),
            day(2024, 1, 5, 105.0, 107.0, 104.0, 106.0),
        ];
        let weekly = resample_weekly(&daily);
        assert_eq!(weekly.len(), 1);
        let w = &weekly[0];
        assert_eq!(w.open, 100.0);
        assert_eq!(w.high, 110.0);
        assert_eq!(w.low, 99.0);
        assert_eq!(w.close, 106.0);
        assert_eq!(w.volume, 5_000.0);
        assert_eq!(w.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn weekly_splits_across_weeks() {
        // Friday then the following Monday land in different ISO weeks.
        let daily = vec![
            day(2024, 1, 5, 100.0, 101.0, 99.0, 100.5),
            day(2024, 1, 8, 101.0, 102.0, 100.0, 101.5),
        ];
        let weekly = resample_weekly(&daily);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].close, 100.5);
        assert_eq!(weekly[1].close, 101.5);
    }

    #[test]
    fn candle_serde_roundtrip() {
        let c = day(2024, 3, 15, 1.0, 2.0, 0.5, 1.5);
        let json = serde_json::to_string(&c).unwrap();
        let back: DailyCandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
