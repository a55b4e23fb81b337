// =============================================================================
// Market Calendar — exchange phases and trading-day arithmetic
// =============================================================================
//
// Phases are derived from the US equity session in America/New_York:
//
//   PRE     04:00 – 09:30
//   OPEN    09:30 – 10:30  (opening hour)
//   MID     10:30 – 16:00
//   POST    16:00 – 20:00  (after-hours)
//   CLOSED  everything else, and weekends
//
// Trading-day arithmetic counts weekdays only. Exchange holidays are not
// modelled; staleness thresholds are configured with that slack in mind.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;

use crate::types::MarketPhase;

/// Classify an instant into a market phase using the New York session clock.
pub fn market_phase(now: DateTime<Utc>) -> MarketPhase {
    let local = now.with_timezone(&New_York);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return MarketPhase::Closed;
    }

    let t = local.time();
    let pre_start = NaiveTime::from_hms_opt(4, 0, 0).unwrap_or_default();
    let open_bell = NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default();
    let open_end = NaiveTime::from_hms_opt(10, 30, 0).unwrap_or_default();
    let close_bell = NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default();
    let post_end = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default();

    if t >= pre_start && t < open_bell {
        MarketPhase::Pre
    } else if t >= open_bell && t < open_end {
        MarketPhase::Open
    } else if t >= open_end && t < close_bell {
        MarketPhase::Mid
    } else if t >= close_bell && t < post_end {
        MarketPhase::Post
    } else {
        MarketPhase::Closed
    }
}

/// True when the date falls on a weekday.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Count trading days strictly between `from` and `today` (exclusive of
/// `from`, inclusive of nothing past `today`). Same-day and future dates
/// count as zero.
pub fn trading_days_since(from: NaiveDate, today: NaiveDate) -> i64 {
    if from >= today {
        return 0;
    }
    let mut count = 0;
    let mut d = from;
    while d < today {
        d = d + chrono::Days::new(1);
        if is_trading_day(d) {
            count += 1;
        }
    }
    count
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn weekend_is_closed() {
        // Saturday noon ET.
        assert_eq!(market_phase(utc("2024-06-08T16:00:00Z")), MarketPhase::Closed);
    }

    #[test]
    fn premarket_phase() {
        // 2024-06-10 is a Monday; 08:00 ET = 12:00 UTC (EDT).
        assert_eq!(market_phase(utc("2024-06-10T12:00:00Z")), MarketPhase::Pre);
    }

    #[test]
    fn opening_hour_phase() {
        // 10:00 ET = 14:00 UTC.
        assert_eq!(market_phase(utc("2024-06-10T14:00:00Z")), MarketPhase::Open);
    }

    #[test]
    fn midday_phase() {
        // 13:00 ET = 17:00 UTC.
        assert_eq!(market_phase(utc("2024-06-10T17:00:00Z")), MarketPhase::Mid);
    }

    #[test]
    fn after_hours_phase() {
        // 17:00 ET = 21:00 UTC.
        assert_eq!(market_phase(utc("2024-06-10T21:00:00Z")), MarketPhase::Post);
    }

    #[test]
    fn overnight_closed() {
        // 02:00 ET = 06:00 UTC.
        assert_eq!(market_phase(utc("2024-06-10T06:00:00Z")), MarketPhase::Closed);
    }

    #[test]
    fn trading_days_skip_weekends() {
        // Friday -> Monday is one trading day.
        let fri = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let mon = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(trading_days_since(fri, mon), 1);
    }

    #[test]
    fn trading_days_same_day_is_zero() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(trading_days_since(d, d), 0);
    }

    #[test]
    fn trading_days_future_from_is_zero() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let future = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        assert_eq!(trading_days_since(future, today), 0);
    }

    #[test]
    fn trading_days_full_week() {
        let mon = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let next_mon = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(trading_days_since(mon, next_mon), 5);
    }
}
