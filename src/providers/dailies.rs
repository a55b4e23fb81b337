// =============================================================================
// Daily History Client — candles and derived volume statistics
// =============================================================================
//
// Fetches daily OHLCV history, sorted ascending by trade date and sliced to
// the last N rows. The per-symbol cache lives under `candles_cache/` in the
// output directory; freshness is same calendar day of the file mtime.
//
// Canonical empty result: an empty candle vector.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::cache::FileCache;
use super::ProviderError;
use crate::market_data::{DailyCandle, IntradayCandle};

/// Endpoint identifier recorded in `SymbolSnapshot.field_sources`.
pub const DAILIES_ENDPOINT: &str = "/datav2/hist/dailies";
/// 4H intraday history endpoint (confirmation gate only).
pub const INTRADAY_ENDPOINT: &str = "/datav2/hist/intraday";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDailyRow {
    trade_date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntradayRow {
    ts: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

/// Parse raw rows into candles: rows with an unparseable date or any missing
/// OHLC component are dropped; the result is sorted ascending by date.
fn candles_from_rows(rows: &[RawDailyRow]) -> Vec<DailyCandle> {
    let mut candles: Vec<DailyCandle> = rows
        .iter()
        .filter_map(|r| {
            let date = NaiveDate::parse_from_str(
                r.trade_date.get(..10).unwrap_or(&r.trade_date),
                "%Y-%m-%d",
            )
            .ok()?;
            Some(DailyCandle {
                date,
                open: r.open?,
                high: r.high?,
                low: r.low?,
                close: r.close?,
                volume: r.volume.unwrap_or(0.0),
            })
        })
        .collect();
    candles.sort_by_key(|c| c.date);
    candles
}

/// Mean of the last 20 daily volumes. `None` with fewer than 20 rows — there
/// is no partial-window fallback.
pub fn avg_stock_volume_20d(candles: &[DailyCandle]) -> Option<f64> {
    if candles.len() < 20 {
        return None;
    }
    let tail = &candles[candles.len() - 20..];
    Some(tail.iter().map(|c| c.volume).sum::<f64>() / 20.0)
}

/// Client for daily and 4H candle history with a same-day file cache.
pub struct DailiesClient {
    http: reqwest::Client,
    base_url: String,
    cache: FileCache,
}

impl DailiesClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        cache_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache: FileCache::new(cache_dir),
        }
    }

    /// Fetch up to `limit` daily candles (oldest first). Canonical empty on
    /// failure.
    pub async fn fetch_dailies(&self, symbol: &str, limit: usize) -> Vec<DailyCandle> {
        let today = Utc::now().date_naive();
        if let Some(cached) = self.cache.load_if_fresh::<Vec<DailyCandle>>(symbol, today) {
            return slice_last_n(cached, limit);
        }

        match self.fetch_remote(symbol).await {
            Ok(candles) => {
                if let Err(e) = self.cache.store(symbol, &candles) {
                    warn!(symbol, error = %e, "failed to cache daily candles");
                }
                slice_last_n(candles, limit)
            }
            Err(e) => {
                warn!(symbol, error = %e, "daily history fetch failed — returning empty");
                Vec::new()
            }
        }
    }

    /// Fetch 4H intraday candles for the confirmation gate. Not cached —
    /// intraday bars roll within the day. Canonical empty on failure.
    pub async fn fetch_intraday_4h(&self, symbol: &str, limit: usize) -> Vec<IntradayCandle> {
        match self.fetch_intraday_remote(symbol).await {
            Ok(mut candles) => {
                candles.sort_by_key(|c| c.ts);
                let start = candles.len().saturating_sub(limit);
                candles.split_off(start)
            }
            Err(e) => {
                warn!(symbol, error = %e, "intraday history fetch failed — returning empty");
                Vec::new()
            }
        }
    }

    async fn fetch_remote(&self, symbol: &str) -> Result<Vec<DailyCandle>, ProviderError> {
        let url = format!("{}{}?symbol={}", self.base_url, DAILIES_ENDPOINT, symbol);

        let resp = self.http.get(&url).send().await.map_err(|e| ProviderError::Network {
            endpoint: DAILIES_ENDPOINT.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                endpoint: DAILIES_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        let rows: Vec<RawDailyRow> = resp.json().await.map_err(|e| ProviderError::Malformed {
            endpoint: DAILIES_ENDPOINT.to_string(),
            detail: e.to_string(),
        })?;

        let candles = candles_from_rows(&rows);
        debug!(symbol, count = candles.len(), "daily candles fetched");
        Ok(candles)
    }

    async fn fetch_intraday_remote(
        &self,
        symbol: &str,
    ) -> Result<Vec<IntradayCandle>, ProviderError> {
        let url = format!(
            "{}{}?symbol={}&interval=4h",
            self.base_url, INTRADAY_ENDPOINT, symbol
        );

        let resp = self.http.get(&url).send().await.map_err(|e| ProviderError::Network {
            endpoint: INTRADAY_ENDPOINT.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                endpoint: INTRADAY_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        let rows: Vec<RawIntradayRow> = resp.json().await.map_err(|e| ProviderError::Malformed {
            endpoint: INTRADAY_ENDPOINT.to_string(),
            detail: e.to_string(),
        })?;

        let candles = rows
            .iter()
            .filter_map(|r| {
                let ts = chrono::DateTime::parse_from_rfc3339(&r.ts)
                    .ok()?
                    .with_timezone(&Utc);
                Some(IntradayCandle {
                    ts,
                    open: r.open?,
                    high: r.high?,
                    low: r.low?,
                    close: r.close?,
                    volume: r.volume.unwrap_or(0.0),
                })
            })
            .collect();
        Ok(candles)
    }
}

fn slice_last_n(mut candles: Vec<DailyCandle>, limit: usize) -> Vec<DailyCandle> {
    let start = candles.len().saturating_sub(limit);
    candles.split_off(start)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn raw(date: &str, close: f64) -> RawDailyRow {
        RawDailyRow {
            trade_date: date.to_string(),
            open: Some(close),
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close: Some(close),
            volume: Some(1_000_000.0),
        }
    }

    #[test]
    fn rows_sorted_ascending() {
        let rows = vec![raw("2024-03-03", 3.0), raw("2024-03-01", 1.0), raw("2024-03-02", 2.0)];
        let candles = candles_from_rows(&rows);
        assert_eq!(candles.len(), 3);
        assert!(candles[0].date < candles[1].date && candles[1].date < candles[2].date);
        assert_eq!(candles[0].close, 1.0);
        assert_eq!(candles[2].close, 3.0);
    }

    #[test]
    fn rows_missing_ohlc_dropped() {
        let mut bad = raw("2024-03-04", 4.0);
        bad.close = None;
        let rows = vec![raw("2024-03-01", 1.0), bad];
        let candles = candles_from_rows(&rows);
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn rows_bad_date_dropped() {
        let rows = vec![raw("not-a-date", 1.0), raw("2024-03-02", 2.0)];
        let candles = candles_from_rows(&rows);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 2.0);
    }

    #[test]
    fn slice_keeps_most_recent() {
        let rows: Vec<RawDailyRow> = (1..=28).map(|d| raw(&format!("2024-03-{d:02}"), d as f64)).collect();
        let candles = slice_last_n(candles_from_rows(&rows), 5);
        assert_eq!(candles.len(), 5);
        assert_eq!(candles[0].close, 24.0);
        assert_eq!(candles[4].close, 28.0);
    }

    #[test]
    fn avg_volume_requires_20_rows() {
        let rows: Vec<RawDailyRow> = (1..=19).map(|d| raw(&format!("2024-03-{d:02}"), 1.0)).collect();
        assert!(avg_stock_volume_20d(&candles_from_rows(&rows)).is_none());
    }

    #[test]
    fn avg_volume_over_last_20() {
        let mut rows: Vec<RawDailyRow> = Vec::new();
        // 5 old rows at 2M, 20 recent rows at 1M — only the last 20 count.
        for d in 1..=5 {
            let mut r = raw(&format!("2024-02-{d:02}"), 1.0);
            r.volume = Some(2_000_000.0);
            rows.push(r);
        }
        for d in 1..=20 {
            rows.push(raw(&format!("2024-03-{d:02}"), 1.0));
        }
        let avg = avg_stock_volume_20d(&candles_from_rows(&rows)).unwrap();
        assert!((avg - 1_000_000.0).abs() < 1e-6);
    }
}
