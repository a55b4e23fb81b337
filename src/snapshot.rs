// =============================================================================
// Symbol Snapshot Service — canonical per-symbol market data composition
// =============================================================================
//
// Composes provider outputs into one immutable `SymbolSnapshot`:
//
//   price / bid / ask / volume / quote_date  <- delayed equity quote
//   iv_rank, avg_option_volume_20d           <- core statistics endpoint
//   avg_stock_volume_20d                     <- derived from daily history
//
// For every field the snapshot records the endpoint it came from and, when
// null, a missing reason. Live equity-quote paths are forbidden: the service
// only links against the delayed quote client, so a LIVE fallback cannot be
// reintroduced without changing this module.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_quality::DataQuality;
use crate::market_data::DailyCandle;
use crate::providers::core_stats::{CoreStats, CoreStatsClient, CORE_STATS_ENDPOINT};
use crate::providers::dailies::{avg_stock_volume_20d, DailiesClient, DAILIES_ENDPOINT};
use crate::providers::equity_quote::{EquityQuote, EquityQuoteClient, DELAYED_QUOTE_ENDPOINT};

/// Daily candles requested per symbol (enough for the EMA200 stack plus
/// slope lookback).
pub const DAILY_CANDLE_LIMIT: usize = 260;

/// Canonical per-symbol snapshot. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub ticker: String,
    pub price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: Option<i64>,
    pub quote_date: Option<chrono::NaiveDate>,
    /// IV rank 0-100.
    pub iv_rank: Option<f64>,
    pub avg_option_volume_20d: Option<f64>,
    pub avg_stock_volume_20d: Option<f64>,
    /// field name -> provider endpoint it came from.
    pub field_sources: BTreeMap<String, String>,
    /// field name -> reason the field is null.
    pub missing_reasons: BTreeMap<String, String>,
    /// provider endpoint -> RFC3339 timestamp of the call.
    pub as_of: BTreeMap<String, String>,
    pub fetched_at: String,
}

impl SymbolSnapshot {
    /// Quality view over the snapshot's evaluation fields, for completeness
    /// computation and Stage-1 detail maps.
    pub fn field_qualities(&self) -> Vec<(&'static str, DataQuality)> {
        fn q<T>(v: &Option<T>) -> DataQuality {
            if v.is_some() {
                DataQuality::Valid
            } else {
                DataQuality::Missing
            }
        }
        vec![
            ("price", q(&self.price)),
            ("bid", q(&self.bid)),
            ("ask", q(&self.ask)),
            ("volume", q(&self.volume)),
            ("quote_date", q(&self.quote_date)),
            ("iv_rank", q(&self.iv_rank)),
        ]
    }
}

/// Snapshot plus the daily candles that fed it, so the eligibility engine
/// reuses the same series the snapshot derived its volume stats from.
#[derive(Debug, Clone)]
pub struct SnapshotBuildResult {
    pub snapshot: SymbolSnapshot,
    pub candles: Vec<DailyCandle>,
}

/// Compose a snapshot from already-fetched provider outputs. Pure — the
/// async service wraps this with the actual fetches.
pub fn compose_snapshot(
    symbol: &str,
    quote: &EquityQuote,
    stats: &CoreStats,
    candles: &[DailyCandle],
    now_iso: &str,
) -> SymbolSnapshot {
    let mut field_sources = BTreeMap::new();
    let mut missing_reasons = BTreeMap::new();

    let mut record_f64 = |name: &str, value: Option<f64>, endpoint: &str| {
        if value.is_some() {
            field_sources.insert(name.to_string(), endpoint.to_string());
        } else {
            missing_reasons.insert(
                name.to_string(),
                format!("{name} not provided by source"),
            );
        }
    };

    record_f64("price", quote.price, DELAYED_QUOTE_ENDPOINT);
    record_f64("bid", quote.bid, DELAYED_QUOTE_ENDPOINT);
    record_f64("ask", quote.ask, DELAYED_QUOTE_ENDPOINT);
    record_f64("iv_rank", stats.iv_rank, CORE_STATS_ENDPOINT);
    record_f64(
        "avg_option_volume_20d",
        stats.avg_option_volume_20d,
        CORE_STATS_ENDPOINT,
    );

    if quote.volume.is_some() {
        field_sources.insert("volume".to_string(), DELAYED_QUOTE_ENDPOINT.to_string());
    } else {
        missing_reasons.insert(
            "volume".to_string(),
            "volume not provided by source".to_string(),
        );
    }
    if quote.quote_date.is_some() {
        field_sources.insert("quote_date".to_string(), DELAYED_QUOTE_ENDPOINT.to_string());
    } else {
        missing_reasons.insert(
            "quote_date".to_string(),
            "quote_date not provided by source".to_string(),
        );
    }

    let avg_stock_vol = avg_stock_volume_20d(candles);
    if avg_stock_vol.is_some() {
        field_sources.insert(
            "avg_stock_volume_20d".to_string(),
            DAILIES_ENDPOINT.to_string(),
        );
    } else {
        missing_reasons.insert(
            "avg_stock_volume_20d".to_string(),
            "fewer than 20 daily rows for volume average".to_string(),
        );
    }

    let mut as_of = BTreeMap::new();
    as_of.insert(DELAYED_QUOTE_ENDPOINT.to_string(), now_iso.to_string());
    as_of.insert(CORE_STATS_ENDPOINT.to_string(), now_iso.to_string());
    as_of.insert(DAILIES_ENDPOINT.to_string(), now_iso.to_string());

    SymbolSnapshot {
        ticker: symbol.trim().to_uppercase(),
        price: quote.price,
        bid: quote.bid,
        ask: quote.ask,
        volume: quote.volume,
        quote_date: quote.quote_date,
        iv_rank: stats.iv_rank,
        avg_option_volume_20d: stats.avg_option_volume_20d,
        avg_stock_volume_20d: avg_stock_vol,
        field_sources,
        missing_reasons,
        as_of,
        fetched_at: now_iso.to_string(),
    }
}

/// Async snapshot builder over the three provider clients.
pub struct SnapshotService {
    pub quote_client: EquityQuoteClient,
    pub core_client: CoreStatsClient,
    pub dailies_client: DailiesClient,
}

impl SnapshotService {
    /// Build the canonical snapshot for `symbol`. Provider failures surface
    /// as missing fields, never as errors.
    pub async fn build(&self, symbol: &str) -> SnapshotBuildResult {
        let quote = self.quote_client.fetch(symbol).await;
        let stats = self.core_client.fetch(symbol).await;
        let candles = self.dailies_client.fetch_dailies(symbol, DAILY_CANDLE_LIMIT).await;

        let now_iso = Utc::now().to_rfc3339();
        let snapshot = compose_snapshot(symbol, &quote, &stats, &candles, &now_iso);

        debug!(
            symbol,
            price = ?snapshot.price,
            iv_rank = ?snapshot.iv_rank,
            candles = candles.len(),
            missing = snapshot.missing_reasons.len(),
            "snapshot built"
        );

        SnapshotBuildResult { snapshot, candles }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn full_quote() -> EquityQuote {
        EquityQuote {
            price: Some(450.0),
            bid: Some(449.9),
            ask: Some(450.1),
            volume: Some(1_000_000),
            quote_date: NaiveDate::from_ymd_opt(2026, 2, 10),
        }
    }

    fn candles(n: usize) -> Vec<DailyCandle> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..n)
            .map(|i| DailyCandle {
                date: start + chrono::Days::new(i as u64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 2_000_000.0,
            })
            .collect()
    }

    #[test]
    fn full_snapshot_records_sources() {
        let stats = CoreStats {
            iv_rank: Some(25.0),
            avg_option_volume_20d: Some(15_000.0),
        };
        let snap = compose_snapshot("spy", &full_quote(), &stats, &candles(30), "2026-02-10T16:00:00Z");

        assert_eq!(snap.ticker, "SPY");
        assert_eq!(snap.price, Some(450.0));
        assert_eq!(snap.iv_rank, Some(25.0));
        assert_eq!(snap.avg_stock_volume_20d, Some(2_000_000.0));
        assert_eq!(
            snap.field_sources.get("price").map(String::as_str),
            Some(DELAYED_QUOTE_ENDPOINT)
        );
        assert_eq!(
            snap.field_sources.get("iv_rank").map(String::as_str),
            Some(CORE_STATS_ENDPOINT)
        );
        assert_eq!(
            snap.field_sources.get("avg_stock_volume_20d").map(String::as_str),
            Some(DAILIES_ENDPOINT)
        );
        assert!(snap.missing_reasons.is_empty());
    }

    #[test]
    fn missing_fields_carry_reasons_not_zeros() {
        let snap = compose_snapshot(
            "NVDA",
            &EquityQuote::default(),
            &CoreStats::default(),
            &[],
            "2026-02-10T16:00:00Z",
        );
        assert!(snap.price.is_none());
        assert!(snap.iv_rank.is_none());
        assert_eq!(
            snap.missing_reasons.get("price").map(String::as_str),
            Some("price not provided by source")
        );
        assert!(snap.missing_reasons.contains_key("iv_rank"));
        assert!(snap.missing_reasons.contains_key("avg_stock_volume_20d"));
        assert!(snap.field_sources.is_empty());
    }

    #[test]
    fn short_candle_history_leaves_volume_stat_missing() {
        let snap = compose_snapshot(
            "SPY",
            &full_quote(),
            &CoreStats::default(),
            &candles(10),
            "2026-02-10T16:00:00Z",
        );
        assert!(snap.avg_stock_volume_20d.is_none());
        assert!(snap
            .missing_reasons
            .get("avg_stock_volume_20d")
            .unwrap()
            .contains("fewer than 20"));
    }

    #[test]
    fn field_qualities_track_presence() {
        let snap = compose_snapshot(
            "SPY",
            &full_quote(),
            &CoreStats::default(),
            &candles(30),
            "2026-02-10T16:00:00Z",
        );
        let qualities = snap.field_qualities();
        let get = |name: &str| qualities.iter().find(|(n, _)| *n == name).map(|(_, q)| *q);
        assert_eq!(get("price"), Some(DataQuality::Valid));
        assert_eq!(get("iv_rank"), Some(DataQuality::Missing));
    }

    #[test]
    fn as_of_covers_every_endpoint() {
        let snap = compose_snapshot(
            "SPY",
            &full_quote(),
            &CoreStats::default(),
            &candles(30),
            "2026-02-10T16:00:00Z",
        );
        assert!(snap.as_of.contains_key(DELAYED_QUOTE_ENDPOINT));
        assert!(snap.as_of.contains_key(CORE_STATS_ENDPOINT));
        assert!(snap.as_of.contains_key(DAILIES_ENDPOINT));
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snap = compose_snapshot(
            "SPY",
            &full_quote(),
            &CoreStats::default(),
            &candles(30),
            "2026-02-10T16:00:00Z",
        );
        let json = serde_json::to_string(&snap).unwrap();
        let back: SymbolSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ticker, snap.ticker);
        assert_eq!(back.price, snap.price);
        assert_eq!(back.missing_reasons, snap.missing_reasons);
    }
}
