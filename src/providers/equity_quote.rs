// =============================================================================
// Delayed Equity Quote Client
// =============================================================================
//
// Fetches the delayed underlying quote (price / bid / ask / volume /
// quote_date). This is the ONLY equity-quote path in the engine: live quote
// endpoints are explicitly forbidden for snapshot construction, so none are
// implemented here.
//
// Canonical empty result: an `EquityQuote` with every field `None`.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cache::FileCache;
use super::ProviderError;

/// Endpoint identifier recorded in `SymbolSnapshot.field_sources`.
pub const DELAYED_QUOTE_ENDPOINT: &str = "/datav2/delayed/quote";

/// Delayed underlying quote. Every field is nullable; a missing field stays
/// `None` and is never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityQuote {
    pub price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: Option<i64>,
    /// Trading date of the observation.
    pub quote_date: Option<NaiveDate>,
}

/// Raw provider payload for the delayed quote row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuoteRow {
    stock_price: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    stock_volume: Option<i64>,
    quote_date: Option<String>,
}

/// Map the raw payload into the canonical quote. Unparseable dates become
/// `None` rather than an error — the data-dependency checker decides what
/// that means downstream.
fn quote_from_raw(raw: &RawQuoteRow) -> EquityQuote {
    let quote_date = raw
        .quote_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok());
    EquityQuote {
        price: raw.stock_price.filter(|v| v.is_finite()),
        bid: raw.bid.filter(|v| v.is_finite()),
        ask: raw.ask.filter(|v| v.is_finite()),
        volume: raw.stock_volume,
        quote_date,
    }
}

/// Client for the delayed equity quote endpoint with a same-day file cache.
pub struct EquityQuoteClient {
    http: reqwest::Client,
    base_url: String,
    cache: FileCache,
}

impl EquityQuoteClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, cache_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache: FileCache::new(cache_dir),
        }
    }

    /// Fetch the delayed quote for `symbol`.
    ///
    /// Returns the canonical empty quote on any provider failure; the error
    /// is logged here and surfaced upstream as missing data.
    pub async fn fetch(&self, symbol: &str) -> EquityQuote {
        let today = Utc::now().date_naive();
        if let Some(cached) = self.cache.load_if_fresh::<EquityQuote>(symbol, today) {
            return cached;
        }

        match self.fetch_remote(symbol).await {
            Ok(quote) => {
                if let Err(e) = self.cache.store(symbol, &quote) {
                    warn!(symbol, error = %e, "failed to cache delayed quote");
                }
                quote
            }
            Err(e) => {
                warn!(symbol, error = %e, "delayed quote fetch failed — returning empty quote");
                EquityQuote::default()
            }
        }
    }

    async fn fetch_remote(&self, symbol: &str) -> Result<EquityQuote, ProviderError> {
        let url = format!(
            "{}{}?symbol={}",
            self.base_url, DELAYED_QUOTE_ENDPOINT, symbol
        );

        let resp = self.http.get(&url).send().await.map_err(|e| ProviderError::Network {
            endpoint: DELAYED_QUOTE_ENDPOINT.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                endpoint: DELAYED_QUOTE_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        let raw: RawQuoteRow = resp.json().await.map_err(|e| ProviderError::Malformed {
            endpoint: DELAYED_QUOTE_ENDPOINT.to_string(),
            detail: e.to_string(),
        })?;

        let quote = quote_from_raw(&raw);
        debug!(symbol, price = ?quote.price, quote_date = ?quote.quote_date, "delayed quote fetched");
        Ok(quote)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_quote_maps_all_fields() {
        let raw: RawQuoteRow = serde_json::from_str(
            r#"{"stockPrice": 450.0, "bid": 449.9, "ask": 450.1, "stockVolume": 1000000, "quoteDate": "2026-02-10"}"#,
        )
        .unwrap();
        let q = quote_from_raw(&raw);
        assert_eq!(q.price, Some(450.0));
        assert_eq!(q.bid, Some(449.9));
        assert_eq!(q.ask, Some(450.1));
        assert_eq!(q.volume, Some(1_000_000));
        assert_eq!(q.quote_date, NaiveDate::from_ymd_opt(2026, 2, 10));
    }

    #[test]
    fn missing_fields_stay_none() {
        let raw: RawQuoteRow = serde_json::from_str(r#"{"stockPrice": 100.0}"#).unwrap();
        let q = quote_from_raw(&raw);
        assert_eq!(q.price, Some(100.0));
        assert!(q.bid.is_none());
        assert!(q.ask.is_none());
        assert!(q.volume.is_none());
        assert!(q.quote_date.is_none());
    }

    #[test]
    fn non_finite_price_dropped() {
        let raw = RawQuoteRow {
            stock_price: Some(f64::NAN),
            bid: None,
            ask: None,
            stock_volume: None,
            quote_date: None,
        };
        let q = quote_from_raw(&raw);
        assert!(q.price.is_none());
    }

    #[test]
    fn timestamp_prefix_date_parses() {
        let raw = RawQuoteRow {
            stock_price: Some(1.0),
            bid: None,
            ask: None,
            stock_volume: None,
            quote_date: Some("2026-02-10T16:00:00Z".to_string()),
        };
        let q = quote_from_raw(&raw);
        assert_eq!(q.quote_date, NaiveDate::from_ymd_opt(2026, 2, 10));
    }

    #[test]
    fn canonical_empty_is_all_none() {
        let q = EquityQuote::default();
        assert!(q.price.is_none() && q.bid.is_none() && q.ask.is_none());
        assert!(q.volume.is_none() && q.quote_date.is_none());
    }
}
