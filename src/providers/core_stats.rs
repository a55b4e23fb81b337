// =============================================================================
// Core Statistics Client — IV rank and 20-day option volume
// =============================================================================
//
// Canonical empty result: a `CoreStats` with every field `None`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cache::FileCache;
use super::ProviderError;

/// Endpoint identifier recorded in `SymbolSnapshot.field_sources`.
pub const CORE_STATS_ENDPOINT: &str = "/datav2/cores";

/// IV statistics and average option volume for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreStats {
    /// IV rank 0-100.
    pub iv_rank: Option<f64>,
    pub avg_option_volume_20d: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCoreRow {
    iv_rank: Option<f64>,
    avg_opt_volu_20d: Option<f64>,
}

fn stats_from_raw(raw: &RawCoreRow) -> CoreStats {
    CoreStats {
        iv_rank: raw.iv_rank.filter(|v| v.is_finite() && (0.0..=100.0).contains(v)),
        avg_option_volume_20d: raw.avg_opt_volu_20d.filter(|v| v.is_finite() && *v >= 0.0),
    }
}

/// Client for the core statistics endpoint with a same-day file cache.
pub struct CoreStatsClient {
    http: reqwest::Client,
    base_url: String,
    cache: FileCache,
}

impl CoreStatsClient {
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

    /// Fetch core stats for `symbol`; canonical empty on failure.
    pub async fn fetch(&self, symbol: &str) -> CoreStats {
        let today = Utc::now().date_naive();
        if let Some(cached) = self.cache.load_if_fresh::<CoreStats>(symbol, today) {
            return cached;
        }

        match self.fetch_remote(symbol).await {
            Ok(stats) => {
                if let Err(e) = self.cache.store(symbol, &stats) {
                    warn!(symbol, error = %e, "failed to cache core stats");
                }
                stats
            }
            Err(e) => {
                warn!(symbol, error = %e, "core stats fetch failed — returning empty stats");
                CoreStats::default()
            }
        }
    }

    async fn fetch_remote(&self, symbol: &str) -> Result<CoreStats, ProviderError> {
        let url = format!("{}{}?symbol={}", self.base_url, CORE_STATS_ENDPOINT, symbol);

        let resp = self.http.get(&url).send().await.map_err(|e| ProviderError::Network {
            endpoint: CORE_STATS_ENDPOINT.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                endpoint: CORE_STATS_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        let raw: RawCoreRow = resp.json().await.map_err(|e| ProviderError::Malformed {
            endpoint: CORE_STATS_ENDPOINT.to_string(),
            detail: e.to_string(),
        })?;

        let stats = stats_from_raw(&raw);
        debug!(symbol, iv_rank = ?stats.iv_rank, "core stats fetched");
        Ok(stats)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_maps_fields() {
        let raw: RawCoreRow =
            serde_json::from_str(r#"{"ivRank": 25.0, "avgOptVolu20d": 15000.0}"#).unwrap();
        let s = stats_from_raw(&raw);
        assert_eq!(s.iv_rank, Some(25.0));
        assert_eq!(s.avg_option_volume_20d, Some(15_000.0));
    }

    #[test]
    fn iv_rank_out_of_range_dropped() {
        let raw = RawCoreRow {
            iv_rank: Some(150.0),
            avg_opt_volu_20d: None,
        };
        assert!(stats_from_raw(&raw).iv_rank.is_none());
        let raw = RawCoreRow {
            iv_rank: Some(-5.0),
            avg_opt_volu_20d: None,
        };
        assert!(stats_from_raw(&raw).iv_rank.is_none());
    }

    #[test]
    fn negative_volume_dropped() {
        let raw = RawCoreRow {
            iv_rank: None,
            avg_opt_volu_20d: Some(-1.0),
        };
        assert!(stats_from_raw(&raw).avg_option_volume_20d.is_none());
    }

    #[test]
    fn canonical_empty_is_all_none() {
        let s = CoreStats::default();
        assert!(s.iv_rank.is_none());
        assert!(s.avg_option_volume_20d.is_none());
    }
}
