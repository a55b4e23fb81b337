// =============================================================================
// Provider Clients Module
// =============================================================================
//
// One client per provider concern: delayed equity quote, core statistics
// (IV rank, option volumes), daily candle history, and the option chain.
//
// Client contract (every client):
//   - On HTTP non-200, network error, or malformed payload: log and return
//     the canonical empty result. Errors never cross the client boundary.
//   - File caches are keyed by symbol with same-calendar-day freshness and
//     are written only after a successful fetch.
//   - Daily rows are sorted ascending by trade date and sliced to last-N.

pub mod cache;
pub mod chain;
pub mod core_stats;
pub mod dailies;
pub mod equity_quote;

use thiserror::Error;

/// Internal provider failure. Clients convert these into canonical empty
/// results at their public boundary; the kind is only used for logging and
/// diagnostics strings.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },
}

/// Build a reqwest client with the configured per-request timeout.
pub fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to build reqwest client")
}
