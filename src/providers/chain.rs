// =============================================================================
// Option Chain Client — base-chain fetch with near-spot strike discipline
// =============================================================================
//
// `fetch_base_chain` returns `(contracts, underlying_price, error, meta)` for
// the requested DTE window. Strike-range invariant:
//
//   CSP: spot * 0.80 <= strike < spot      (OTM puts, no deep OTM)
//   CC:  spot < strike <= spot * 1.20      (OTM calls)
//
// Rows outside the window are dropped before contracts are built, so a
// provider bug can never leak a strike-5 put against a 186 spot. Contract
// fields are wrapped as `FieldValue`s — the raw provider row is the only
// place `Option` mingles with untyped JSON.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ProviderError;
use crate::data_quality::{wrap_f64, wrap_i64, FieldValue};
use crate::types::{ChainSource, ModeDecision, OptionType};

/// Endpoint identifier for chain fetches.
pub const CHAIN_ENDPOINT: &str = "/datav2/strikes/chain";

/// CSP floor: no strikes below 80% of spot.
pub const MIN_OTM_STRIKE_PCT: f64 = 0.80;
/// CC ceiling: no strikes above 120% of spot.
pub const MAX_OTM_STRIKE_PCT: f64 = 1.20;

/// One option contract with per-field quality tracking.
///
/// `delta` is stored exactly as the provider returned it (either sign
/// convention); magnitude/normalization is the selector's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: FieldValue<f64>,
    pub ask: FieldValue<f64>,
    pub mid: FieldValue<f64>,
    pub last: FieldValue<f64>,
    pub open_interest: FieldValue<i64>,
    pub volume: FieldValue<i64>,
    pub delta: FieldValue<f64>,
    pub gamma: FieldValue<f64>,
    pub theta: FieldValue<f64>,
    pub vega: FieldValue<f64>,
    pub iv: FieldValue<f64>,
    pub spread: FieldValue<f64>,
    pub spread_pct: FieldValue<f64>,
    pub dte: i64,
}

impl OptionContract {
    /// Derive mid, spread, and spread_pct from bid/ask. Derivation only runs
    /// when both sides are VALID; otherwise the derived fields stay MISSING.
    pub fn compute_derived_fields(&mut self) {
        let (bid, ask) = match (self.bid.value_copied(), self.ask.value_copied()) {
            (Some(b), Some(a)) => (b, a),
            _ => return,
        };
        let mid = (bid + ask) / 2.0;
        let spread = ask - bid;
        self.mid = FieldValue::valid("mid", mid);
        self.spread = FieldValue::valid("spread", spread);
        if mid > 0.0 {
            self.spread_pct = FieldValue::valid("spread_pct", spread / mid);
        }
    }

    /// OCC-style display symbol used in selector diagnostics.
    pub fn display_symbol(&self) -> String {
        let type_code = match self.option_type {
            OptionType::Put => "P",
            OptionType::Call => "C",
        };
        format!(
            "{}{}{}{}",
            self.symbol,
            self.expiration.format("%y%m%d"),
            type_code,
            (self.strike * 1000.0).round() as i64
        )
    }
}

/// Raw provider chain row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChainRow {
    pub expir_date: String,
    pub strike: Option<f64>,
    pub dte: Option<i64>,
    pub stock_price: Option<f64>,
    pub option_type: Option<String>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub iv: Option<f64>,
}

/// Diagnostics captured during a base-chain fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainFetchMeta {
    pub rows_seen: usize,
    pub rows_in_dte_window: usize,
    pub rows_in_strike_range: usize,
    pub puts_requested: usize,
    pub calls_requested: usize,
    pub requested_strike_min: Option<f64>,
    pub requested_strike_max: Option<f64>,
    pub expirations_available: usize,
    pub source: ChainSource,
}

/// Result tuple of a base-chain fetch.
#[derive(Debug, Clone)]
pub struct ChainFetchResult {
    pub contracts: Vec<OptionContract>,
    pub underlying_price: Option<f64>,
    pub error: Option<String>,
    pub meta: ChainFetchMeta,
}

impl ChainFetchResult {
    fn empty(error: Option<String>, source: ChainSource) -> Self {
        Self {
            contracts: Vec::new(),
            underlying_price: None,
            error,
            meta: ChainFetchMeta {
                source,
                ..ChainFetchMeta::default()
            },
        }
    }
}

fn parse_option_type(raw: Option<&str>) -> Option<OptionType> {
    match raw?.trim().to_uppercase().as_str() {
        "P" | "PUT" | "PUTS" => Some(OptionType::Put),
        "C" | "CALL" | "CALLS" => Some(OptionType::Call),
        _ => None,
    }
}

/// Build typed contracts from raw rows, enforcing the DTE window and the
/// near-spot strike range for the requested mode. Pure and deterministic —
/// `today` is passed in so DTE derivation never reads the wall clock.
pub fn build_contracts_from_rows(
    symbol: &str,
    rows: &[RawChainRow],
    mode: ModeDecision,
    dte_min: i64,
    dte_max: i64,
    today: NaiveDate,
    source: ChainSource,
) -> ChainFetchResult {
    let mut meta = ChainFetchMeta {
        rows_seen: rows.len(),
        source,
        ..ChainFetchMeta::default()
    };

    // Spot comes from the underlying price stamped on the rows.
    let spot = rows.iter().find_map(|r| r.stock_price.filter(|p| *p > 0.0));
    let Some(spot) = spot else {
        return ChainFetchResult {
            underlying_price: None,
            error: Some("chain rows carry no underlying price".to_string()),
            contracts: Vec::new(),
            meta,
        };
    };

    let (strike_lo, strike_hi_excl, want_type) = match mode {
        ModeDecision::Csp => (spot * MIN_OTM_STRIKE_PCT, spot, OptionType::Put),
        ModeDecision::Cc => (spot, spot * MAX_OTM_STRIKE_PCT, OptionType::Call),
        ModeDecision::None => {
            return ChainFetchResult {
                underlying_price: Some(spot),
                error: Some("base chain requested with mode NONE".to_string()),
                contracts: Vec::new(),
                meta,
            };
        }
    };

    let mut contracts = Vec::new();
    let mut expirations: Vec<NaiveDate> = Vec::new();

    for row in rows {
        let Ok(expiration) = NaiveDate::parse_from_str(
            row.expir_date.get(..10).unwrap_or(&row.expir_date),
            "%Y-%m-%d",
        ) else {
            continue;
        };
        let Some(strike) = row.strike.filter(|s| s.is_finite() && *s > 0.0) else {
            continue;
        };

        let dte = row.dte.unwrap_or_else(|| (expiration - today).num_days());
        if dte < dte_min || dte > dte_max {
            continue;
        }
        meta.rows_in_dte_window += 1;

        // Strike-range invariant per mode. CSP keeps [0.80*spot, spot); CC
        // keeps (spot, 1.20*spot].
        let in_range = match mode {
            ModeDecision::Csp => strike >= strike_lo && strike < strike_hi_excl,
            _ => strike > strike_lo && strike <= strike_hi_excl,
        };
        if !in_range {
            continue;
        }
        meta.rows_in_strike_range += 1;

        // Rows without an explicit type inherit the mode's requested side.
        let option_type = parse_option_type(row.option_type.as_deref()).unwrap_or(want_type);
        match option_type {
            OptionType::Put => meta.puts_requested += 1,
            OptionType::Call => meta.calls_requested += 1,
        }

        if !expirations.contains(&expiration) {
            expirations.push(expiration);
        }

        let mut contract = OptionContract {
            symbol: symbol.to_uppercase(),
            expiration,
            strike,
            option_type,
            bid: wrap_f64(row.bid, "bid", true),
            ask: wrap_f64(row.ask, "ask", true),
            mid: FieldValue::missing("mid"),
            last: wrap_f64(row.last, "last", true),
            open_interest: wrap_i64(row.open_interest, "open_interest", true),
            volume: wrap_i64(row.volume, "volume", true),
            delta: wrap_f64(row.delta, "delta", true),
            gamma: wrap_f64(row.gamma, "gamma", true),
            theta: wrap_f64(row.theta, "theta", true),
            vega: wrap_f64(row.vega, "vega", true),
            iv: wrap_f64(row.iv, "iv", true),
            spread: FieldValue::missing("spread"),
            spread_pct: FieldValue::missing("spread_pct"),
            dte,
        };
        contract.compute_derived_fields();
        contracts.push(contract);
    }

    meta.expirations_available = expirations.len();
    meta.requested_strike_min = contracts
        .iter()
        .map(|c| c.strike)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))));
    meta.requested_strike_max = contracts
        .iter()
        .map(|c| c.strike)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

    ChainFetchResult {
        contracts,
        underlying_price: Some(spot),
        error: None,
        meta,
    }
}

/// Locate the bid/ask of a specific contract among raw rows.
pub fn find_contract_quote(
    rows: &[RawChainRow],
    strike: f64,
    expiration: NaiveDate,
) -> Option<(f64, f64)> {
    rows.iter().find_map(|r| {
        let row_exp = NaiveDate::parse_from_str(
            r.expir_date.get(..10).unwrap_or(&r.expir_date),
            "%Y-%m-%d",
        )
        .ok()?;
        if row_exp != expiration {
            return None;
        }
        let row_strike = r.strike?;
        if (row_strike - strike).abs() > 1e-6 {
            return None;
        }
        Some((r.bid?, r.ask?))
    })
}

/// Client for the option chain endpoint. No file cache — chains move too
/// fast intraday for the same-day rule to be safe.
pub struct ChainClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChainClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch the base chain for `symbol` in `[dte_min, dte_max]`.
    ///
    /// Never raises: any provider failure comes back as an empty result with
    /// `error` populated and `meta.source == NONE`.
    pub async fn fetch_base_chain(
        &self,
        symbol: &str,
        dte_min: i64,
        dte_max: i64,
        mode: ModeDecision,
        chain_mode: ChainSource,
    ) -> ChainFetchResult {
        let url = format!(
            "{}{}?symbol={}&dteMin={}&dteMax={}",
            self.base_url, CHAIN_ENDPOINT, symbol, dte_min, dte_max
        );

        let rows = match self.fetch_rows(&url).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(symbol, error = %e, "chain fetch failed — returning empty chain");
                return ChainFetchResult::empty(Some(e.to_string()), ChainSource::None);
            }
        };

        let today = Utc::now().date_naive();
        let result =
            build_contracts_from_rows(symbol, &rows, mode, dte_min, dte_max, today, chain_mode);
        debug!(
            symbol,
            rows = result.meta.rows_seen,
            contracts = result.contracts.len(),
            expirations = result.meta.expirations_available,
            "base chain fetched"
        );
        result
    }

    /// Fetch the current bid/ask for one specific contract. Used by the
    /// position evaluator, which needs quotes for strikes that may sit
    /// outside the base-chain window. `None` on any failure or no match.
    pub async fn fetch_contract_quote(
        &self,
        symbol: &str,
        strike: f64,
        expiration: NaiveDate,
    ) -> Option<(f64, f64)> {
        let url = format!(
            "{}{}?symbol={}&expirDate={}&strike={}",
            self.base_url,
            CHAIN_ENDPOINT,
            symbol,
            expiration.format("%Y-%m-%d"),
            strike
        );
        match self.fetch_rows(&url).await {
            Ok(rows) => find_contract_quote(&rows, strike, expiration),
            Err(e) => {
                warn!(symbol, strike, error = %e, "contract quote fetch failed");
                None
            }
        }
    }

    async fn fetch_rows(&self, url: &str) -> Result<Vec<RawChainRow>, ProviderError> {
        let resp = self.http.get(url).send().await.map_err(|e| ProviderError::Network {
            endpoint: CHAIN_ENDPOINT.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                endpoint: CHAIN_ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json().await.map_err(|e| ProviderError::Malformed {
            endpoint: CHAIN_ENDPOINT.to_string(),
            detail: e.to_string(),
        })
    }
}
