// =============================================================================
// Universe Quality Gates — cheap-first liquidity / tradeability pre-filter
// =============================================================================
//
// Pure evaluation: no fetching, no mutation. Gates run cheapest-first and
// the first failure short-circuits:
//
//   A) gates disabled (global or per-symbol override) -> PASS
//   B) data sufficiency (missing / stale)
//   C) underlying price in [min, max]
//   D) underlying spread %
//   E) 20d average stock volume
//   F) option liquidity (only when chain_liquidity is supplied)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::data_dependencies::DependencyReport;
use crate::runtime_config::QualityGateConfig;
use crate::snapshot::SymbolSnapshot;

/// PASS or SKIP — a skipped symbol is excluded from the run, not failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateOutcome {
    Pass,
    Skip,
}

/// Option-level liquidity inputs, supplied only when Stage-2 has a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainLiquidity {
    pub option_bid: Option<f64>,
    pub option_ask: Option<f64>,
    pub option_mid: Option<f64>,
    pub option_oi: Option<i64>,
    pub option_volume: Option<i64>,
}

/// Result of the gate evaluation for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub symbol: String,
    pub status: GateOutcome,
    pub reasons: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl GateDecision {
    fn pass(symbol: &str, metrics: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            status: GateOutcome::Pass,
            reasons: Vec::new(),
            metrics,
        }
    }

    fn skip(
        symbol: &str,
        reason: &str,
        metrics: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            status: GateOutcome::Skip,
            reasons: vec![reason.to_string()],
            metrics,
        }
    }
}

/// Evaluate the universe quality gates for one symbol.
pub fn evaluate_universe_quality(
    symbol: &str,
    snapshot: &SymbolSnapshot,
    chain_liquidity: Option<&ChainLiquidity>,
    dependency_report: &DependencyReport,
    cfg: &QualityGateConfig,
) -> GateDecision {
    let mut metrics: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    // Per-symbol override merges over the global config.
    let over = cfg.symbol_overrides.get(&symbol.trim().to_uppercase());
    let enabled = over.and_then(|o| o.enabled).unwrap_or(cfg.enabled);
    let min_price = over.and_then(|o| o.min_price_usd).unwrap_or(cfg.min_price_usd);
    let max_price = over.and_then(|o| o.max_price_usd).or(cfg.max_price_usd);
    let max_spread = over.and_then(|o| o.max_spread_pct).unwrap_or(cfg.max_spread_pct);
    let min_avg_volume = over.and_then(|o| o.min_avg_volume).unwrap_or(cfg.min_avg_volume);

    // A) Disabled gates always pass.
    if !enabled {
        metrics.insert("gates_disabled".to_string(), json!(true));
        return GateDecision::pass(symbol, metrics);
    }

    // B) Data sufficiency.
    if !dependency_report.required_missing.is_empty() {
        metrics.insert(
            "missing_fields_count".to_string(),
            json!(dependency_report.required_missing.len()),
        );
        metrics.insert(
            "missing_fields".to_string(),
            json!(dependency_report.required_missing),
        );
        return GateDecision::skip(symbol, "required_data_missing", metrics);
    }
    if !dependency_report.required_stale.is_empty() {
        if let Some(days) = dependency_report.stale_days {
            metrics.insert("stale_days".to_string(), json!(days));
        }
        return GateDecision::skip(symbol, "stale_data", metrics);
    }

    // C) Underlying price.
    let Some(price) = snapshot.price else {
        return GateDecision::skip(symbol, "missing_price", metrics);
    };
    metrics.insert("price".to_string(), json!(price));
    if price < min_price {
        metrics.insert("min_price_usd".to_string(), json!(min_price));
        return GateDecision::skip(symbol, "price_below_min", metrics);
    }
    if let Some(max) = max_price.filter(|m| *m > 0.0) {
        if price > max {
            metrics.insert("max_price_usd".to_string(), json!(max));
            return GateDecision::skip(symbol, "price_above_max", metrics);
        }
    }

    // D) Underlying spread.
    if let (Some(bid), Some(ask)) = (snapshot.bid, snapshot.ask) {
        if bid > 0.0 {
            let mid = (bid + ask) / 2.0;
            if mid > 0.0 {
                let spread_pct = (ask - bid) / mid;
                metrics.insert("spread_pct".to_string(), json!(spread_pct));
                if spread_pct > max_spread {
                    metrics.insert("max_spread_pct".to_string(), json!(max_spread));
                    return GateDecision::skip(symbol, "wide_spread", metrics);
                }
            }
        }
    }

    // E) Average stock volume.
    if let Some(avg_vol) = snapshot.avg_stock_volume_20d {
        let avg_vol = avg_vol as i64;
        metrics.insert("avg_volume".to_string(), json!(avg_vol));
        if avg_vol < min_avg_volume {
            metrics.insert("min_avg_volume".to_string(), json!(min_avg_volume));
            return GateDecision::skip(symbol, "low_avg_volume", metrics);
        }
    }

    // F) Option liquidity, only when a chain view exists.
    if let Some(chain) = chain_liquidity {
        let mid = chain.option_mid.or_else(|| match (chain.option_bid, chain.option_ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        });

        if let Some(m) = mid {
            if m <= 0.0 {
                return GateDecision::skip(symbol, "option_mid_invalid", metrics);
            }
            if let (Some(bid), Some(ask)) = (chain.option_bid, chain.option_ask) {
                let opt_spread_pct = (ask - bid) / m;
                metrics.insert("option_spread_pct".to_string(), json!(opt_spread_pct));
                if opt_spread_pct > cfg.max_option_bidask_pct {
                    metrics.insert(
                        "max_option_bidask_pct".to_string(),
                        json!(cfg.max_option_bidask_pct),
                    );
                    return GateDecision::skip(symbol, "wide_option_spread", metrics);
                }
            }
        }

        if let Some(oi) = chain.option_oi {
            metrics.insert("option_oi".to_string(), json!(oi));
            if oi < cfg.min_option_oi {
                metrics.insert("min_option_oi".to_string(), json!(cfg.min_option_oi));
                return GateDecision::skip(symbol, "low_oi", metrics);
            }
        }

        if let Some(vol) = chain.option_volume {
            metrics.insert("option_volume".to_string(), json!(vol));
            if vol < cfg.min_option_volume {
                metrics.insert("min_option_volume".to_string(), json!(cfg.min_option_volume));
                return GateDecision::skip(symbol, "low_option_volume", metrics);
            }
        }
    }

    debug!(symbol, "universe quality gates passed");
    GateDecision::pass(symbol, metrics)
}
