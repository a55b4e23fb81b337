// =============================================================================
// Drift Detector — persisted snapshot vs live market, advisory only
// =============================================================================
//
// Compares the assumptions captured in the decision artifact's selected
// candidates against live quotes. Emits advisory items; it never mutates the
// snapshot and never blocks by itself — callers decide what BLOCK means.
//
// Severity policy:
//   CHAIN_UNAVAILABLE -> BLOCK
//   IV_DRIFT          -> WARN
//   SPREAD_WIDENED    -> WARN
//   PRICE_DRIFT       -> INFO, upgraded to WARN at 2x the threshold

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::DriftConfig;
use crate::types::OptionType;

/// Reason code for a drift finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftReason {
    PriceDrift,
    IvDrift,
    ChainUnavailable,
    SpreadWidened,
}

/// Severity for the ops surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    Info,
    Warn,
    Block,
}

/// One advisory finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftItem {
    pub reason: DriftReason,
    pub symbol: String,
    pub message: String,
    pub severity: DriftSeverity,
    pub snapshot_value: Option<f64>,
    pub live_value: Option<f64>,
}

/// Structured drift status. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftStatus {
    pub has_drift: bool,
    pub items: Vec<DriftItem>,
}

/// Per-candidate assumptions captured at artifact time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAssumption {
    pub symbol: String,
    pub strike: Option<f64>,
    pub expiry: Option<String>,
    pub option_right: OptionType,
    pub underlying_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mid: Option<f64>,
    pub iv: Option<f64>,
}

/// Live market view consumed by the detector. Only the drift detector reads
/// live data; the evaluation pipeline itself is snapshot-only.
#[derive(Debug, Clone, Default)]
pub struct LiveMarketData {
    pub underlying_prices: HashMap<String, f64>,
    pub option_chain_available: HashMap<String, bool>,
    /// Keyed by [`contract_key`].
    pub iv_by_contract: HashMap<String, f64>,
    /// Keyed by [`contract_key`]; (bid, ask).
    pub live_quotes: HashMap<String, (f64, f64)>,
}

/// Canonical key for a single contract.
pub fn contract_key(symbol: &str, strike: f64, expiry: &str, right: OptionType) -> String {
    format!("{}|{:.2}|{}|{}", symbol.to_uppercase(), strike, expiry, right)
}

fn max_severity(items: &[DriftItem]) -> Option<DriftSeverity> {
    items.iter().map(|i| i.severity).max()
}

/// Compare snapshot assumptions against live data.
pub fn detect_drift(
    assumptions: &[SnapshotAssumption],
    live: &LiveMarketData,
    cfg: &DriftConfig,
) -> DriftStatus {
    let mut items: Vec<DriftItem> = Vec::new();

    // Chain availability per unique symbol.
    let mut seen: Vec<&str> = Vec::new();
    for a in assumptions {
        if seen.contains(&a.symbol.as_str()) {
            continue;
        }
        seen.push(&a.symbol);
        if live.option_chain_available.get(&a.symbol) == Some(&false) {
            items.push(DriftItem {
                reason: DriftReason::ChainUnavailable,
                symbol: a.symbol.clone(),
                message: format!("Option chain unavailable for {}", a.symbol),
                severity: DriftSeverity::Block,
                snapshot_value: None,
                live_value: None,
            });
        }
    }

    for a in assumptions {
        // --- PRICE_DRIFT -------------------------------------------------
        if let (Some(snap_price), Some(&live_price)) = (
            a.underlying_price.filter(|p| *p > 0.0),
            live.underlying_prices.get(&a.symbol),
        ) {
            if live_price > 0.0 {
                let pct = (live_price - snap_price).abs() / snap_price * 100.0;
                if pct >= cfg.price_drift_warn_pct {
                    let severity = if pct >= cfg.price_drift_warn_pct * 2.0 {
                        DriftSeverity::Warn
                    } else {
                        DriftSeverity::Info
                    };
                    items.push(DriftItem {
                        reason: DriftReason::PriceDrift,
                        symbol: a.symbol.clone(),
                        message: format!("Underlying price drifted {pct:.1}%"),
                        severity,
                        snapshot_value: Some(snap_price),
                        live_value: Some(live_price),
                    });
                }
            }
        }

        let key = match (a.strike, a.expiry.as_deref()) {
            (Some(strike), Some(expiry)) => {
                Some(contract_key(&a.symbol, strike, expiry, a.option_right))
            }
            _ => None,
        };

        // --- IV_DRIFT ----------------------------------------------------
        if let (Some(key), Some(snap_iv)) = (&key, a.iv) {
            if let Some(&live_iv) = live.iv_by_contract.get(key) {
                let abs_d = (live_iv - snap_iv).abs();
                let rel = if snap_iv != 0.0 { abs_d / snap_iv } else { 0.0 };
                if abs_d >= cfg.iv_drift_abs || rel >= cfg.iv_drift_rel {
                    items.push(DriftItem {
                        reason: DriftReason::IvDrift,
                        symbol: a.symbol.clone(),
                        message: format!(
                            "IV drifted for {} ${:.2} {}",
                            a.expiry.as_deref().unwrap_or("?"),
                            a.strike.unwrap_or(0.0),
                            a.option_right
                        ),
                        severity: DriftSeverity::Warn,
                        snapshot_value: Some(snap_iv),
                        live_value: Some(live_iv),
                    });
                }
            }
        }

        // --- SPREAD_WIDENED ----------------------------------------------
        if let (Some(key), Some(bid), Some(ask)) = (&key, a.bid, a.ask) {
            if bid > 0.0 {
                if let Some(&(live_bid, live_ask)) = live.live_quotes.get(key) {
                    if live_bid > 0.0 {
                        let snap_spread_pct = (ask - bid) / bid * 100.0;
                        let live_spread_pct = (live_ask - live_bid) / live_bid * 100.0;
                        let mid = a.mid.filter(|m| *m > 0.0).unwrap_or((bid + ask) / 2.0);
                        let spread_mid = if mid > 0.0 { (ask - bid) / mid } else { 0.0 };
                        if live_spread_pct > snap_spread_pct * cfg.spread_widened_mult
                            || spread_mid > cfg.spread_mid_max
                        {
                            items.push(DriftItem {
                                reason: DriftReason::SpreadWidened,
                                symbol: a.symbol.clone(),
                                message: format!(
                                    "Spread widened (snapshot {snap_spread_pct:.1}% vs live {live_spread_pct:.1}%)"
                                ),
                                severity: DriftSeverity::Warn,
                                snapshot_value: Some(snap_spread_pct),
                                live_value: Some(live_spread_pct),
                            });
                        }
                    }
                }
            }
        }
    }

    debug!(
        assumptions = assumptions.len(),
        findings = items.len(),
        max_severity = ?max_severity(&items),
        "drift detection complete"
    );

    DriftStatus {
        has_drift: !items.is_empty(),
        items,
    }
}

/// Highest severity among findings, or `None` when clean.
pub fn drift_status_max_severity(status: &DriftStatus) -> Option<DriftSeverity> {
    max_severity(&status.items)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DriftConfig {
        DriftConfig::default()
    }

    fn assumption() -> SnapshotAssumption {
        SnapshotAssumption {
            symbol: "SPY".to_string(),
            strike: Some(450.0),
            expiry: Some("2026-03-20".to_string()),
            option_right: OptionType::Put,
            underlying_price: Some(500.0),
            bid: Some(5.0),
            ask: Some(5.2),
            mid: Some(5.1),
            iv: Some(0.20),
        }
    }

    fn key() -> String {
        contract_key("SPY", 450.0, "2026-03-20", OptionType::Put)
    }

    #[test]
    fn clean_market_no_drift() {
        let a = assumption();
        let mut live = LiveMarketData::default();
        live.underlying_prices.insert("SPY".to_string(), 500.5);
        live.option_chain_available.insert("SPY".to_string(), true);
        live.iv_by_contract.insert(key(), 0.205);
        live.live_quotes.insert(key(), (5.0, 5.2));

        let status = detect_drift(&[a], &live, &cfg());
        assert!(!status.has_drift);
        assert!(status.items.is_empty());
        assert!(drift_status_max_severity(&status).is_none());
    }

    #[test]
    fn chain_unavailable_blocks() {
        let a = assumption();
        let mut live = LiveMarketData::default();
        live.option_chain_available.insert("SPY".to_string(), false);

        let status = detect_drift(&[a], &live, &cfg());
        assert!(status.has_drift);
        let item = &status.items[0];
        assert_eq!(item.reason, DriftReason::ChainUnavailable);
        assert_eq!(item.severity, DriftSeverity::Block);
        assert_eq!(drift_status_max_severity(&status), Some(DriftSeverity::Block));
    }

    #[test]
    fn price_drift_info_then_warn() {
        let a = assumption();
        let mut live = LiveMarketData::default();
        // 1% move: above the 0.75% threshold, below 2x -> INFO.
        live.underlying_prices.insert("SPY".to_string(), 505.0);
        let status = detect_drift(&[a.clone()], &live, &cfg());
        let item = status
            .items
            .iter()
            .find(|i| i.reason == DriftReason::PriceDrift)
            .unwrap();
        assert_eq!(item.severity, DriftSeverity::Info);

        // 2% move: >= 2x threshold -> WARN.
        live.underlying_prices.insert("SPY".to_string(), 510.0);
        let status = detect_drift(&[a], &live, &cfg());
        let item = status
            .items
            .iter()
            .find(|i| i.reason == DriftReason::PriceDrift)
            .unwrap();
        assert_eq!(item.severity, DriftSeverity::Warn);
    }

    #[test]
    fn iv_drift_absolute_threshold() {
        let a = assumption();
        let mut live = LiveMarketData::default();
        live.iv_by_contract.insert(key(), 0.25); // +0.05 abs >= 0.03
        let status = detect_drift(&[a], &live, &cfg());
        let item = status
            .items
            .iter()
            .find(|i| i.reason == DriftReason::IvDrift)
            .unwrap();
        assert_eq!(item.severity, DriftSeverity::Warn);
        assert_eq!(item.snapshot_value, Some(0.20));
        assert_eq!(item.live_value, Some(0.25));
    }

    #[test]
    fn spread_widened_on_live_quote() {
        let a = assumption();
        let mut live = LiveMarketData::default();
        // Snapshot spread 4% of bid; live spread 20% -> widened.
        live.live_quotes.insert(key(), (5.0, 6.0));
        let status = detect_drift(&[a], &live, &cfg());
        assert!(status
            .items
            .iter()
            .any(|i| i.reason == DriftReason::SpreadWidened));
    }

    #[test]
    fn detector_does_not_mutate_inputs() {
        let assumptions = vec![assumption()];
        let before = serde_json::to_string(&assumptions).unwrap();
        let mut live = LiveMarketData::default();
        live.option_chain_available.insert("SPY".to_string(), false);
        live.underlying_prices.insert("SPY".to_string(), 999.0);
        let _ = detect_drift(&assumptions, &live, &cfg());
        assert_eq!(serde_json::to_string(&assumptions).unwrap(), before);
    }

    #[test]
    fn missing_live_data_is_silent() {
        let status = detect_drift(&[assumption()], &LiveMarketData::default(), &cfg());
        assert!(!status.has_drift);
    }
}
