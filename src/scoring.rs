// =============================================================================
// Scoring & Banding — composite setup score and confidence band
// =============================================================================
//
// Diagnostic only: scores never change the mode decision or Stage-2 output.
//
// Component scores are each 0-100. Composite = weighted sum over available
// components with NO renormalization — a missing component contributes 0 and
// drags the composite down, by contract.
//
// Bands:
//   A: market regime RISK_ON, completeness >= 0.95, liquidity ok,
//      score >= band_a_min
//   B: completeness >= 0.90 and score >= band_b_min
//   C: completeness >= 0.75 and score >= band_c_min
//   D: floor (never null)
//
// `band_reason` names the first precondition that kept the symbol out of the
// next-better band, in plain English.

use serde::{Deserialize, Serialize};

use crate::contract_selector::Stage2Result;
use crate::eligibility::EligibilityTrace;
use crate::regime::{MarketRegime, TrendRegime};
use crate::runtime_config::ScoringConfig;
use crate::types::{Band, ModeDecision};

/// Affordability bounds: notional at or below 5% of equity scores 100,
/// at or above 50% scores 0.
const AFFORDABILITY_PCT_100: f64 = 0.05;
const AFFORDABILITY_PCT_0: f64 = 0.50;

/// Per-component scores (0-100) and the weighted composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub data_quality: Option<f64>,
    pub regime: Option<f64>,
    pub options_liquidity: Option<f64>,
    pub strategy_fit: Option<f64>,
    pub capital_efficiency: Option<f64>,
    pub composite: f64,
    /// Component names that were unavailable and contributed 0.
    pub missing_components: Vec<String>,
}

/// Band assignment with its human-readable cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalHint {
    pub band: Band,
    pub band_reason: String,
}

fn clamp100(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

fn regime_score(trace: &EligibilityTrace) -> Option<f64> {
    let regime = trace.regime?;
    Some(match (regime, trace.mode_decision) {
        (TrendRegime::Up, ModeDecision::Csp) => 100.0,
        (TrendRegime::Down, ModeDecision::Cc) => 100.0,
        _ => 50.0,
    })
}

fn strategy_fit_score(trace: &EligibilityTrace, cfg_rsi_band: Option<(f64, f64)>) -> Option<f64> {
    if trace.mode_decision == ModeDecision::None {
        return None;
    }

    // RSI half: distance from the band midpoint, scaled so the band edge
    // scores 50.
    let rsi_half = match (trace.rsi14, cfg_rsi_band) {
        (Some(rsi), Some((lo, hi))) if hi > lo => {
            let mid = (lo + hi) / 2.0;
            let half_band = (hi - lo) / 2.0;
            clamp100(100.0 - ((rsi - mid).abs() / half_band) * 50.0)
        }
        _ => 50.0,
    };

    // S/R half: closer to the relevant level is better; 5%+ away scores 0.
    let distance = match trace.mode_decision {
        ModeDecision::Csp => trace.distance_to_support_pct,
        ModeDecision::Cc => trace.distance_to_resistance_pct,
        ModeDecision::None => None,
    };
    let sr_half = distance.map(|d| clamp100(100.0 - d * 2000.0)).unwrap_or(50.0);

    Some((rsi_half + sr_half) / 2.0)
}

fn options_liquidity_score(stage2: Option<&Stage2Result>) -> Option<f64> {
    let selected = stage2?.selected_contract.as_ref()?;
    let spread_pct = selected
        .contract
        .spread_pct
        .value_copied()
        .unwrap_or(0.05)
        .clamp(0.0, 0.20);
    let mut score = clamp100(100.0 - spread_pct * 500.0);
    if selected.contract.open_interest.value_or(0) >= 100 {
        score = clamp100((score + 100.0) / 2.0);
    }
    Some(score)
}

fn capital_efficiency_score(spot: Option<f64>, account_equity: f64) -> Option<f64> {
    let spot = spot.filter(|s| *s > 0.0)?;
    if account_equity <= 0.0 {
        return None;
    }
    let notional = spot * 100.0;
    let pct = notional / account_equity;
    Some(if pct <= AFFORDABILITY_PCT_100 {
        100.0
    } else if pct >= AFFORDABILITY_PCT_0 {
        0.0
    } else {
        let span = AFFORDABILITY_PCT_0 - AFFORDABILITY_PCT_100;
        clamp100(100.0 - 100.0 * (pct - AFFORDABILITY_PCT_100) / span)
    })
}

/// Compute the full score breakdown for one evaluated symbol.
pub fn compute_score(
    trace: &EligibilityTrace,
    stage2: Option<&Stage2Result>,
    completeness: f64,
    spot: Option<f64>,
    rsi_band: Option<(f64, f64)>,
    cfg: &ScoringConfig,
) -> ScoreBreakdown {
    let data_quality = Some(clamp100(completeness * 100.0));
    let regime = regime_score(trace);
    let options_liquidity = options_liquidity_score(stage2);
    let strategy_fit = strategy_fit_score(trace, rsi_band);
    let capital_efficiency = capital_efficiency_score(spot, cfg.account_equity);

    let mut missing = Vec::new();
    let mut composite = 0.0;
    let mut add = |name: &str, value: Option<f64>, weight: f64| match value {
        Some(v) => composite += v * weight,
        None => missing.push(name.to_string()),
    };
    add("data_quality", data_quality, cfg.weight_data_quality);
    add("regime", regime, cfg.weight_regime);
    add("options_liquidity", options_liquidity, cfg.weight_options_liquidity);
    add("strategy_fit", strategy_fit, cfg.weight_strategy_fit);
    add("capital_efficiency", capital_efficiency, cfg.weight_capital_efficiency);

    ScoreBreakdown {
        data_quality,
        regime,
        options_liquidity,
        strategy_fit,
        capital_efficiency,
        composite: clamp100(composite),
        missing_components: missing,
    }
}

/// Assign the confidence band. D is the floor — the band is never null and
/// the reason is never empty.
pub fn assign_band(
    score: f64,
    completeness: f64,
    liquidity_ok: bool,
    market_regime: Option<MarketRegime>,
    cfg: &ScoringConfig,
) -> CapitalHint {
    // Band A preconditions, checked in order; the first failure is the
    // reason the symbol lands below A.
    let a_blocker = if market_regime != Some(MarketRegime::RiskOn) {
        Some(match market_regime {
            Some(r) => format!("market regime {r}"),
            None => "market regime unknown".to_string(),
        })
    } else if completeness < 0.95 {
        Some(format!("data_completeness {completeness:.2} < 0.95"))
    } else if !liquidity_ok {
        Some("liquidity not ok".to_string())
    } else if score < cfg.band_a_min {
        Some(format!("score {score:.0} < {:.0}", cfg.band_a_min))
    } else {
        None
    };

    if a_blocker.is_none() {
        return CapitalHint {
            band: Band::A,
            band_reason: format!(
                "Band A: RISK_ON, data_completeness {completeness:.2}, liquidity ok, score {score:.0} >= {:.0}",
                cfg.band_a_min
            ),
        };
    }

    let b_blocker = if completeness < 0.90 {
        Some(format!("data_completeness {completeness:.2} < 0.90"))
    } else if score < cfg.band_b_min {
        Some(format!("score {score:.0} < {:.0}", cfg.band_b_min))
    } else {
        None
    };

    if b_blocker.is_none() {
        return CapitalHint {
            band: Band::B,
            band_reason: format!("Band B because {}", a_blocker.unwrap_or_default()),
        };
    }

    let c_blocker = if completeness < 0.75 {
        Some(format!("data_completeness {completeness:.2} < 0.75"))
    } else if score < cfg.band_c_min {
        Some(format!("score {score:.0} < {:.0}", cfg.band_c_min))
    } else {
        None
    };

    if c_blocker.is_none() {
        return CapitalHint {
            band: Band::C,
            band_reason: format!("Band C because {}", b_blocker.unwrap_or_default()),
        };
    }

    CapitalHint {
        band: Band::D,
        band_reason: format!("Band D because {}", c_blocker.unwrap_or_default()),
    }
}
