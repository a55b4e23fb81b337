// =============================================================================
// Portfolio Guardrails — position-size haircuts from portfolio state
// =============================================================================
//
// Pure over a portfolio snapshot and one candidate's suggested sizing. Rules
// apply multiplicatively, integer floor after each step, in this order:
//
//   1. Exposure >= target max      -> x0.50;  >= critical -> 0, ADVISORY
//   2. Symbol concentration warn   -> x0.75;  >= critical -> ADVISORY
//   3. Cluster risk HIGH           -> x0.70
//   4. Regime CRASH                -> 0, ADVISORY; DOWN hits CSP only x0.75
//   5. Assignment pressure         -> x0.60
//
// The result is never negative and the inputs are never mutated.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::PortfolioConfig;
use crate::types::{ModeDecision, Severity};

/// Correlated-cluster risk level supplied by the portfolio snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterRisk {
    Low,
    Medium,
    High,
}

/// Portfolio-level regime feeding guardrail rule 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioRegime {
    Normal,
    Down,
    Crash,
}

/// Read-only portfolio snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Deployed collateral as a percentage of equity.
    pub exposure_pct: f64,
    /// Largest single-symbol share of the portfolio, percent.
    pub max_symbol_pct: f64,
    pub cluster_risk: ClusterRisk,
    /// Open short puts trading near the money.
    pub positions_near_itm: u32,
}

/// Candidate sizing under review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSizing {
    pub mode: ModeDecision,
    pub suggested_contracts: u32,
}

/// Guardrail output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub adjusted_contracts: u32,
    pub applied_rules: Vec<String>,
    pub advisories: Vec<String>,
    pub severity_override: Option<Severity>,
}

fn haircut(contracts: u32, mult: f64) -> u32 {
    (contracts as f64 * mult).floor() as u32
}

/// Apply the guardrail chain to one candidate.
pub fn apply_guardrails(
    portfolio: &PortfolioState,
    candidate: &CandidateSizing,
    regime: PortfolioRegime,
    cfg: &PortfolioConfig,
) -> GuardrailResult {
    let mut contracts = candidate.suggested_contracts;
    let mut applied: Vec<String> = Vec::new();
    let mut advisories: Vec<String> = Vec::new();
    let mut severity_override: Option<Severity> = None;

    // --- 1. Exposure -----------------------------------------------------
    if portfolio.exposure_pct >= cfg.critical_exposure_pct {
        contracts = 0;
        severity_override = Some(Severity::Advisory);
        applied.push("exposure_critical".to_string());
        advisories.push(format!(
            "Exposure {:.1}% >= critical {:.1}% — no new contracts",
            portfolio.exposure_pct, cfg.critical_exposure_pct
        ));
    } else if portfolio.exposure_pct >= cfg.target_max_exposure_pct {
        contracts = haircut(contracts, 0.5);
        applied.push("exposure_target_max".to_string());
        advisories.push(format!(
            "Exposure {:.1}% >= target {:.1}% — halving size",
            portfolio.exposure_pct, cfg.target_max_exposure_pct
        ));
    }

    // --- 2. Symbol concentration -----------------------------------------
    if portfolio.max_symbol_pct >= cfg.max_symbol_concentration_critical_pct {
        severity_override = Some(Severity::Advisory);
        applied.push("symbol_concentration_critical".to_string());
        advisories.push(format!(
            "Symbol concentration {:.1}% >= critical {:.1}%",
            portfolio.max_symbol_pct, cfg.max_symbol_concentration_critical_pct
        ));
        contracts = haircut(contracts, 0.75);
    } else if portfolio.max_symbol_pct >= cfg.max_symbol_concentration_pct {
        contracts = haircut(contracts, 0.75);
        applied.push("symbol_concentration_warn".to_string());
    }

    // --- 3. Cluster risk --------------------------------------------------
    if portfolio.cluster_risk == ClusterRisk::High {
        contracts = haircut(contracts, 0.70);
        applied.push("cluster_risk_high".to_string());
    }

    // --- 4. Regime --------------------------------------------------------
    match regime {
        PortfolioRegime::Crash => {
            contracts = 0;
            severity_override = Some(Severity::Advisory);
            applied.push("regime_crash".to_string());
            advisories.push("Market regime CRASH — no new contracts".to_string());
        }
        PortfolioRegime::Down if candidate.mode == ModeDecision::Csp => {
            contracts = haircut(contracts, 0.75);
            applied.push("regime_down_csp".to_string());
        }
        _ => {}
    }

    // --- 5. Assignment pressure -------------------------------------------
    if portfolio.positions_near_itm >= cfg.assignment_pressure_threshold {
        contracts = haircut(contracts, 0.60);
        applied.push("assignment_pressure".to_string());
        advisories.push(format!(
            "{} positions near ITM (threshold {})",
            portfolio.positions_near_itm, cfg.assignment_pressure_threshold
        ));
    }

    debug!(
        suggested = candidate.suggested_contracts,
        adjusted = contracts,
        rules = applied.len(),
        "guardrails applied"
    );

    GuardrailResult {
        adjusted_contracts: contracts,
        applied_rules: applied,
        advisories,
        severity_override,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PortfolioConfig {
        PortfolioConfig::default()
    }

    fn clean_portfolio() -> PortfolioState {
        PortfolioState {
            exposure_pct: 20.0,
            max_symbol_pct: 5.0,
            cluster_risk: ClusterRisk::Low,
            positions_near_itm: 0,
        }
    }

    fn candidate(contracts: u32) -> CandidateSizing {
        CandidateSizing {
            mode: ModeDecision::Csp,
            suggested_contracts: contracts,
        }
    }

    #[test]
    fn clean_portfolio_untouched() {
        let result = apply_guardrails(&clean_portfolio(), &candidate(4), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 4);
        assert!(result.applied_rules.is_empty());
        assert!(result.severity_override.is_none());
    }

    #[test]
    fn exposure_target_halves() {
        let mut p = clean_portfolio();
        p.exposure_pct = 65.0;
        let result = apply_guardrails(&p, &candidate(4), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 2);
        assert!(result.applied_rules.contains(&"exposure_target_max".to_string()));
    }

    #[test]
    fn exposure_critical_zeroes_with_advisory() {
        let mut p = clean_portfolio();
        p.exposure_pct = 85.0;
        let result = apply_guardrails(&p, &candidate(4), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 0);
        assert_eq!(result.severity_override, Some(Severity::Advisory));
        assert!(!result.advisories.is_empty());
    }

    #[test]
    fn concentration_warn_trims() {
        let mut p = clean_portfolio();
        p.max_symbol_pct = 18.0;
        let result = apply_guardrails(&p, &candidate(4), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 3); // floor(4 * 0.75)
    }

    #[test]
    fn concentration_critical_overrides_severity() {
        let mut p = clean_portfolio();
        p.max_symbol_pct = 30.0;
        let result = apply_guardrails(&p, &candidate(4), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.severity_override, Some(Severity::Advisory));
    }

    #[test]
    fn cluster_high_trims() {
        let mut p = clean_portfolio();
        p.cluster_risk = ClusterRisk::High;
        let result = apply_guardrails(&p, &candidate(10), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 7); // floor(10 * 0.70)
    }

    #[test]
    fn crash_regime_zeroes() {
        let result = apply_guardrails(&clean_portfolio(), &candidate(10), PortfolioRegime::Crash, &cfg());
        assert_eq!(result.adjusted_contracts, 0);
        assert_eq!(result.severity_override, Some(Severity::Advisory));
    }

    #[test]
    fn down_regime_hits_csp_only() {
        let result = apply_guardrails(&clean_portfolio(), &candidate(4), PortfolioRegime::Down, &cfg());
        assert_eq!(result.adjusted_contracts, 3);

        let cc = CandidateSizing {
            mode: ModeDecision::Cc,
            suggested_contracts: 4,
        };
        let result = apply_guardrails(&clean_portfolio(), &cc, PortfolioRegime::Down, &cfg());
        assert_eq!(result.adjusted_contracts, 4);
    }

    #[test]
    fn assignment_pressure_trims() {
        let mut p = clean_portfolio();
        p.positions_near_itm = 3;
        let result = apply_guardrails(&p, &candidate(5), PortfolioRegime::Normal, &cfg());
        assert_eq!(result.adjusted_contracts, 3); // floor(5 * 0.60)
    }

    #[test]
    fn rules_compound_with_integer_floor() {
        let mut p = clean_portfolio();
        p.exposure_pct = 65.0; // x0.5
        p.max_symbol_pct = 18.0; // x0.75
        p.cluster_risk = ClusterRisk::High; // x0.70
        let result = apply_guardrails(&p, &candidate(10), PortfolioRegime::Normal, &cfg());
        // 10 -> 5 -> floor(3.75)=3 -> floor(2.1)=2
        assert_eq!(result.adjusted_contracts, 2);
        assert_eq!(result.applied_rules.len(), 3);
    }

    #[test]
    fn never_negative_and_inputs_untouched() {
        let p = PortfolioState {
            exposure_pct: 95.0,
            max_symbol_pct: 40.0,
            cluster_risk: ClusterRisk::High,
            positions_near_itm: 9,
        };
        let before = serde_json::to_string(&p).unwrap();
        let result = apply_guardrails(&p, &candidate(1), PortfolioRegime::Crash, &cfg());
        assert_eq!(result.adjusted_contracts, 0);
        assert_eq!(serde_json::to_string(&p).unwrap(), before);
    }
}
