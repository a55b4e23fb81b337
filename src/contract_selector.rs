// =============================================================================
// Contract Selector — Stage-2 filtering, tie-breaks, and chain telemetry
// =============================================================================
//
// Operates strictly in the chosen mode (CSP selects PUTs, CC selects CALLs;
// the other type is discarded and counted). Filtering per contract:
//
//   1. Drop contracts missing any REQUIRED_CHAIN_FIELDS; count by cause.
//   2. |delta| in [delta_lo, delta_hi]   (magnitude — provider sign ignored)
//   3. open_interest >= min_oi
//   4. spread_pct <= max_spread_pct
//
// Survivors are ordered by: closest |delta| to the band midpoint, then
// higher strike for CSP (more premium per unit of distance) / lower strike
// for CC (more OTM), then higher OI. Each survivor carries a liquidity grade
// A/B/C from the non-blocking preferences it met.
//
// Mode guardrail: a CSP request that pulled CALL rows from the chain layer
// is a wiring fault, not a data condition — the whole Stage-2 result is
// ERROR_MODE_MIXED_CSP (symmetric for CC). Option types never mix per
// symbol per cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::chain::{ChainFetchMeta, OptionContract};
use crate::runtime_config::SelectionConfig;
use crate::types::{ChainSource, ModeDecision, OptionType};

/// Fields a contract must carry to be considered at all.
pub const REQUIRED_CHAIN_FIELDS: &[&str] =
    &["strike", "expiration", "bid", "ask", "delta", "open_interest"];

pub const ERROR_MODE_MIXED_CSP: &str = "ERROR_MODE_MIXED_CSP";
pub const ERROR_MODE_MIXED_CC: &str = "ERROR_MODE_MIXED_CC";

/// A/B/C option-market tightness grade for a selected contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityGrade {
    A,
    B,
    C,
}

/// One contract that passed every blocking filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedContract {
    pub contract: OptionContract,
    pub selection_reason: String,
    pub meets_all_criteria: bool,
    pub criteria_results: BTreeMap<String, bool>,
    pub liquidity_grade: LiquidityGrade,
    /// Sign-normalized delta: negative for puts, positive for calls,
    /// independent of the provider's convention.
    pub normalized_delta: Option<f64>,
}

/// Per-cause rejection tallies for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub rejected_due_to_delta: usize,
    pub rejected_due_to_oi: usize,
    pub rejected_due_to_spread: usize,
    pub rejected_due_to_missing_fields: usize,
}

/// What the chain contained, by option type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionTypeCounts {
    pub puts_seen: usize,
    pub calls_seen: usize,
}

/// Stage-2 output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Result {
    pub symbol: String,
    pub mode: ModeDecision,
    pub expirations_available: usize,
    pub expirations_evaluated: usize,
    pub contracts_evaluated: usize,
    pub option_type_counts: OptionTypeCounts,
    pub selected_contract: Option<SelectedContract>,
    pub selected_candidates: Vec<SelectedContract>,
    pub liquidity_ok: bool,
    pub liquidity_reason: String,
    pub chain_missing_fields: Vec<String>,
    pub required_fields_present: bool,
    pub chain_source_used: ChainSource,
    pub rejection_counts: RejectionCounts,
    pub greeks_summary: String,
    pub sample_request_symbols: Vec<String>,
    pub spot_used: Option<f64>,
    pub error: Option<String>,
}

/// |delta| for band checks, regardless of provider sign convention.
pub fn delta_magnitude(contract: &OptionContract) -> Option<f64> {
    contract.delta.value_copied().map(f64::abs)
}

/// Reporting delta: puts negative, calls positive.
pub fn normalized_delta(contract: &OptionContract) -> Option<f64> {
    let mag = delta_magnitude(contract)?;
    Some(match contract.option_type {
        OptionType::Put => -mag,
        OptionType::Call => mag,
    })
}

/// Names of REQUIRED_CHAIN_FIELDS that are not VALID on this contract.
fn missing_required_fields(contract: &OptionContract) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !contract.bid.is_valid() {
        missing.push("bid");
    }
    if !contract.ask.is_valid() {
        missing.push("ask");
    }
    if !contract.delta.is_valid() {
        missing.push("delta");
    }
    if !contract.open_interest.is_valid() {
        missing.push("open_interest");
    }
    missing
}

/// Mode-aware greeks summary. Wording is "(CSP)" / "(CC)" as a suffix so a
/// CC row never reads "for CSP".
fn greeks_summary(mode: ModeDecision, cfg: &SelectionConfig) -> String {
    let tag = match mode {
        ModeDecision::Csp => "CSP",
        ModeDecision::Cc => "CC",
        ModeDecision::None => return String::new(),
    };
    format!("abs_delta {:.2}–{:.2} ({})", cfg.delta_lo, cfg.delta_hi, tag)
}

fn grade_contract(contract: &OptionContract, cfg: &SelectionConfig) -> LiquidityGrade {
    // Non-blocking preferences: deep OI, tight spread, live volume.
    let mut met = 0;
    if contract.open_interest.value_or(0) >= cfg.min_oi * 2 {
        met += 1;
    }
    if contract
        .spread_pct
        .value_copied()
        .map(|s| s <= cfg.max_spread_pct / 2.0)
        .unwrap_or(false)
    {
        met += 1;
    }
    if contract.volume.value_or(0) >= 50 {
        met += 1;
    }
    match met {
        3 => LiquidityGrade::A,
        2 => LiquidityGrade::B,
        _ => LiquidityGrade::C,
    }
}

fn empty_result(
    symbol: &str,
    mode: ModeDecision,
    source: ChainSource,
    error: Option<String>,
) -> Stage2Result {
    Stage2Result {
        symbol: symbol.to_uppercase(),
        mode,
        expirations_available: 0,
        expirations_evaluated: 0,
        contracts_evaluated: 0,
        option_type_counts: OptionTypeCounts::default(),
        selected_contract: None,
        selected_candidates: Vec::new(),
        liquidity_ok: false,
        liquidity_reason: String::new(),
        chain_missing_fields: Vec::new(),
        required_fields_present: false,
        chain_source_used: source,
        rejection_counts: RejectionCounts::default(),
        greeks_summary: String::new(),
        sample_request_symbols: Vec::new(),
        spot_used: None,
        error,
    }
}

/// Run Stage-2 selection over an already-fetched chain.
pub fn select_contracts(
    symbol: &str,
    mode: ModeDecision,
    contracts: &[OptionContract],
    meta: &ChainFetchMeta,
    spot: Option<f64>,
    cfg: &SelectionConfig,
) -> Stage2Result {
    if mode == ModeDecision::None {
        return empty_result(symbol, mode, ChainSource::None, None);
    }

    // --- Mode guardrail: the chain request must be single-sided ----------
    let mixed = match mode {
        ModeDecision::Csp if meta.calls_requested > 0 => Some(ERROR_MODE_MIXED_CSP),
        ModeDecision::Cc if meta.puts_requested > 0 => Some(ERROR_MODE_MIXED_CC),
        _ => None,
    };
    if let Some(code) = mixed {
        warn!(symbol, mode = %mode, code, "mixed option types in chain request");
        let mut result = empty_result(symbol, mode, meta.source, Some(code.to_string()));
        result.expirations_available = meta.expirations_available;
        return result;
    }

    let want_type = match mode {
        ModeDecision::Csp => OptionType::Put,
        ModeDecision::Cc => OptionType::Call,
        ModeDecision::None => unreachable!(),
    };

    let mut counts = OptionTypeCounts::default();
    let mut rejections = RejectionCounts::default();
    let mut chain_missing: Vec<String> = Vec::new();
    let mut candidates: Vec<SelectedContract> = Vec::new();
    let mut expirations_evaluated: Vec<chrono::NaiveDate> = Vec::new();
    let mut contracts_evaluated = 0usize;

    for contract in contracts {
        match contract.option_type {
            OptionType::Put => counts.puts_seen += 1,
            OptionType::Call => counts.calls_seen += 1,
        }

        // Off-side contracts are discarded, never selected.
        if contract.option_type != want_type {
            continue;
        }
        if contract.dte < cfg.dte_min || contract.dte > cfg.dte_max {
            continue;
        }

        contracts_evaluated += 1;
        if !expirations_evaluated.contains(&contract.expiration) {
            expirations_evaluated.push(contract.expiration);
        }

        // 1. Required chain fields.
        let missing = missing_required_fields(contract);
        if !missing.is_empty() {
            rejections.rejected_due_to_missing_fields += 1;
            for field in missing {
                if !chain_missing.iter().any(|f| f == field) {
                    chain_missing.push(field.to_string());
                }
            }
            continue;
        }

        // 2. Delta band on magnitude.
        let mag = match delta_magnitude(contract) {
            Some(m) => m,
            None => {
                rejections.rejected_due_to_missing_fields += 1;
                continue;
            }
        };
        if mag < cfg.delta_lo || mag > cfg.delta_hi {
            rejections.rejected_due_to_delta += 1;
            continue;
        }

        // 3. Open interest.
        if contract.open_interest.value_or(0) < cfg.min_oi {
            rejections.rejected_due_to_oi += 1;
            continue;
        }

        // 4. Spread.
        let spread_ok = contract
            .spread_pct
            .value_copied()
            .map(|s| s <= cfg.max_spread_pct)
            .unwrap_or(false);
        if !spread_ok {
            rejections.rejected_due_to_spread += 1;
            continue;
        }

        let norm_delta = normalized_delta(contract);
        let mut criteria = BTreeMap::new();
        criteria.insert("delta_band".to_string(), true);
        criteria.insert("open_interest".to_string(), true);
        criteria.insert("spread".to_string(), true);

        candidates.push(SelectedContract {
            selection_reason: format!(
                "delta={:.2}, DTE={}, OI={}",
                norm_delta.unwrap_or(0.0),
                contract.dte,
                contract.open_interest.value_or(0)
            ),
            meets_all_criteria: true,
            criteria_results: criteria,
            liquidity_grade: grade_contract(contract, cfg),
            normalized_delta: norm_delta,
            contract: contract.clone(),
        });
    }

    // --- Tie-break ordering ----------------------------------------------
    let band_mid = (cfg.delta_lo + cfg.delta_hi) / 2.0;
    candidates.sort_by(|a, b| {
        let da = delta_magnitude(&a.contract).map(|m| (m - band_mid).abs()).unwrap_or(f64::MAX);
        let db = delta_magnitude(&b.contract).map(|m| (m - band_mid).abs()).unwrap_or(f64::MAX);
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                // CSP prefers higher strike, CC prefers lower strike.
                let (sa, sb) = (a.contract.strike, b.contract.strike);
                match mode {
                    ModeDecision::Csp => sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal),
                    _ => sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal),
                }
            })
            .then_with(|| {
                b.contract
                    .open_interest
                    .value_or(0)
                    .cmp(&a.contract.open_interest.value_or(0))
            })
    });

    let liquidity_ok = !candidates.is_empty();
    let liquidity_reason = if liquidity_ok {
        "OK".to_string()
    } else {
        format!(
            "No contracts passed option liquidity gates (OI>={}, spread<={}%)",
            cfg.min_oi,
            cfg.max_spread_pct * 100.0
        )
    };

    // Invariant: true iff at least one selected candidate carries every
    // REQUIRED_CHAIN_FIELDS non-null. Candidates only pass with those fields
    // valid, so presence reduces to non-emptiness.
    let required_fields_present = candidates
        .iter()
        .any(|c| missing_required_fields(&c.contract).is_empty());

    let sample_request_symbols: Vec<String> = contracts
        .iter()
        .take(5)
        .map(|c| c.display_symbol())
        .collect();

    debug!(
        symbol,
        mode = %mode,
        evaluated = contracts_evaluated,
        candidates = candidates.len(),
        rejected_delta = rejections.rejected_due_to_delta,
        rejected_oi = rejections.rejected_due_to_oi,
        rejected_spread = rejections.rejected_due_to_spread,
        "stage-2 selection complete"
    );

    Stage2Result {
        symbol: symbol.to_uppercase(),
        mode,
        expirations_available: meta.expirations_available,
        expirations_evaluated: expirations_evaluated.len(),
        contracts_evaluated,
        option_type_counts: counts,
        selected_contract: candidates.first().cloned(),
        selected_candidates: candidates,
        liquidity_ok,
        liquidity_reason,
        chain_missing_fields: chain_missing,
        required_fields_present,
        chain_source_used: meta.source,
        rejection_counts: rejections,
        greeks_summary: greeks_summary(mode, cfg),
        sample_request_symbols,
        spot_used: spot,
        error: None,
    }
}

// =============================================================================
// Layered contract eligibility (FAIL vs UNAVAILABLE semantics)
// =============================================================================

/// Whether chain data existed at all, and from which source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractData {
    pub available: bool,
    pub source: ChainSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractEligibilityStatus {
    Pass,
    Fail,
    Unavailable,
    Error,
}

impl std::fmt::Display for ContractEligibilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Verdict on the contracts that existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEligibility {
    pub status: ContractEligibilityStatus,
    pub reasons: Vec<String>,
}

/// Distinguish "chain fetched, filters rejected everything" (FAIL) from
/// "Stage-2 did not run / chain empty" (UNAVAILABLE). This distinction is
/// mandatory — a FAIL with source NONE or an UNAVAILABLE with available=true
/// is a pipeline bug.
pub fn build_eligibility_layers(
    stage2: Option<&Stage2Result>,
) -> (ContractData, ContractEligibility) {
    let Some(s2) = stage2 else {
        return (
            ContractData {
                available: false,
                source: ChainSource::None,
            },
            ContractEligibility {
                status: ContractEligibilityStatus::Unavailable,
                reasons: vec!["Stage-2 did not run".to_string()],
            },
        );
    };

    if let Some(err) = &s2.error {
        return (
            ContractData {
                available: false,
                source: s2.chain_source_used,
            },
            ContractEligibility {
                status: ContractEligibilityStatus::Error,
                reasons: vec![err.clone()],
            },
        );
    }

    if s2.contracts_evaluated == 0 {
        return (
            ContractData {
                available: false,
                source: ChainSource::None,
            },
            ContractEligibility {
                status: ContractEligibilityStatus::Unavailable,
                reasons: vec!["Chain returned no contracts".to_string()],
            },
        );
    }

    if s2.selected_candidates.is_empty() {
        let mut reasons = vec![format!(
            "No contracts passed filters ({} evaluated)",
            s2.contracts_evaluated
        )];
        if !s2.liquidity_reason.is_empty() && s2.liquidity_reason != "OK" {
            reasons.push(s2.liquidity_reason.clone());
        }
        return (
            ContractData {
                available: true,
                source: s2.chain_source_used,
            },
            ContractEligibility {
                status: ContractEligibilityStatus::Fail,
                reasons,
            },
        );
    }

    (
        ContractData {
            available: true,
            source: s2.chain_source_used,
        },
        ContractEligibility {
            status: ContractEligibilityStatus::Pass,
            reasons: Vec::new(),
        },
    )
}
