// =============================================================================
// Eligibility Engine — per-symbol CSP / CC / NONE mode decision
// =============================================================================
//
// Pure over the daily candle history (plus optional 4H bars). The engine
// never consults option chains — that is Stage-2's job.
//
// Gate order (codes collected in this precedence):
//   CSP: regime UP -> RSI band -> ATR% cap -> near support
//   CC:  holdings  -> regime DOWN -> RSI band -> ATR% cap -> near resistance
//
// CSP takes precedence when both sides pass; CSP and CC are mutually
// exclusive per cycle. The optional intraday confirmation can demote a CSP
// decision to NONE (regime conflict, or missing 4H data).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::atr::{atr, atr_pct};
use crate::indicators::ema::{ema, ema_series, series_slope};
use crate::indicators::rsi::rsi_wilder;
use crate::market_data::{DailyCandle, IntradayCandle};
use crate::regime::{classify_regime, intraday_regime, weekly_regime, TrendRegime};
use crate::runtime_config::{EligibilityConfig, VolatilityConfig};
use crate::swing_cluster::compute_support_resistance;
use crate::types::ModeDecision;

// Rejection reason codes, ordered by gate precedence.
pub const FAIL_NO_CANDLES: &str = "FAIL_NO_CANDLES";
pub const FAIL_REGIME_CSP: &str = "FAIL_REGIME_CSP";
pub const FAIL_RSI_CSP: &str = "FAIL_RSI_CSP";
pub const FAIL_ATR_TOO_HIGH: &str = "FAIL_ATR_TOO_HIGH";
pub const FAIL_NOT_NEAR_SUPPORT: &str = "FAIL_NOT_NEAR_SUPPORT";
pub const FAIL_NO_HOLDINGS: &str = "FAIL_NO_HOLDINGS";
pub const FAIL_NOT_HELD_FOR_CC: &str = "FAIL_NOT_HELD_FOR_CC";
pub const FAIL_REGIME_CC: &str = "FAIL_REGIME_CC";
pub const FAIL_RSI_CC: &str = "FAIL_RSI_CC";
pub const FAIL_NOT_NEAR_RESISTANCE: &str = "FAIL_NOT_NEAR_RESISTANCE";
pub const FAIL_INTRADAY_REGIME_CONFLICT: &str = "FAIL_INTRADAY_REGIME_CONFLICT";
pub const FAIL_INTRADAY_DATA_MISSING: &str = "FAIL_INTRADAY_DATA_MISSING";

/// Numeric values the gates actually used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputedIndicators {
    pub close: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub ema200_slope: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub atr_pct: Option<f64>,
}

/// Intraday (4H) confirmation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntradayBlock {
    pub timeframe: String,
    pub data_present: bool,
    pub alignment_pass: bool,
    pub intraday_regime: Option<TrendRegime>,
    pub reason_code: Option<String>,
}

/// Full eligibility decision trace for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityTrace {
    pub symbol: String,
    pub mode_decision: ModeDecision,
    pub regime: Option<TrendRegime>,
    pub regime_weekly: Option<TrendRegime>,
    pub rsi14: Option<f64>,
    pub atr_pct: Option<f64>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
    pub distance_to_support_pct: Option<f64>,
    pub distance_to_resistance_pct: Option<f64>,
    /// All failing gate codes, ordered by precedence.
    pub rejection_reason_codes: Vec<String>,
    /// First failing gate when mode is NONE.
    pub primary_reason_code: Option<String>,
    pub intraday: Option<IntradayBlock>,
    pub computed: ComputedIndicators,
}

impl EligibilityTrace {
    fn none_with(symbol: &str, codes: Vec<String>) -> Self {
        let primary = codes.first().cloned();
        Self {
            symbol: symbol.to_uppercase(),
            mode_decision: ModeDecision::None,
            regime: None,
            regime_weekly: None,
            rsi14: None,
            atr_pct: None,
            support_level: None,
            resistance_level: None,
            distance_to_support_pct: None,
            distance_to_resistance_pct: None,
            rejection_reason_codes: codes,
            primary_reason_code: primary,
            intraday: None,
            computed: ComputedIndicators::default(),
        }
    }
}

/// Run the eligibility engine for one symbol.
///
/// `holdings_shares` is the share count currently held (0 disables CC).
/// `intraday_candles` is consulted only when the confirmation flag is on.
pub fn run_eligibility(
    symbol: &str,
    candles: &[DailyCandle],
    intraday_candles: Option<&[IntradayCandle]>,
    holdings_shares: f64,
    cfg: &EligibilityConfig,
    vol_cfg: &VolatilityConfig,
) -> EligibilityTrace {
    if candles.len() < cfg.min_candles {
        return EligibilityTrace::none_with(symbol, vec![FAIL_NO_CANDLES.to_string()]);
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let close = closes.last().copied();

    // --- Indicators -----------------------------------------------------
    let ema20 = ema(&closes, 20);
    let ema50 = ema(&closes, 50);
    let ema200_series = ema_series(&closes, 200);
    let ema200 = ema200_series.last().copied();
    let ema200_slope = series_slope(&ema200_series, 20);
    let rsi14 = rsi_wilder(&closes, 14);
    let atr14 = atr(candles, 14);
    let atr_pct_val = atr_pct(candles, 14);

    let regime = match (ema20, ema50, ema200) {
        (Some(e20), Some(e50), Some(e200)) => Some(classify_regime(
            e20,
            e50,
            e200,
            ema200_slope.unwrap_or(0.0),
        )),
        _ => None,
    };
    let regime_weekly = weekly_regime(candles);

    // --- Support / resistance -------------------------------------------
    let spot = close.unwrap_or(0.0);
    let sr = compute_support_resistance(
        candles,
        spot,
        atr14,
        cfg.swing_window,
        cfg.swing_k,
        cfg.sr_atr_mult,
        cfg.sr_pct_floor,
        cfg.max_s_r_tol_pct,
    );

    // --- CSP gates (precedence order) -----------------------------------
    let mut csp_fail: Vec<&str> = Vec::new();
    if regime != Some(TrendRegime::Up) {
        csp_fail.push(FAIL_REGIME_CSP);
    }
    match rsi14 {
        Some(r) if r >= cfg.csp_rsi_min && r <= cfg.csp_rsi_max => {}
        _ => csp_fail.push(FAIL_RSI_CSP),
    }
    match atr_pct_val {
        Some(a) if a < vol_cfg.max_atr_pct => {}
        _ => csp_fail.push(FAIL_ATR_TOO_HIGH),
    }
    match sr.distance_to_support_pct {
        Some(d) if d <= cfg.support_near_pct => {}
        _ => csp_fail.push(FAIL_NOT_NEAR_SUPPORT),
    }

    // --- CC gates --------------------------------------------------------
    let mut cc_fail: Vec<&str> = Vec::new();
    if holdings_shares <= 0.0 {
        cc_fail.push(FAIL_NO_HOLDINGS);
    }
    if regime != Some(TrendRegime::Down) {
        cc_fail.push(FAIL_REGIME_CC);
    }
    match rsi14 {
        Some(r) if r >= cfg.cc_rsi_min && r <= cfg.cc_rsi_max => {}
        _ => cc_fail.push(FAIL_RSI_CC),
    }
    match atr_pct_val {
        Some(a) if a < vol_cfg.max_atr_pct => {}
        _ => cc_fail.push(FAIL_ATR_TOO_HIGH),
    }
    match sr.distance_to_resistance_pct {
        Some(d) if d <= cfg.resist_near_pct => {}
        _ => cc_fail.push(FAIL_NOT_NEAR_RESISTANCE),
    }

    // CC with everything but holdings passing gets the explicit verdict code.
    if cc_fail == [FAIL_NO_HOLDINGS] {
        cc_fail.push(FAIL_NOT_HELD_FOR_CC);
    }

    // --- Mode decision (CSP precedence) ----------------------------------
    let mut mode = if csp_fail.is_empty() {
        ModeDecision::Csp
    } else if cc_fail.is_empty() {
        ModeDecision::Cc
    } else {
        ModeDecision::None
    };

    // CSP codes first, then CC codes, deduplicated in precedence order.
    let mut rejection_codes: Vec<String> = Vec::new();
    for code in csp_fail.iter().chain(cc_fail.iter()) {
        if !rejection_codes.iter().any(|c| c == code) {
            rejection_codes.push(code.to_string());
        }
    }

    // --- Intraday confirmation (feature-flagged, CSP only) ---------------
    let mut intraday_block = None;
    if cfg.enable_intraday_confirmation && mode == ModeDecision::Csp {
        let bars = intraday_candles.unwrap_or(&[]);
        if bars.len() < cfg.intraday_min_rows {
            mode = ModeDecision::None;
            rejection_codes.insert(0, FAIL_INTRADAY_DATA_MISSING.to_string());
            intraday_block = Some(IntradayBlock {
                timeframe: "4H".to_string(),
                data_present: false,
                alignment_pass: false,
                intraday_regime: None,
                reason_code: Some(FAIL_INTRADAY_DATA_MISSING.to_string()),
            });
        } else {
            let intra = intraday_regime(bars);
            let conflict = intra == Some(TrendRegime::Down);
            if conflict {
                mode = ModeDecision::None;
                rejection_codes.insert(0, FAIL_INTRADAY_REGIME_CONFLICT.to_string());
            }
            intraday_block = Some(IntradayBlock {
                timeframe: "4H".to_string(),
                data_present: true,
                alignment_pass: !conflict,
                intraday_regime: intra,
                reason_code: conflict.then(|| FAIL_INTRADAY_REGIME_CONFLICT.to_string()),
            });
        }
    }

    let primary_reason_code = if mode == ModeDecision::None {
        rejection_codes.first().cloned()
    } else {
        None
    };

    debug!(
        symbol,
        mode = %mode,
        regime = ?regime,
        rsi14 = ?rsi14,
        atr_pct = ?atr_pct_val,
        rejections = rejection_codes.len(),
        "eligibility decided"
    );

    EligibilityTrace {
        symbol: symbol.to_uppercase(),
        mode_decision: mode,
        regime,
        regime_weekly,
        rsi14,
        atr_pct: atr_pct_val,
        support_level: sr.support_level,
        resistance_level: sr.resistance_level,
        distance_to_support_pct: sr.distance_to_support_pct,
        distance_to_resistance_pct: sr.distance_to_resistance_pct,
        rejection_reason_codes: rejection_codes,
        primary_reason_code,
        intraday: intraday_block,
        computed: ComputedIndicators {
            close,
            ema20,
            ema50,
            ema200,
            ema200_slope,
            rsi14,
            atr14,
            atr_pct: atr_pct_val,
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> EligibilityConfig {
        EligibilityConfig::default()
    }

    fn vol_cfg() -> VolatilityConfig {
        VolatilityConfig::default()
    }

    fn candles_from_closes(closes: &[f64], range: f64) -> Vec<DailyCandle> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| DailyCandle {
                date: start + chrono::Days::new(i as u64),
                open: c,
                high: c + range,
                low: c - range,
                close: c,
                volume: 1_000_000.0,
            })
            .collect()
    }

    /// Gentle uptrend that pulls back to support near the end: UP regime,
    /// RSI mid-band, small ATR, spot close to a recent swing low.
    fn csp_friendly_candles() -> Vec<DailyCandle> {
        let mut closes: Vec<f64> = Vec::new();
        let mut c = 100.0;
        for i in 0..240 {
            c += 0.25;
            // Shallow oscillation builds swing structure.
            let wiggle = if i % 10 < 5 { -0.8 } else { 0.8 };
            closes.push(c + wiggle);
        }
        // Pull back toward the most recent swing-low zone.
        for _ in 0..6 {
            c -= 0.35;
            closes.push(c);
        }
        candles_from_closes(&closes, 0.6)
    }

    #[test]
    fn no_candles_fails_fast() {
        let trace = run_eligibility("XYZ", &[], None, 0.0, &cfg(), &vol_cfg());
        assert_eq!(trace.mode_decision, ModeDecision::None);
        assert_eq!(
            trace.rejection_reason_codes,
            vec![FAIL_NO_CANDLES.to_string()]
        );
        assert_eq!(trace.primary_reason_code.as_deref(), Some(FAIL_NO_CANDLES));
    }

    #[test]
    fn short_history_fails_no_candles() {
        let closes = vec![100.0; 50];
        let candles = candles_from_closes(&closes, 1.0);
        let trace = run_eligibility("XYZ", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert_eq!(trace.primary_reason_code.as_deref(), Some(FAIL_NO_CANDLES));
    }

    #[test]
    fn cc_never_chosen_without_holdings() {
        // Downtrend shaped for CC, but holdings = 0.
        let closes: Vec<f64> = (0..260).map(|i| 300.0 - i as f64 * 0.3).collect();
        let candles = candles_from_closes(&closes, 0.6);
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert_ne!(trace.mode_decision, ModeDecision::Cc);
        assert!(trace
            .rejection_reason_codes
            .iter()
            .any(|c| c == FAIL_NO_HOLDINGS || c == FAIL_NOT_HELD_FOR_CC));
    }

    #[test]
    fn flat_market_rejects_csp_on_regime() {
        let closes = vec![100.0; 260];
        let candles = candles_from_closes(&closes, 1.0);
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert_eq!(trace.mode_decision, ModeDecision::None);
        assert!(trace
            .rejection_reason_codes
            .contains(&FAIL_REGIME_CSP.to_string()));
    }

    #[test]
    fn high_atr_rejected() {
        // 10% daily ranges blow through the 5% ATR cap.
        let closes: Vec<f64> = (0..260).map(|i| 100.0 + i as f64 * 0.3).collect();
        let candles = candles_from_closes(&closes, 10.0);
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert!(trace
            .rejection_reason_codes
            .contains(&FAIL_ATR_TOO_HIGH.to_string()));
        assert_ne!(trace.mode_decision, ModeDecision::Csp);
    }

    #[test]
    fn csp_passes_on_friendly_series() {
        let candles = csp_friendly_candles();
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        // The series is built for UP regime + pullback; if any gate still
        // trips, the trace must carry its code and mode must be NONE.
        match trace.mode_decision {
            ModeDecision::Csp => {
                assert!(trace.primary_reason_code.is_none());
                assert_eq!(trace.regime, Some(TrendRegime::Up));
            }
            _ => {
                assert!(!trace.rejection_reason_codes.is_empty());
                assert!(trace.primary_reason_code.is_some());
            }
        }
    }

    #[test]
    fn intraday_missing_data_demotes_csp() {
        let mut config = cfg();
        config.enable_intraday_confirmation = true;
        let candles = csp_friendly_candles();
        let trace = run_eligibility("T", &candles, Some(&[]), 0.0, &config, &vol_cfg());
        if let Some(intra) = &trace.intraday {
            // Only present when the daily side decided CSP first.
            assert!(!intra.data_present);
            assert_eq!(
                intra.reason_code.as_deref(),
                Some(FAIL_INTRADAY_DATA_MISSING)
            );
            assert_eq!(trace.mode_decision, ModeDecision::None);
            assert_eq!(
                trace.primary_reason_code.as_deref(),
                Some(FAIL_INTRADAY_DATA_MISSING)
            );
        }
    }

    #[test]
    fn intraday_down_regime_conflicts() {
        let mut config = cfg();
        config.enable_intraday_confirmation = true;
        let candles = csp_friendly_candles();

        let start = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let bars: Vec<IntradayCandle> = (0..80)
            .map(|i| {
                let c = 300.0 - i as f64;
                IntradayCandle {
                    ts: start + chrono::Duration::hours(4 * i as i64),
                    open: c,
                    high: c + 0.5,
                    low: c - 0.5,
                    close: c,
                    volume: 10_000.0,
                }
            })
            .collect();

        let trace = run_eligibility("T", &candles, Some(&bars), 0.0, &config, &vol_cfg());
        if let Some(intra) = &trace.intraday {
            assert!(intra.data_present);
            assert!(!intra.alignment_pass);
            assert_eq!(intra.intraday_regime, Some(TrendRegime::Down));
            assert_eq!(trace.mode_decision, ModeDecision::None);
            assert_eq!(
                trace.primary_reason_code.as_deref(),
                Some(FAIL_INTRADAY_REGIME_CONFLICT)
            );
        }
    }

    #[test]
    fn primary_reason_is_first_failing_gate() {
        let closes = vec![100.0; 260];
        let candles = candles_from_closes(&closes, 1.0);
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert_eq!(
            trace.primary_reason_code.as_deref(),
            trace.rejection_reason_codes.first().map(String::as_str)
        );
    }

    #[test]
    fn trace_reports_computed_block() {
        let candles = csp_friendly_candles();
        let trace = run_eligibility("T", &candles, None, 0.0, &cfg(), &vol_cfg());
        assert!(trace.computed.close.is_some());
        assert!(trace.computed.ema20.is_some());
        assert!(trace.computed.ema200.is_some());
        assert!(trace.computed.rsi14.is_some());
        assert!(trace.computed.atr_pct.is_some());
    }
}
