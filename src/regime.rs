// =============================================================================
// Regime Classifiers — per-symbol trend regime and market-level risk regime
// =============================================================================
//
// Two classifiers live here:
//
// 1. Trend regime (per symbol, per timeframe) over the EMA stack:
//      UP:       ema20 > ema50 > ema200 and slope >= 0
//      DOWN:     ema20 < ema50 < ema200 and slope <= 0
//      SIDEWAYS: otherwise
//    The slope is the least-squares slope of the EMA200 series over the last
//    `SLOPE_LOOKBACK` points.
//
// 2. Market regime (index-level) RISK_ON / RISK_OFF:
//      RISK_ON requires close > EMA200, EMA50 > EMA200, EMA200 slope >= 0,
//      and weekly close > weekly EMA200 (weekly bars resampled from daily).
//    Confidence is the fraction of conditions met, 0-100.
//
// The market regime state is persisted to `market/market_regime.json` in the
// output directory so the UI and scorer read the same snapshot the run used.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::indicators::ema::{ema, ema_series, series_slope};
use crate::market_data::{resample_weekly, DailyCandle, IntradayCandle};

/// Points of EMA200 history used for the slope estimate.
const SLOPE_LOOKBACK: usize = 20;

// =============================================================================
// Trend regime (per symbol)
// =============================================================================

/// Directional regime for a single symbol on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendRegime {
    Up,
    Down,
    Sideways,
}

impl std::fmt::Display for TrendRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Classify from pre-computed EMA values and slope.
pub fn classify_regime(ema20: f64, ema50: f64, ema200: f64, slope: f64) -> TrendRegime {
    if ema20 > ema50 && ema50 > ema200 && slope >= 0.0 {
        TrendRegime::Up
    } else if ema20 < ema50 && ema50 < ema200 && slope <= 0.0 {
        TrendRegime::Down
    } else {
        TrendRegime::Sideways
    }
}

/// Compute the trend regime from daily closes.
///
/// Returns `None` when there are not enough closes for the EMA200 stack.
pub fn regime_from_closes(closes: &[f64]) -> Option<TrendRegime> {
    let ema20 = ema(closes, 20)?;
    let ema50 = ema(closes, 50)?;
    let ema200_series = ema_series(closes, 200);
    let ema200 = *ema200_series.last()?;
    let slope = series_slope(&ema200_series, SLOPE_LOOKBACK).unwrap_or(0.0);
    Some(classify_regime(ema20, ema50, ema200, slope))
}

/// Compute the weekly trend regime by resampling daily bars.
pub fn weekly_regime(daily: &[DailyCandle]) -> Option<TrendRegime> {
    let weekly = resample_weekly(daily);
    let closes: Vec<f64> = weekly.iter().map(|c| c.close).collect();
    // Weekly history is an order of magnitude shorter; use a 4/13/52 stack.
    let ema4 = ema(&closes, 4)?;
    let ema13 = ema(&closes, 13)?;
    let ema52_series = ema_series(&closes, 52);
    let ema52 = *ema52_series.last()?;
    let slope = series_slope(&ema52_series, SLOPE_LOOKBACK).unwrap_or(0.0);
    Some(classify_regime(ema4, ema13, ema52, slope))
}

/// Compute the intraday (4H) trend regime used by the confirmation gate.
///
/// The intraday stack is shorter (20/50 with the EMA50 slope) because a 200-
/// bar 4H history spans months of sessions.
pub fn intraday_regime(candles: &[IntradayCandle]) -> Option<TrendRegime> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema20 = ema(&closes, 20)?;
    let ema50_series = ema_series(&closes, 50);
    let ema50 = *ema50_series.last()?;
    let slope = series_slope(&ema50_series, SLOPE_LOOKBACK).unwrap_or(0.0);

    if ema20 > ema50 && slope >= 0.0 {
        Some(TrendRegime::Up)
    } else if ema20 < ema50 && slope <= 0.0 {
        Some(TrendRegime::Down)
    } else {
        Some(TrendRegime::Sideways)
    }
}

// =============================================================================
// Market regime (index level)
// =============================================================================

/// RISK_ON / RISK_OFF market classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    RiskOn,
    RiskOff,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskOn => write!(f, "RISK_ON"),
            Self::RiskOff => write!(f, "RISK_OFF"),
        }
    }
}

/// Condition flags behind a market-regime classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegimeDetails {
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_slope: f64,
    pub close_above_ema200: bool,
    pub ema50_above_ema200: bool,
    pub ema200_slope_positive: bool,
    pub weekly_confirm: bool,
}

/// Full market regime snapshot, persisted to `market/market_regime.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegimeState {
    pub regime: MarketRegime,
    /// 0-100: fraction of conditions met.
    pub confidence: u32,
    pub details: MarketRegimeDetails,
    pub computed_at: String,
}

/// EMA in the pandas `ewm(span, adjust=False)` convention: seeded with the
/// first observation, defined for any non-empty series. The market regime
/// keeps this convention so short index histories still classify.
fn ewm_series(closes: &[f64], span: usize) -> Vec<f64> {
    if closes.is_empty() || span == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (span + 1) as f64;
    let mut out = Vec::with_capacity(closes.len());
    let mut prev = closes[0];
    out.push(prev);
    for &close in &closes[1..] {
        prev = close * alpha + prev * (1.0 - alpha);
        out.push(prev);
    }
    out
}

/// Compute the RISK_ON / RISK_OFF market regime from index daily candles.
///
/// Returns `None` on an empty candle set.
pub fn compute_market_regime(daily: &[DailyCandle], now_iso: &str) -> Option<MarketRegimeState> {
    if daily.is_empty() {
        return None;
    }

    let closes: Vec<f64> = daily.iter().map(|c| c.close).collect();
    let close = *closes.last()?;

    let ema_fast_series = ewm_series(&closes, 50);
    let ema_slow_series = ewm_series(&closes, 200);
    let ema_fast = *ema_fast_series.last()?;
    let ema_slow = *ema_slow_series.last()?;
    let ema_slope = series_slope(&ema_slow_series, SLOPE_LOOKBACK).unwrap_or(0.0);

    let close_above_ema200 = close > ema_slow;
    let ema50_above_ema200 = ema_fast > ema_slow;
    let ema200_slope_positive = ema_slope >= 0.0;

    // Weekly confirmation: weekly close above weekly EMA200 (ewm convention).
    let weekly = resample_weekly(daily);
    let weekly_closes: Vec<f64> = weekly.iter().map(|c| c.close).collect();
    let weekly_confirm = match (
        weekly_closes.last(),
        ewm_series(&weekly_closes, 200).last(),
    ) {
        (Some(&wc), Some(&we)) => wc > we,
        _ => false,
    };

    let conditions = [
        close_above_ema200,
        ema50_above_ema200,
        ema200_slope_positive,
        weekly_confirm,
    ];
    let met = conditions.iter().filter(|&&c| c).count();
    let confidence = ((met as f64 / conditions.len() as f64) * 100.0) as u32;

    let regime = if conditions.iter().all(|&c| c) {
        MarketRegime::RiskOn
    } else {
        MarketRegime::RiskOff
    };

    debug!(
        regime = %regime,
        confidence,
        close_above_ema200,
        ema50_above_ema200,
        ema200_slope_positive,
        weekly_confirm,
        "market regime computed"
    );

    Some(MarketRegimeState {
        regime,
        confidence,
        details: MarketRegimeDetails {
            close,
            ema_fast,
            ema_slow,
            ema_slope,
            close_above_ema200,
            ema50_above_ema200,
            ema200_slope_positive,
            weekly_confirm,
        },
        computed_at: now_iso.to_string(),
    })
}

/// Persist the market regime state under `<output_dir>/market/market_regime.json`
/// using the tmp + rename pattern.
pub fn save_market_regime(output_dir: &Path, state: &MarketRegimeState) -> Result<()> {
    let dir = output_dir.join("market");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("market_regime.json");
    let tmp = dir.join("market_regime.json.tmp");

    let content =
        serde_json::to_string_pretty(state).context("failed to serialise market regime")?;
    std::fs::write(&tmp, content)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to rename {}", tmp.display()))?;

    info!(regime = %state.regime, confidence = state.confidence, "market regime saved");
    Ok(())
}

/// Load the last persisted market regime state, if any.
pub fn load_market_regime(output_dir: &Path) -> Option<MarketRegimeState> {
    let path = output_dir.join("market").join("market_regime.json");
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
