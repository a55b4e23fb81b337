// =============================================================================
// Position Evaluator — deterministic exit decisions, no broker calls
// =============================================================================
//
// The single decision authority for open positions. Priority-ordered rules,
// first match wins:
//
//   1. panic_flag                      -> EXIT_NOW  panic_regime_flip  PANIC
//   2. dte <= hard (7)                 -> EXIT_NOW  dte_hard_exit
//                                         (EXPIRY_CRITICAL when dte <= 3)
//   3. premium capture >= 75%          -> EXIT_NOW  premium_75_target
//                                         (FAST_CAPTURE when dte > 3)
//   4. spot past structure target T2   -> EXIT_NOW  structure_T2
//   5. dte <= soft (14)                -> ROLL_SUGGESTED  dte_soft_roll  ADVISORY
//   6. hit T1 and premium >= 50%       -> TAKE_PROFIT  structure_T1_premium_50  ADVISORY
//   7. premium >= 60%:
//        not past T2 and regime favorable -> HOLD  ride_zone_60_regime_ok
//        otherwise                        -> TAKE_PROFIT  premium_60_take_profit
//   8. default                         -> HOLD
//
// Data-missing policy: a null option quote or non-positive entry premium
// yields premium_capture = null, a risk flag, reason "data_missing", and
// HOLD. The evaluator never mutates the position.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::state_machine::{Position, PositionType};
use crate::regime::TrendRegime;
use crate::runtime_config::LifecycleConfig;

/// Exit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitSignal {
    Hold,
    TakeProfit,
    RollSuggested,
    ExitNow,
}

impl std::fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
            Self::RollSuggested => write!(f, "ROLL_SUGGESTED"),
            Self::ExitNow => write!(f, "EXIT_NOW"),
        }
    }
}

/// Urgency attached to an exit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitPriority {
    Panic,
    ExpiryCritical,
    FastCapture,
    Advisory,
}

/// Informational exit plan attached to a position. Only the evaluator turns
/// it into a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub profit_target_pct: f64,
    pub premium_extension_pct: f64,
    #[serde(default)]
    pub max_loss_multiplier: Option<f64>,
    pub time_stop_soft_days: i64,
    pub time_stop_hard_days: i64,
    #[serde(default)]
    pub underlying_stop_breach: bool,
    /// Structure targets from the entry analysis.
    #[serde(default)]
    pub structure_t1: Option<f64>,
    #[serde(default)]
    pub structure_t2: Option<f64>,
    #[serde(default)]
    pub panic_flag: bool,
    /// Daily regime at evaluation time, for the ride-zone rule.
    #[serde(default)]
    pub regime_daily: Option<TrendRegime>,
}

impl ExitPlan {
    pub fn from_config(cfg: &LifecycleConfig) -> Self {
        Self {
            profit_target_pct: cfg.profit_target_pct,
            premium_extension_pct: cfg.premium_extension_pct,
            max_loss_multiplier: None,
            time_stop_soft_days: cfg.dte_soft_exit_threshold,
            time_stop_hard_days: cfg.dte_hard_exit_threshold,
            underlying_stop_breach: false,
            structure_t1: None,
            structure_t2: None,
            panic_flag: false,
            regime_daily: None,
        }
    }
}

/// Evaluator output. Pure data; nothing here mutates the position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub position_id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub premium_capture_pct: Option<f64>,
    pub days_in_trade: Option<i64>,
    pub dte: Option<i64>,
    pub hit_t1: bool,
    pub hit_t2: bool,
    pub exit_signal: ExitSignal,
    pub exit_reason: String,
    pub exit_priority: Option<ExitPriority>,
    pub risk_flags: Vec<String>,
}

/// Premium captured so far: (entry - current_mid) / entry, clamped [0, 1].
/// Same formula for CSP and CC. `None` when the quote or entry is unusable.
pub fn premium_capture_pct(
    entry_premium: f64,
    bid: Option<f64>,
    ask: Option<f64>,
) -> Option<f64> {
    if entry_premium <= 0.0 {
        return None;
    }
    let current_mid = (bid? + ask?) / 2.0;
    if current_mid >= entry_premium {
        return Some(0.0);
    }
    Some(((entry_premium - current_mid) / entry_premium).clamp(0.0, 1.0))
}

/// Evaluate one open position against its exit plan.
pub fn evaluate_position(
    position: &Position,
    current_spot: Option<f64>,
    current_option_bid: Option<f64>,
    current_option_ask: Option<f64>,
    plan: &ExitPlan,
    today: NaiveDate,
) -> PositionEvaluation {
    // Entry premium per contract: the stored credit is the total.
    let entry_premium = if position.contracts > 0 {
        position.premium_collected / (position.contracts as f64 * 100.0)
    } else {
        0.0
    };

    let days_in_trade = position.entry_date.map(|d| (today - d).num_days());
    let dte = position.expiry.map(|d| (d - today).num_days());

    let mut eval = PositionEvaluation {
        position_id: position.id.clone(),
        symbol: position.symbol.clone(),
        position_type: position.position_type,
        premium_capture_pct: None,
        days_in_trade,
        dte,
        hit_t1: false,
        hit_t2: false,
        exit_signal: ExitSignal::Hold,
        exit_reason: "hold".to_string(),
        exit_priority: None,
        risk_flags: Vec::new(),
    };

    // --- Structure targets -----------------------------------------------
    let spot = current_spot.unwrap_or(0.0);
    if let Some(t1) = plan.structure_t1 {
        if spot >= t1 {
            eval.hit_t1 = true;
        }
    }
    if let Some(t2) = plan.structure_t2 {
        match position.position_type {
            PositionType::Cc => {
                if spot <= t2 {
                    eval.hit_t2 = true;
                }
            }
            _ => {
                if spot >= t2 {
                    eval.hit_t2 = true;
                }
            }
        }
    }

    // --- Data-missing path -------------------------------------------------
    if entry_premium <= 0.0 {
        eval.risk_flags.push("BAD_ENTRY_PREMIUM".to_string());
        eval.exit_reason = "data_missing".to_string();
        return eval;
    }
    if current_option_bid.is_none() || current_option_ask.is_none() {
        eval.risk_flags.push("MISSING_OPTION_QUOTE".to_string());
        eval.exit_reason = "data_missing".to_string();
        return eval;
    }

    let premium = premium_capture_pct(entry_premium, current_option_bid, current_option_ask);
    eval.premium_capture_pct = premium;

    let regime_favorable = matches!(
        (position.position_type, plan.regime_daily),
        (PositionType::Csp, Some(TrendRegime::Up)) | (PositionType::Cc, Some(TrendRegime::Down))
    );

    // Unknown expiry never triggers time rules.
    let dte_for_rules = dte.unwrap_or(i64::MAX);
    let premium_val = premium.unwrap_or(0.0);

    // --- Priority-ordered rules (first match wins) -------------------------
    if plan.panic_flag {
        eval.exit_signal = ExitSignal::ExitNow;
        eval.exit_reason = "panic_regime_flip".to_string();
        eval.exit_priority = Some(ExitPriority::Panic);
        eval.risk_flags.push("panic".to_string());
    } else if dte_for_rules <= plan.time_stop_hard_days {
        eval.exit_signal = ExitSignal::ExitNow;
        eval.exit_reason = "dte_hard_exit".to_string();
        if dte_for_rules <= 3 {
            eval.exit_priority = Some(ExitPriority::ExpiryCritical);
        }
        eval.risk_flags.push("dte_hard".to_string());
    } else if premium.is_some() && premium_val >= plan.premium_extension_pct {
        eval.exit_signal = ExitSignal::ExitNow;
        eval.exit_reason = "premium_75_target".to_string();
        if dte_for_rules > 3 {
            eval.exit_priority = Some(ExitPriority::FastCapture);
        }
    } else if eval.hit_t2 {
        eval.exit_signal = ExitSignal::ExitNow;
        eval.exit_reason = "structure_T2".to_string();
    } else if dte_for_rules <= plan.time_stop_soft_days {
        eval.exit_signal = ExitSignal::RollSuggested;
        eval.exit_reason = "dte_soft_roll".to_string();
        eval.exit_priority = Some(ExitPriority::Advisory);
        eval.risk_flags.push("dte_soft".to_string());
    } else if eval.hit_t1 && premium.is_some() && premium_val >= 0.50 {
        eval.exit_signal = ExitSignal::TakeProfit;
        eval.exit_reason = "structure_T1_premium_50".to_string();
        eval.exit_priority = Some(ExitPriority::Advisory);
    } else if premium.is_some() && premium_val >= plan.profit_target_pct {
        if !eval.hit_t2 && regime_favorable {
            eval.exit_signal = ExitSignal::Hold;
            eval.exit_reason = "ride_zone_60_regime_ok".to_string();
        } else {
            eval.exit_signal = ExitSignal::TakeProfit;
            eval.exit_reason = "premium_60_take_profit".to_string();
        }
    }

    eval
}
