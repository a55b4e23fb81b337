// =============================================================================
// Shared types used across the WheelOps evaluation engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// How the engine is being run. LIVE and PAPER_LIVE are freeze-guarded;
/// DRY_RUN always bypasses the guard and never records freeze state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    DryRun,
    PaperLive,
    Live,
}

impl Default for RunMode {
    fn default() -> Self {
        Self::DryRun
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DryRun => write!(f, "DRY_RUN"),
            Self::PaperLive => write!(f, "PAPER_LIVE"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Phase of the trading day, derived from the exchange calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketPhase {
    Pre,
    Open,
    Mid,
    Post,
    Closed,
}

impl std::fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pre => write!(f, "PRE"),
            Self::Open => write!(f, "OPEN"),
            Self::Mid => write!(f, "MID"),
            Self::Post => write!(f, "POST"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Instrument classification. ETF and INDEX relax the required-field policy
/// (bid/ask/open-interest are not required for Stage-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    Equity,
    Etf,
    Index,
}

/// Classify a ticker into an instrument type using a fixed membership list.
/// Anything not recognised is treated as EQUITY (the strictest policy).
pub fn classify_instrument(symbol: &str) -> InstrumentType {
    const ETFS: &[&str] = &[
        "SPY", "QQQ", "IWM", "DIA", "XLE", "XLF", "XLK", "XLV", "GLD", "SLV", "TLT", "HYG",
    ];
    const INDEXES: &[&str] = &["SPX", "NDX", "RUT", "VIX", "DJX"];

    let sym = symbol.trim().to_uppercase();
    if INDEXES.contains(&sym.as_str()) {
        InstrumentType::Index
    } else if ETFS.contains(&sym.as_str()) {
        InstrumentType::Etf
    } else {
        InstrumentType::Equity
    }
}

/// Per-symbol, per-cycle strategy decision. CSP and CC are mutually exclusive;
/// CSP wins when both sets of gates pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModeDecision {
    Csp,
    Cc,
    None,
}

impl std::fmt::Display for ModeDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csp => write!(f, "CSP"),
            Self::Cc => write!(f, "CC"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// PUT or CALL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    Put,
    Call,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Put => write!(f, "PUT"),
            Self::Call => write!(f, "CALL"),
        }
    }
}

/// Which chain source Stage-2 actually used. NONE means Stage-2 did not run
/// or the chain came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainSource {
    Live,
    Delayed,
    #[default]
    None,
}

impl std::fmt::Display for ChainSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "LIVE"),
            Self::Delayed => write!(f, "DELAYED"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Stage-1 stock verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockVerdict {
    Qualified,
    Hold,
    Blocked,
    Error,
}

impl std::fmt::Display for StockVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qualified => write!(f, "QUALIFIED"),
            Self::Hold => write!(f, "HOLD"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Tri-state status used by the data-dependency checker and layered
/// eligibility output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warn => write!(f, "WARN"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Confidence band assigned to every scored symbol. D is the floor — a
/// symbol row never carries a null band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    A,
    B,
    C,
    D,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

/// Advisory severity attached by guardrails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Advisory,
    Warn,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advisory => write!(f, "ADVISORY"),
            Self::Warn => write!(f, "WARN"),
            Self::Info => write!(f, "INFO"),
        }
    }
}
