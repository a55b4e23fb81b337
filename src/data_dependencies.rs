// =============================================================================
// Data-Dependencies Checker — required / optional / stale field policy
// =============================================================================
//
// Pure check over a snapshot. Required fields depend on the instrument type:
//
//   EQUITY:      price, iv_rank, bid, ask, volume, quote_date
//   ETF / INDEX: price, iv_rank, volume, quote_date   (bid/ask/OI relaxed)
//
// A quote_date older than `staleness_trading_days` trading days marks the
// required set stale. Status derivation:
//
//   FAIL  any required field missing
//   WARN  no required missing, but stale or optional missing
//   PASS  otherwise

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::market_calendar::trading_days_since;
use crate::snapshot::SymbolSnapshot;
use crate::types::{GateStatus, InstrumentType};

pub const REQUIRED_FIELDS_EQUITY: &[&str] =
    &["price", "iv_rank", "bid", "ask", "volume", "quote_date"];
pub const REQUIRED_FIELDS_ETF_INDEX: &[&str] = &["price", "iv_rank", "volume", "quote_date"];

/// Required evaluation fields for an instrument type.
pub fn required_fields_for(instrument: InstrumentType) -> &'static [&'static str] {
    match instrument {
        InstrumentType::Equity => REQUIRED_FIELDS_EQUITY,
        InstrumentType::Etf | InstrumentType::Index => REQUIRED_FIELDS_ETF_INDEX,
    }
}

/// Dependency lists plus the derived status for one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub required_missing: Vec<String>,
    pub optional_missing: Vec<String>,
    pub required_stale: Vec<String>,
    pub status: GateStatus,
    /// Trading days since quote_date, when known.
    pub stale_days: Option<i64>,
}

fn field_present(snapshot: &SymbolSnapshot, field: &str) -> bool {
    match field {
        "price" => snapshot.price.is_some(),
        "bid" => snapshot.bid.is_some(),
        "ask" => snapshot.ask.is_some(),
        "volume" => snapshot.volume.is_some(),
        "quote_date" => snapshot.quote_date.is_some(),
        "iv_rank" => snapshot.iv_rank.is_some(),
        "avg_option_volume_20d" => snapshot.avg_option_volume_20d.is_some(),
        "avg_stock_volume_20d" => snapshot.avg_stock_volume_20d.is_some(),
        _ => false,
    }
}

/// Required fields that are missing for this snapshot's instrument type.
pub fn compute_required_missing(
    snapshot: &SymbolSnapshot,
    instrument: InstrumentType,
) -> Vec<String> {
    required_fields_for(instrument)
        .iter()
        .filter(|f| !field_present(snapshot, f))
        .map(|f| f.to_string())
        .collect()
}

/// Optional fields (explicit config list) that are missing.
pub fn compute_optional_missing(snapshot: &SymbolSnapshot, optional: &[String]) -> Vec<String> {
    optional
        .iter()
        .filter(|f| !field_present(snapshot, f))
        .cloned()
        .collect()
}

/// Required fields marked stale because quote_date is older than the
/// threshold. A snapshot without a quote_date marks the whole required set
/// stale — age cannot be proven.
pub fn compute_required_stale(
    snapshot: &SymbolSnapshot,
    instrument: InstrumentType,
    today: NaiveDate,
    max_trading_days: i64,
) -> (Vec<String>, Option<i64>) {
    let required: Vec<String> = required_fields_for(instrument)
        .iter()
        .map(|f| f.to_string())
        .collect();

    match snapshot.quote_date {
        None => (required, None),
        Some(quote_date) => {
            let days = trading_days_since(quote_date, today);
            if days > max_trading_days {
                (required, Some(days))
            } else {
                (Vec::new(), Some(days))
            }
        }
    }
}

/// Derive the dependency status from the three lists.
pub fn dependency_status(
    required_missing: &[String],
    required_stale: &[String],
    optional_missing: &[String],
) -> GateStatus {
    if !required_missing.is_empty() {
        GateStatus::Fail
    } else if !required_stale.is_empty() || !optional_missing.is_empty() {
        GateStatus::Warn
    } else {
        GateStatus::Pass
    }
}

/// Run the full dependency check for one snapshot.
pub fn check_dependencies(
    snapshot: &SymbolSnapshot,
    instrument: InstrumentType,
    optional_fields: &[String],
    today: NaiveDate,
    staleness_trading_days: i64,
) -> DependencyReport {
    let required_missing = compute_required_missing(snapshot, instrument);
    let optional_missing = compute_optional_missing(snapshot, optional_fields);
    let (required_stale, stale_days) =
        compute_required_stale(snapshot, instrument, today, staleness_trading_days);
    let status = dependency_status(&required_missing, &required_stale, &optional_missing);

    DependencyReport {
        required_missing,
        optional_missing,
        required_stale,
        status,
        stale_days,
    }
}
