// =============================================================================
// Stage-1 Qualifier — stock-level data verdict
// =============================================================================
//
// Stage-1 is pure over the canonical snapshot and its dependency report. It
// never touches option chains. Verdicts:
//
//   BLOCKED    required fields missing (reason enumerates them)
//   HOLD       required data present but stale — evaluate, do not enter
//   QUALIFIED  required data present and fresh
//   ERROR      reserved for pipeline-level failures (snapshot build failed)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_dependencies::DependencyReport;
use crate::data_quality::{build_data_incomplete_reason, compute_completeness, DataQuality};
use crate::snapshot::SymbolSnapshot;
use crate::types::StockVerdict;

/// Stage-1 output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Result {
    pub symbol: String,
    pub verdict: StockVerdict,
    pub reason: String,
    pub missing_fields: Vec<String>,
    pub data_quality_details: BTreeMap<String, DataQuality>,
    /// Fraction of evaluation fields VALID, 0.0-1.0.
    pub completeness: f64,
}

impl Stage1Result {
    /// Construct the ERROR verdict used when the snapshot itself could not
    /// be built (provider-layer collapse, panicked worker).
    pub fn error(symbol: &str, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            verdict: StockVerdict::Error,
            reason: reason.into(),
            missing_fields: Vec::new(),
            data_quality_details: BTreeMap::new(),
            completeness: 0.0,
        }
    }
}

/// Qualify a symbol from its snapshot and dependency report.
pub fn qualify(snapshot: &SymbolSnapshot, report: &DependencyReport) -> Stage1Result {
    let qualities = snapshot.field_qualities();
    let (completeness, _) = compute_completeness(&qualities);
    let data_quality_details: BTreeMap<String, DataQuality> = qualities
        .iter()
        .map(|(name, q)| (name.to_string(), *q))
        .collect();

    let (verdict, reason) = if !report.required_missing.is_empty() {
        (
            StockVerdict::Blocked,
            build_data_incomplete_reason(&report.required_missing),
        )
    } else if !report.required_stale.is_empty() {
        let days = report
            .stale_days
            .map(|d| format!("{d} trading days old"))
            .unwrap_or_else(|| "age unknown".to_string());
        (StockVerdict::Hold, format!("DATA_STALE - quote_date {days}"))
    } else {
        (StockVerdict::Qualified, String::new())
    };

    debug!(
        symbol = %snapshot.ticker,
        verdict = %verdict,
        missing = report.required_missing.len(),
        "stage-1 verdict"
    );

    Stage1Result {
        symbol: snapshot.ticker.clone(),
        verdict,
        reason,
        missing_fields: report.required_missing.clone(),
        data_quality_details,
        completeness,
    }
}
