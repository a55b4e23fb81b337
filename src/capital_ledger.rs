// =============================================================================
// Capital Ledger — append-only cash events and monthly accounting
// =============================================================================
//
// Storage is a JSONL file (`capital_ledger.jsonl`), one event per line,
// appended under a lock and never rewritten. Aggregations are pure functions
// of the entry list: same inputs, same outputs — the monthly summary is
// reproducible by construction.
//
// Event semantics:
//   OPEN          credit received when the position was sold
//   PARTIAL_CLOSE realized cash from closing part of the position
//   CLOSE         realized cash from the final close
//   ASSIGNMENT    cash impact of share assignment

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cash-event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapitalLedgerEventType {
    Open,
    PartialClose,
    Close,
    Assignment,
}

/// One append-only ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalLedgerEntry {
    pub date: NaiveDate,
    pub position_id: String,
    pub event_type: CapitalLedgerEventType,
    pub cash_delta: f64,
    #[serde(default)]
    pub notes: String,
}

/// Deterministic monthly roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    /// Sum of OPEN cash deltas in the month.
    pub total_credit_collected: f64,
    /// Sum of PARTIAL_CLOSE + CLOSE cash deltas in the month.
    pub realized_pnl: f64,
    /// Fraction of positions closed in the month with positive realized cash.
    pub win_rate: f64,
    pub avg_days_in_trade: f64,
    /// Largest peak-to-trough dip of the cumulative realized series.
    pub max_drawdown: f64,
    pub positions_closed: usize,
}

/// Append-only JSONL ledger. The ledger is the exclusive writer for its
/// file; appends are serialized by the internal lock.
pub struct CapitalLedger {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl CapitalLedger {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join("capital_ledger.jsonl"),
            append_lock: Mutex::new(()),
        }
    }

    /// Append one event. The file is never rewritten.
    pub fn append(&self, entry: &CapitalLedgerEntry) -> Result<()> {
        let _guard = self.append_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let line = serde_json::to_string(entry).context("failed to serialise ledger entry")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        debug!(
            position_id = %entry.position_id,
            event = ?entry.event_type,
            cash_delta = entry.cash_delta,
            "ledger entry appended"
        );
        Ok(())
    }

    /// Read every entry, oldest first. Unparseable lines are skipped with a
    /// warning — a torn final line must not hide the rest of the history.
    pub fn entries(&self) -> Vec<CapitalLedgerEntry> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unparseable ledger line");
                    None
                }
            })
            .collect()
    }
}

/// Compute the monthly summary from a full entry list. Pure.
pub fn summarize_month(year: i32, month: u32, entries: &[CapitalLedgerEntry]) -> MonthlySummary {
    let in_month =
        |e: &&CapitalLedgerEntry| e.date.year() == year && e.date.month() == month;

    let total_credit_collected: f64 = entries
        .iter()
        .filter(in_month)
        .filter(|e| e.event_type == CapitalLedgerEventType::Open)
        .map(|e| e.cash_delta)
        .sum();

    let realized: Vec<&CapitalLedgerEntry> = entries
        .iter()
        .filter(in_month)
        .filter(|e| {
            matches!(
                e.event_type,
                CapitalLedgerEventType::PartialClose | CapitalLedgerEventType::Close
            )
        })
        .collect();
    let realized_pnl: f64 = realized.iter().map(|e| e.cash_delta).sum();

    // Positions closed this month, with their full realized cash and open date.
    let mut closed_ids: Vec<&str> = entries
        .iter()
        .filter(in_month)
        .filter(|e| e.event_type == CapitalLedgerEventType::Close)
        .map(|e| e.position_id.as_str())
        .collect();
    closed_ids.sort_unstable();
    closed_ids.dedup();

    let mut wins = 0usize;
    let mut days_total = 0i64;
    let mut days_counted = 0usize;
    for id in &closed_ids {
        let position_entries: Vec<&CapitalLedgerEntry> = entries
            .iter()
            .filter(|e| e.position_id == *id)
            .collect();
        let position_realized: f64 = position_entries
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CapitalLedgerEventType::PartialClose | CapitalLedgerEventType::Close
                )
            })
            .map(|e| e.cash_delta)
            .sum();
        if position_realized > 0.0 {
            wins += 1;
        }

        let open_date = position_entries
            .iter()
            .filter(|e| e.event_type == CapitalLedgerEventType::Open)
            .map(|e| e.date)
            .min();
        let close_date = position_entries
            .iter()
            .filter(|e| e.event_type == CapitalLedgerEventType::Close)
            .map(|e| e.date)
            .max();
        if let (Some(open), Some(close)) = (open_date, close_date) {
            days_total += (close - open).num_days();
            days_counted += 1;
        }
    }

    let win_rate = if closed_ids.is_empty() {
        0.0
    } else {
        wins as f64 / closed_ids.len() as f64
    };
    let avg_days_in_trade = if days_counted == 0 {
        0.0
    } else {
        days_total as f64 / days_counted as f64
    };

    // Max drawdown over the cumulative realized series, in entry order
    // (entries are appended chronologically).
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for e in &realized {
        cumulative += e.cash_delta;
        if cumulative > peak {
            peak = cumulative;
        }
        let dip = peak - cumulative;
        if dip > max_drawdown {
            max_drawdown = dip;
        }
    }

    MonthlySummary {
        year,
        month,
        total_credit_collected,
        realized_pnl,
        win_rate,
        avg_days_in_trade,
        max_drawdown,
        positions_closed: closed_ids.len(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        date: &str,
        position_id: &str,
        event_type: CapitalLedgerEventType,
        cash_delta: f64,
    ) -> CapitalLedgerEntry {
        CapitalLedgerEntry {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            position_id: position_id.to_string(),
            event_type,
            cash_delta,
            notes: String::new(),
        }
    }

    #[test]
    fn entry_model_fields() {
        let e = entry("2026-02-01", "pos-1", CapitalLedgerEventType::Open, 250.0);
        assert_eq!(e.position_id, "pos-1");
        assert_eq!(e.cash_delta, 250.0);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"OPEN\""));
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CapitalLedger::new(dir.path());
        ledger
            .append(&entry("2026-02-01", "p1", CapitalLedgerEventType::Open, 300.0))
            .unwrap();
        ledger
            .append(&entry("2026-02-15", "p1", CapitalLedgerEventType::PartialClose, 50.0))
            .unwrap();
        ledger
            .append(&entry("2026-02-20", "p1", CapitalLedgerEventType::Close, 80.0))
            .unwrap();

        let entries = ledger.entries();
        assert_eq!(entries.len(), 3);
        let open_total: f64 = entries
            .iter()
            .filter(|e| e.event_type == CapitalLedgerEventType::Open)
            .map(|e| e.cash_delta)
            .sum();
        let realized: f64 = entries
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CapitalLedgerEventType::PartialClose | CapitalLedgerEventType::Close
                )
            })
            .map(|e| e.cash_delta)
            .sum();
        assert_eq!(open_total, 300.0);
        assert_eq!(realized, 130.0);
    }

    #[test]
    fn torn_line_does_not_hide_history() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CapitalLedger::new(dir.path());
        ledger
            .append(&entry("2026-02-01", "p1", CapitalLedgerEventType::Open, 100.0))
            .unwrap();
        // Simulate a crash mid-append.
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(dir.path().join("capital_ledger.jsonl"))
                .unwrap();
            write!(file, "{{\"date\": \"2026-").unwrap();
        }
        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn monthly_summary_is_deterministic() {
        let entries = vec![
            entry("2099-11-01", "p1", CapitalLedgerEventType::Open, 100.0),
            entry("2099-11-10", "p1", CapitalLedgerEventType::Close, 15.0),
        ];
        let s1 = summarize_month(2099, 11, &entries);
        let s2 = summarize_month(2099, 11, &entries);
        assert_eq!(s1, s2);
        assert_eq!(s1.total_credit_collected, 100.0);
        assert_eq!(s1.realized_pnl, 15.0);
    }

    #[test]
    fn partial_closes_contribute_to_realized() {
        let entries = vec![
            entry("2099-12-01", "p1", CapitalLedgerEventType::Open, 200.0),
            entry("2099-12-15", "p1", CapitalLedgerEventType::PartialClose, 30.0),
            entry("2099-12-25", "p1", CapitalLedgerEventType::Close, 40.0),
        ];
        let s = summarize_month(2099, 12, &entries);
        assert_eq!(s.total_credit_collected, 200.0);
        assert_eq!(s.realized_pnl, 70.0);
        assert_eq!(s.positions_closed, 1);
        assert_eq!(s.win_rate, 1.0);
    }

    #[test]
    fn empty_month_is_zeroes() {
        let s = summarize_month(2099, 1, &[]);
        assert_eq!(s.total_credit_collected, 0.0);
        assert_eq!(s.realized_pnl, 0.0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.avg_days_in_trade, 0.0);
        assert_eq!(s.max_drawdown, 0.0);
    }

    #[test]
    fn other_months_excluded() {
        let entries = vec![
            entry("2099-10-20", "p0", CapitalLedgerEventType::Open, 999.0),
            entry("2099-11-01", "p1", CapitalLedgerEventType::Open, 100.0),
        ];
        let s = summarize_month(2099, 11, &entries);
        assert_eq!(s.total_credit_collected, 100.0);
    }

    #[test]
    fn win_rate_and_days_in_trade() {
        let entries = vec![
            entry("2099-11-01", "w", CapitalLedgerEventType::Open, 100.0),
            entry("2099-11-11", "w", CapitalLedgerEventType::Close, 20.0),
            entry("2099-11-05", "l", CapitalLedgerEventType::Open, 100.0),
            entry("2099-11-25", "l", CapitalLedgerEventType::Close, -50.0),
        ];
        let s = summarize_month(2099, 11, &entries);
        assert_eq!(s.positions_closed, 2);
        assert_eq!(s.win_rate, 0.5);
        // (10 + 20) / 2 = 15 days.
        assert_eq!(s.avg_days_in_trade, 15.0);
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let entries = vec![
            entry("2099-11-02", "a", CapitalLedgerEventType::Close, 50.0),
            entry("2099-11-03", "b", CapitalLedgerEventType::Close, -80.0),
            entry("2099-11-04", "c", CapitalLedgerEventType::Close, 10.0),
        ];
        let s = summarize_month(2099, 11, &entries);
        // Peak 50, trough -30 -> drawdown 80.
        assert_eq!(s.max_drawdown, 80.0);
    }
}
