// =============================================================================
// Central Application State — WheelOps engine
// =============================================================================
//
// The single source of truth shared by the scheduler loop and the HTTP
// surface. Subsystems with their own interior mutability (artifact store,
// position store, ledger) are held behind `Arc`; run bookkeeping lives in
// `parking_lot::RwLock`s here.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::artifact_store::ArtifactStore;
use crate::capital_ledger::CapitalLedger;
use crate::drift_detector::DriftStatus;
use crate::lifecycle::{PositionEvaluation, PositionStore};
use crate::pipeline::RunOutcome;
use crate::runtime_config::EngineConfig;

/// Operational status surfaced on `/api/ops/status` and `/api/market-status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OpsStatus {
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
    pub cadence_minutes: u64,
    pub last_run_reason: Option<String>,
    pub symbols_evaluated: usize,
    pub trades_found: usize,
    /// primary_reason -> count over the last run.
    pub blockers_summary: BTreeMap<String, usize>,
    pub last_market_check: Option<String>,
    pub last_evaluated_at: Option<String>,
    pub evaluation_attempted: bool,
    pub evaluation_emitted: bool,
    pub skip_reason: Option<String>,
}

/// One operator-triggered evaluation job.
#[derive(Debug, Clone, Serialize)]
pub struct EvalJob {
    pub id: String,
    /// "queued" | "running" | "done" | "failed".
    pub state: String,
    pub requested_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

/// Shared engine state.
pub struct AppState {
    pub config: RwLock<EngineConfig>,
    pub artifact_store: Arc<ArtifactStore>,
    pub position_store: Arc<PositionStore>,
    pub capital_ledger: Arc<CapitalLedger>,
    pub ops: RwLock<OpsStatus>,
    pub eval_jobs: RwLock<HashMap<String, EvalJob>>,
    pub last_drift: RwLock<Option<DriftStatus>>,
    pub last_position_evaluations: RwLock<Vec<PositionEvaluation>>,
    pub last_manual_eval: RwLock<Option<Instant>>,
    /// Raised to invalidate the in-flight run (no artifact is written).
    pub cancel_flag: Arc<AtomicBool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        let output_dir = config.output_dir.clone();
        let cadence = config.cadence_minutes;
        Self {
            config: RwLock::new(config),
            artifact_store: Arc::new(ArtifactStore::new(&output_dir)),
            position_store: Arc::new(PositionStore::new(&output_dir)),
            capital_ledger: Arc::new(CapitalLedger::new(&output_dir)),
            ops: RwLock::new(OpsStatus {
                cadence_minutes: cadence,
                ..OpsStatus::default()
            }),
            eval_jobs: RwLock::new(HashMap::new()),
            last_drift: RwLock::new(None),
            last_position_evaluations: RwLock::new(Vec::new()),
            last_manual_eval: RwLock::new(None),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    /// Record bookkeeping after a completed run.
    pub fn record_run_outcome(&self, outcome: &RunOutcome, reason: &str) {
        let now = Utc::now().to_rfc3339();
        let mut ops = self.ops.write();
        ops.last_run_at = Some(now.clone());
        ops.last_evaluated_at = Some(now.clone());
        ops.last_market_check = Some(now);
        ops.last_run_reason = Some(reason.to_string());
        ops.symbols_evaluated = outcome.artifact.symbols.len();
        ops.trades_found = outcome.artifact.selected_candidates.len();
        ops.evaluation_attempted = true;
        ops.evaluation_emitted = true;
        ops.skip_reason = None;

        let mut blockers: BTreeMap<String, usize> = BTreeMap::new();
        for row in &outcome.artifact.symbols {
            if let Some(reason) = &row.primary_reason {
                *blockers.entry(reason.clone()).or_insert(0) += 1;
            }
        }
        ops.blockers_summary = blockers;

        let cadence = ops.cadence_minutes;
        ops.next_run_at = Some(
            (Utc::now() + chrono::Duration::minutes(cadence as i64)).to_rfc3339(),
        );
        drop(ops);

        *self.last_drift.write() = outcome.drift.clone();
        *self.last_position_evaluations.write() = outcome.position_evaluations.clone();
    }

    /// Record a run that was attempted but produced no artifact.
    pub fn record_run_skipped(&self, reason: &str) {
        let mut ops = self.ops.write();
        ops.evaluation_attempted = true;
        ops.evaluation_emitted = false;
        ops.skip_reason = Some(reason.to_string());
        ops.last_market_check = Some(Utc::now().to_rfc3339());
    }

    /// Accept an operator-triggered evaluation unless inside the cooldown.
    /// Returns the job id, or the seconds remaining on the cooldown.
    pub fn try_accept_manual_eval(&self) -> Result<String, u64> {
        let cooldown_secs = self.config.read().cooldown_secs;
        let mut last = self.last_manual_eval.write();
        if let Some(at) = *last {
            let elapsed = at.elapsed().as_secs();
            if elapsed < cooldown_secs {
                return Err(cooldown_secs - elapsed);
            }
        }
        *last = Some(Instant::now());

        let id = format!("job-{}", uuid::Uuid::new_v4());
        self.eval_jobs.write().insert(
            id.clone(),
            EvalJob {
                id: id.clone(),
                state: "queued".to_string(),
                requested_at: Utc::now().to_rfc3339(),
                finished_at: None,
                error: None,
            },
        );
        Ok(id)
    }

    /// Update a job's state; unknown ids are ignored.
    pub fn set_job_state(&self, job_id: &str, state: &str, error: Option<String>) {
        let mut jobs = self.eval_jobs.write();
        if let Some(job) = jobs.get_mut(job_id) {
            job.state = state.to_string();
            job.error = error;
            if state == "done" || state == "failed" {
                job.finished_at = Some(Utc::now().to_rfc3339());
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::{ArtifactMetadata, DecisionArtifact, ARTIFACT_VERSION};
    use crate::types::{MarketPhase, RunMode};

    fn state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.output_dir = dir.path().to_path_buf();
        config.cooldown_secs = 60;
        // Leak the tempdir so the state outlives it within the test.
        std::mem::forget(dir);
        AppState::new(config)
    }

    fn outcome() -> RunOutcome {
        RunOutcome {
            artifact: DecisionArtifact {
                metadata: ArtifactMetadata {
                    artifact_version: ARTIFACT_VERSION.to_string(),
                    run_id: "run-x".to_string(),
                    pipeline_timestamp: Utc::now().to_rfc3339(),
                    market_phase: MarketPhase::Mid,
                    data_source: "delayed".to_string(),
                    universe_size: 0,
                    eligible_count: 0,
                    freeze_hash: None,
                    run_mode: RunMode::DryRun,
                    warnings: Vec::new(),
                },
                symbols: Vec::new(),
                selected_candidates: Vec::new(),
            },
            budget_stopped: false,
            deadline_exceeded: false,
            drift: None,
            position_evaluations: Vec::new(),
        }
    }

    #[test]
    fn run_outcome_updates_ops() {
        let s = state();
        s.record_run_outcome(&outcome(), "scheduled");
        let ops = s.ops.read();
        assert!(ops.last_run_at.is_some());
        assert!(ops.next_run_at.is_some());
        assert_eq!(ops.last_run_reason.as_deref(), Some("scheduled"));
        assert!(ops.evaluation_emitted);
    }

    #[test]
    fn skipped_run_records_reason() {
        let s = state();
        s.record_run_skipped("market closed");
        let ops = s.ops.read();
        assert!(ops.evaluation_attempted);
        assert!(!ops.evaluation_emitted);
        assert_eq!(ops.skip_reason.as_deref(), Some("market closed"));
    }

    #[test]
    fn manual_eval_cooldown() {
        let s = state();
        let first = s.try_accept_manual_eval();
        assert!(first.is_ok());
        // Immediately again: inside cooldown.
        let second = s.try_accept_manual_eval();
        let remaining = second.unwrap_err();
        assert!(remaining > 0 && remaining <= 60);
    }

    #[test]
    fn job_state_transitions() {
        let s = state();
        let id = s.try_accept_manual_eval().unwrap();
        s.set_job_state(&id, "running", None);
        assert_eq!(s.eval_jobs.read().get(&id).unwrap().state, "running");
        s.set_job_state(&id, "done", None);
        let jobs = s.eval_jobs.read();
        let job = jobs.get(&id).unwrap();
        assert_eq!(job.state, "done");
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn unknown_job_update_is_ignored() {
        let s = state();
        s.set_job_state("nope", "done", None);
        assert!(s.eval_jobs.read().is_empty());
    }
}
