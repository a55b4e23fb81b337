// =============================================================================
// Decision Artifact Store (v2) — single writer, atomic replace
// =============================================================================
//
// One canonical artifact per run. Write pattern: serialize to a temp file
// adjacent to the target, fsync, rename to `decision_latest.json`. Readers
// open the final file only — a rename is atomic on POSIX, so they never see
// a partial artifact. `set_latest` is serialized by an exclusive lock; a
// copy of every run also lands under `evaluation_store/{run_id}.json`.
//
// Contract enforced at the writer: `artifact_version` is "v2" and every
// scored symbol row carries a band and a non-empty band_reason.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract_selector::LiquidityGrade;
use crate::drift_detector::SnapshotAssumption;
use crate::types::{Band, ChainSource, MarketPhase, ModeDecision, OptionType, RunMode, StockVerdict};

pub const ARTIFACT_VERSION: &str = "v2";
pub const LATEST_FILENAME: &str = "decision_latest.json";

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_version: String,
    pub run_id: String,
    pub pipeline_timestamp: String,
    pub market_phase: MarketPhase,
    /// "delayed" for provider data; "mock"/"scenario" for seeded runs.
    pub data_source: String,
    pub universe_size: usize,
    pub eligible_count: usize,
    pub freeze_hash: Option<String>,
    pub run_mode: RunMode,
    /// budget_stopped / deadline_exceeded markers, never fatal.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// One row per evaluated symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEvalSummary {
    pub symbol: String,
    pub verdict: StockVerdict,
    /// Verdict after Stage-2 + guardrails (e.g. "ELIGIBLE", "NO_TRADE").
    pub final_verdict: String,
    pub score: Option<f64>,
    pub band: Band,
    pub band_reason: String,
    pub primary_reason: Option<String>,
    pub stage_status: String,
    pub stage1_status: String,
    pub stage2_status: String,
    pub provider_status: String,
    pub evaluated_at: String,
    pub strategy: ModeDecision,
    pub price: Option<f64>,
    pub expiration: Option<NaiveDate>,
    pub has_candidates: bool,
    pub candidate_count: usize,
}

/// One actionable candidate surfaced by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCandidate {
    pub symbol: String,
    pub strategy: ModeDecision,
    pub option_right: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
    /// Sign-normalized delta (puts negative).
    pub delta: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mid: Option<f64>,
    pub iv: Option<f64>,
    pub open_interest: Option<i64>,
    pub spread_pct: Option<f64>,
    pub dte: i64,
    pub liquidity_grade: LiquidityGrade,
    pub underlying_price: Option<f64>,
    pub chain_source: ChainSource,
    pub suggested_contracts: u32,
    pub adjusted_contracts: u32,
    pub score: Option<f64>,
    pub band: Band,
}

/// The canonical per-run artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionArtifact {
    pub metadata: ArtifactMetadata,
    pub symbols: Vec<SymbolEvalSummary>,
    pub selected_candidates: Vec<SelectedCandidate>,
}

impl DecisionArtifact {
    /// Assumptions view for the drift detector.
    pub fn assumptions(&self) -> Vec<SnapshotAssumption> {
        self.selected_candidates
            .iter()
            .map(|c| SnapshotAssumption {
                symbol: c.symbol.clone(),
                strike: Some(c.strike),
                expiry: Some(c.expiry.format("%Y-%m-%d").to_string()),
                option_right: c.option_right,
                underlying_price: c.underlying_price,
                bid: c.bid,
                ask: c.ask,
                mid: c.mid,
                iv: c.iv,
            })
            .collect()
    }
}

/// Single-writer artifact store rooted at the output directory.
pub struct ArtifactStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            dir: output_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILENAME)
    }

    /// Validate and atomically publish the artifact, then append the run to
    /// the evaluation history.
    pub fn set_latest(&self, artifact: &DecisionArtifact) -> Result<PathBuf> {
        if artifact.metadata.artifact_version != ARTIFACT_VERSION {
            bail!(
                "refusing to write artifact_version {:?} (expected {:?})",
                artifact.metadata.artifact_version,
                ARTIFACT_VERSION
            );
        }
        for row in &artifact.symbols {
            if row.score.is_some() && row.band_reason.trim().is_empty() {
                bail!(
                    "symbol {} has a score but empty band_reason — artifact contract violated",
                    row.symbol
                );
            }
        }

        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let content =
            serde_json::to_string_pretty(artifact).context("failed to serialise artifact")?;

        // Temp file adjacent to the target so the rename stays on one
        // filesystem.
        let target = self.latest_path();
        let tmp = self.dir.join(format!("{LATEST_FILENAME}.tmp"));
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("failed to fsync {}", tmp.display()))?;
        }
        std::fs::rename(&tmp, &target)
            .with_context(|| format!("failed to rename {} into place", tmp.display()))?;

        // Historical copy, named by run id.
        let history_dir = self.dir.join("evaluation_store");
        std::fs::create_dir_all(&history_dir)
            .with_context(|| format!("failed to create {}", history_dir.display()))?;
        let history_path = history_dir.join(format!("{}.json", artifact.metadata.run_id));
        std::fs::write(&history_path, &content)
            .with_context(|| format!("failed to write {}", history_path.display()))?;

        info!(
            run_id = %artifact.metadata.run_id,
            symbols = artifact.symbols.len(),
            candidates = artifact.selected_candidates.len(),
            "decision artifact published"
        );
        Ok(target)
    }

    /// Read the current artifact. `None` when no run has published yet.
    pub fn get_latest(&self) -> Result<Option<DecisionArtifact>> {
        let path = self.latest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let artifact: DecisionArtifact = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(run_id = %artifact.metadata.run_id, "artifact loaded");
        Ok(Some(artifact))
    }

    /// Run ids present in the evaluation history, sorted ascending.
    pub fn history_run_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dir.join("evaluation_store")) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }
}
