// =============================================================================
// Freeze Guard — config-drift protection for non-DRY_RUN modes
// =============================================================================
//
// Hashes a canonical snapshot of the critical configs (volatility,
// eligibility gates, scoring weights, selection caps, portfolio limits). On
// startup in PAPER_LIVE/LIVE the hash is compared with the last recorded
// run; a mismatch blocks execution and reports the changed top-level keys.
// DRY_RUN is always allowed and never records freeze state.
//
// Canonical form: serde_json with map keys sorted (the default Map is
// BTreeMap-backed) and no whitespace — identical snapshots always hash
// identically.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::runtime_config::EngineConfig;
use crate::types::RunMode;

/// Result of a freeze check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeResult {
    pub allowed: bool,
    pub message: String,
    pub changed_keys: Vec<String>,
    pub config_frozen: bool,
}

/// Persisted freeze state (`freeze_state.json` in the output dir).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeState {
    pub config_hash: String,
    /// Canonical JSON of the snapshot, kept for changed-key diffs.
    pub config_snapshot: String,
    pub run_mode: String,
}

/// Build the canonical snapshot of critical configs. Only sections that can
/// change a trade decision belong here — cadence, output paths, and universe
/// membership are operational and excluded.
pub fn build_critical_snapshot(config: &EngineConfig) -> Value {
    json!({
        "volatility": config.volatility,
        "eligibility": config.eligibility,
        "scoring": config.scoring,
        "selection": config.selection,
        "portfolio": config.portfolio,
    })
}

/// Serialize to deterministic JSON (sorted keys, no whitespace).
fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Deterministic SHA-256 hex of a snapshot.
pub fn hash_snapshot(snapshot: &Value) -> String {
    let payload = canonical_json(snapshot);
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)
}

/// Top-level keys whose canonical value differs (added/removed/changed).
fn changed_keys(current: &Value, previous: &Value) -> Vec<String> {
    let empty = serde_json::Map::new();
    let cur = current.as_object().unwrap_or(&empty);
    let prev = previous.as_object().unwrap_or(&empty);

    let mut keys: Vec<String> = cur.keys().chain(prev.keys()).cloned().collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|k| {
            let c = cur.get(k).map(canonical_json).unwrap_or_default();
            let p = prev.get(k).map(canonical_json).unwrap_or_default();
            c != p
        })
        .collect()
}

fn state_path(output_dir: &Path) -> PathBuf {
    output_dir.join("freeze_state.json")
}

/// Load the persisted freeze state, if any.
pub fn load_state(output_dir: &Path) -> Option<FreezeState> {
    let content = std::fs::read_to_string(state_path(output_dir)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Compare the current critical config against the recorded state.
///
/// DRY_RUN: always allowed, nothing frozen. Otherwise: first run freezes the
/// config; an identical hash passes; a mismatch blocks with changed keys.
pub fn check_freeze(config: &EngineConfig, run_mode: RunMode, output_dir: &Path) -> FreezeResult {
    if run_mode == RunMode::DryRun {
        return FreezeResult {
            allowed: true,
            message: "DRY_RUN: config freeze not enforced.".to_string(),
            changed_keys: Vec::new(),
            config_frozen: false,
        };
    }

    let snapshot = build_critical_snapshot(config);
    let current_hash = hash_snapshot(&snapshot);

    let Some(state) = load_state(output_dir) else {
        return FreezeResult {
            allowed: true,
            message: "First run with freeze: config frozen for subsequent runs.".to_string(),
            changed_keys: Vec::new(),
            config_frozen: true,
        };
    };

    if current_hash == state.config_hash {
        debug!(hash = %&current_hash[..16], "freeze check passed");
        return FreezeResult {
            allowed: true,
            message: "Config unchanged; execution allowed.".to_string(),
            changed_keys: Vec::new(),
            config_frozen: true,
        };
    }

    let previous: Value = serde_json::from_str(&state.config_snapshot).unwrap_or(Value::Null);
    let changed = changed_keys(&snapshot, &previous);

    warn!(changed = ?changed, "freeze check BLOCKED: config drifted since last run");
    FreezeResult {
        allowed: false,
        message: format!(
            "Config changed since last run. Execution blocked. Revert config or run with \
             RUN_MODE=DRY_RUN to allow. Changed keys: {}.",
            changed.join(", ")
        ),
        changed_keys: changed,
        config_frozen: false,
    }
}

/// Persist the freeze state after a successful non-DRY_RUN run. DRY_RUN
/// never records.
pub fn record_run(config: &EngineConfig, run_mode: RunMode, output_dir: &Path) -> Result<()> {
    if run_mode == RunMode::DryRun {
        return Ok(());
    }

    let snapshot = build_critical_snapshot(config);
    let state = FreezeState {
        config_hash: hash_snapshot(&snapshot),
        config_snapshot: canonical_json(&snapshot),
        run_mode: run_mode.to_string(),
    };

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = state_path(output_dir);
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(&state).context("failed to serialise freeze state")?;
    std::fs::write(&tmp, content)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to rename {}", tmp.display()))?;

    info!(hash = %&state.config_hash[..16], run_mode = %run_mode, "freeze state recorded");
    Ok(())
}
