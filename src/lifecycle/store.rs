// =============================================================================
// Position Store — one JSON file per position plus an open-positions index
// =============================================================================
//
// Layout under the output dir:
//   positions/{id}.json   — full position record
//   open_positions.json   — ids of positions not yet CLOSED
//
// The store is the exclusive writer for the positions kind; writes are
// serialized by an internal lock and land via tmp + rename. Legacy records
// (a `status`/`state` string instead of `lifecycle_state`) are mapped to a
// lifecycle state exactly once on load; unknown values become OPEN.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::state_machine::{map_legacy_state, LifecycleState, Position};

pub struct PositionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl PositionStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            dir: output_dir.join("positions"),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("open_positions.json")
    }

    /// Persist one position and refresh the open index.
    pub fn save(&self, position: &Position) -> Result<()> {
        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.path_for(&position.id);
        let tmp = path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(position).context("failed to serialise position")?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {}", tmp.display()))?;

        self.rebuild_index()?;
        info!(position_id = %position.id, state = %position.lifecycle_state, "position saved");
        Ok(())
    }

    /// Load one position by id, applying the legacy-state shim.
    pub fn load(&self, id: &str) -> Option<Position> {
        let content = std::fs::read_to_string(self.path_for(id)).ok()?;
        let value: Value = serde_json::from_str(&content).ok()?;
        match position_from_value(value) {
            Some(p) => Some(p),
            None => {
                warn!(position_id = id, "position record unparseable");
                None
            }
        }
    }

    /// Load every position that is not CLOSED.
    pub fn load_open(&self) -> Vec<Position> {
        self.load_all()
            .into_iter()
            .filter(|p| p.lifecycle_state != LifecycleState::Closed)
            .collect()
    }

    /// Load every persisted position.
    pub fn load_all(&self) -> Vec<Position> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut positions: Vec<Position> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                if !name.ends_with(".json") || name == "open_positions.json" {
                    return None;
                }
                self.load(name.trim_end_matches(".json"))
            })
            .collect();
        positions.sort_by(|a, b| a.id.cmp(&b.id));
        positions
    }

    fn rebuild_index(&self) -> Result<()> {
        let open_ids: Vec<String> = self
            .load_all()
            .into_iter()
            .filter(|p| p.lifecycle_state != LifecycleState::Closed)
            .map(|p| p.id)
            .collect();

        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&open_ids)
            .context("failed to serialise open-positions index")?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {}", tmp.display()))?;

        debug!(open = open_ids.len(), "open-positions index rebuilt");
        Ok(())
    }
}

/// Map a raw record to a `Position`, shimming legacy state fields. The shim
/// runs once here — persisted records are rewritten in the new shape on the
/// next save.
fn position_from_value(mut value: Value) -> Option<Position> {
    let obj = value.as_object_mut()?;

    let current = obj
        .get("lifecycle_state")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match current {
        Some(raw) => {
            // Unknown stored value (old enum variant) maps through the shim.
            if serde_json::from_value::<LifecycleState>(json!(raw)).is_err() {
                obj.insert("lifecycle_state".to_string(), json!(map_legacy_state(&raw)));
            }
        }
        None => {
            let legacy = obj
                .get("state")
                .or_else(|| obj.get("status"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            obj.insert(
                "lifecycle_state".to_string(),
                json!(map_legacy_state(legacy)),
            );
        }
    }

    serde_json::from_value(value).ok()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state_machine::PositionType;
    use chrono::NaiveDate;

    fn position(id: &str, state: LifecycleState) -> Position {
        Position {
            id: id.to_string(),
            symbol: "SPY".to_string(),
            position_type: PositionType::Csp,
            strike: Some(450.0),
            expiry: NaiveDate::from_ymd_opt(2026, 3, 20),
            contracts: 1,
            premium_collected: 250.0,
            entry_date: NaiveDate::from_ymd_opt(2026, 2, 1),
            lifecycle_state: state,
            state_history: Vec::new(),
            exit_plan: None,
            realized_pnl: 0.0,
            notes: String::new(),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let pos = position("pos-1", LifecycleState::Open);
        store.save(&pos).unwrap();

        let loaded = store.load("pos-1").unwrap();
        assert_eq!(loaded.id, "pos-1");
        assert_eq!(loaded.lifecycle_state, LifecycleState::Open);
    }

    #[test]
    fn open_index_excludes_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        store.save(&position("a", LifecycleState::Open)).unwrap();
        store.save(&position("b", LifecycleState::Closed)).unwrap();

        let open = store.load_open();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "a");

        let index: Vec<String> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("positions/open_positions.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(index, vec!["a".to_string()]);
    }

    #[test]
    fn legacy_status_field_maps_once_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("positions")).unwrap();

        // Legacy record: `status` string, no lifecycle_state.
        let legacy = json!({
            "id": "legacy-1",
            "symbol": "NVDA",
            "position_type": "CSP",
            "strike": 150.0,
            "expiry": "2026-03-20",
            "contracts": 2,
            "premium_collected": 500.0,
            "entry_date": "2026-02-01",
            "status": "ROLL_CANDIDATE"
        });
        std::fs::write(
            dir.path().join("positions/legacy-1.json"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .unwrap();

        let loaded = store.load("legacy-1").unwrap();
        // Unknown legacy state maps to the safe default.
        assert_eq!(loaded.lifecycle_state, LifecycleState::Open);
        assert!(loaded.state_history.is_empty());
    }

    #[test]
    fn legacy_known_state_preserved() {
        let value = json!({
            "id": "x",
            "symbol": "SPY",
            "position_type": "CC",
            "strike": null,
            "expiry": null,
            "contracts": 1,
            "premium_collected": 100.0,
            "entry_date": null,
            "state": "closed"
        });
        let pos = position_from_value(value).unwrap();
        assert_eq!(pos.lifecycle_state, LifecycleState::Closed);
    }

    #[test]
    fn unknown_enum_variant_in_new_field_shims_to_open() {
        let value = json!({
            "id": "x",
            "symbol": "SPY",
            "position_type": "CSP",
            "strike": null,
            "expiry": null,
            "contracts": 1,
            "premium_collected": 100.0,
            "entry_date": null,
            "lifecycle_state": "HOLD"
        });
        let pos = position_from_value(value).unwrap();
        assert_eq!(pos.lifecycle_state, LifecycleState::Open);
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        assert!(store.load("nope").is_none());
    }
}
