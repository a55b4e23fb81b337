// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only against the core stores; the only write path is the operator
// evaluate trigger (which spawns a pipeline run). Domain failures return 200
// with a payload status — never a 500 for an unknown symbol or job id.
//
// CORS is permissive for development; tighten `allowed_origins` in
// production.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::artifact_store::ARTIFACT_VERSION;
use crate::pipeline::EvaluationPipeline;
use crate::reason_codes::format_reason_for_display;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── UI surface ──────────────────────────────────────────────
        .route("/api/ui/decision/latest", get(decision_latest))
        .route("/api/ui/universe", get(universe))
        .route("/api/ui/symbol-diagnostics", get(symbol_diagnostics))
        // ── Market / ops ────────────────────────────────────────────
        .route("/api/market-status", get(market_status))
        .route("/api/ops/status", get(ops_status))
        .route("/api/ops/evaluate", post(trigger_evaluate))
        .route("/api/ops/evaluate/:job_id", get(evaluate_job))
        .route("/api/ops/drift", get(ops_drift))
        // ── Portfolio ───────────────────────────────────────────────
        .route("/api/positions", get(positions))
        .route("/api/portfolio/monthly", get(portfolio_monthly))
        // ── Diagnostics ─────────────────────────────────────────────
        .route("/api/eval/latest-run", get(latest_run))
        .route("/api/eval/symbol/:symbol", get(eval_symbol))
        .route("/api/system/health", get(system_health))
        // ── Middleware & state ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// UI surface
// =============================================================================

/// `GET /api/ui/decision/latest?mode={LIVE|MOCK}` — the raw artifact.
///
/// LIVE mode refuses artifacts sourced from mock/scenario data (400); that
/// combination means a seeded artifact leaked into a live deployment.
async fn decision_latest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params
        .get("mode")
        .map(|m| m.to_uppercase())
        .unwrap_or_else(|| "LIVE".to_string());

    match state.artifact_store.get_latest() {
        Ok(Some(artifact)) => {
            let source = artifact.metadata.data_source.to_lowercase();
            if mode == "LIVE" && (source == "mock" || source == "scenario") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": format!("artifact data_source '{source}' not allowed in LIVE mode"),
                    })),
                )
                    .into_response();
            }
            Json(artifact).into_response()
        }
        Ok(None) => Json(json!({ "artifact": null, "error": "no run yet" })).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read artifact");
            Json(json!({ "artifact": null, "error": e.to_string() })).into_response()
        }
    }
}

/// `GET /api/ui/universe` — one row per evaluated symbol. Band is never null.
async fn universe(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let artifact = state.artifact_store.get_latest().ok().flatten();

    let (symbols, updated_at) = match &artifact {
        Some(a) => {
            let rows: Vec<serde_json::Value> = a
                .symbols
                .iter()
                .map(|row| {
                    json!({
                        "symbol": row.symbol,
                        "verdict": row.verdict,
                        "final_verdict": row.final_verdict,
                        "score": row.score,
                        "band": row.band,
                        "band_reason": row.band_reason,
                        "primary_reason": row.primary_reason,
                        "primary_reason_display":
                            format_reason_for_display(row.primary_reason.as_deref()),
                        "strategy": row.strategy,
                        "price": row.price,
                        "has_candidates": row.has_candidates,
                        "candidate_count": row.candidate_count,
                    })
                })
                .collect();
            (rows, Some(a.metadata.pipeline_timestamp.clone()))
        }
        None => (Vec::new(), None),
    };

    Json(json!({
        "symbols": symbols,
        "updated_at": updated_at,
        "error": null,
    }))
}

/// `GET /api/ui/symbol-diagnostics?symbol=X` — 200 always. Unknown symbols
/// come back OUT_OF_SCOPE with a NOT_IN_UNIVERSE blocker, never a 500.
async fn symbol_diagnostics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let symbol = params
        .get("symbol")
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();

    let in_universe = state
        .config
        .read()
        .universe
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&symbol));

    if symbol.is_empty() || !in_universe {
        return Json(json!({
            "symbol": symbol,
            "status": "OUT_OF_SCOPE",
            "blockers": [{
                "code": "NOT_IN_UNIVERSE",
                "message": "Symbol is not part of the configured universe",
            }],
        }));
    }

    let row = state
        .artifact_store
        .get_latest()
        .ok()
        .flatten()
        .and_then(|a| a.symbols.into_iter().find(|r| r.symbol == symbol));

    match row {
        Some(row) => Json(json!({
            "symbol": symbol,
            "status": "EVALUATED",
            "row": row,
            "primary_reason_display": format_reason_for_display(row.primary_reason.as_deref()),
            "blockers": [],
        })),
        None => Json(json!({
            "symbol": symbol,
            "status": "NOT_EVALUATED",
            "blockers": [{
                "code": "NO_RUN_DATA",
                "message": "No evaluation run has covered this symbol yet",
            }],
        })),
    }
}

// =============================================================================
// Market / ops
// =============================================================================

async fn market_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let phase = crate::market_calendar::market_phase(chrono::Utc::now());
    let ops = state.ops.read();
    Json(json!({
        "market_phase": phase,
        "last_market_check": ops.last_market_check,
        "last_evaluated_at": ops.last_evaluated_at,
        "evaluation_attempted": ops.evaluation_attempted,
        "evaluation_emitted": ops.evaluation_emitted,
        "skip_reason": ops.skip_reason,
    }))
}

async fn ops_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ops = state.ops.read().clone();
    Json(json!({
        "last_run_at": ops.last_run_at,
        "next_run_at": ops.next_run_at,
        "cadence_minutes": ops.cadence_minutes,
        "last_run_reason": ops.last_run_reason,
        "symbols_evaluated": ops.symbols_evaluated,
        "trades_found": ops.trades_found,
        "blockers_summary": ops.blockers_summary,
    }))
}

/// `POST /api/ops/evaluate` — accept unless inside the cooldown; the run
/// itself happens on a background task.
async fn trigger_evaluate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.try_accept_manual_eval() {
        Ok(job_id) => {
            spawn_evaluation(Arc::clone(&state), job_id.clone(), "operator");
            Json(json!({ "accepted": true, "job_id": job_id }))
        }
        Err(remaining) => Json(json!({
            "accepted": false,
            "cooldown_seconds_remaining": remaining,
        })),
    }
}

/// `GET /api/ops/evaluate/{job_id}` — unknown ids are 200 not_found.
async fn evaluate_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.eval_jobs.read().get(&job_id) {
        Some(job) => Json(json!(job)),
        None => Json(json!({ "state": "not_found" })),
    }
}

/// Run the pipeline on a background task, tracking job state.
pub fn spawn_evaluation(state: Arc<AppState>, job_id: String, reason: &'static str) {
    tokio::spawn(async move {
        state.set_job_state(&job_id, "running", None);
        let config = state.config.read().clone();
        let pipeline = EvaluationPipeline::new(
            config,
            Arc::clone(&state.artifact_store),
            Arc::clone(&state.position_store),
            Arc::clone(&state.cancel_flag),
        );
        match pipeline.run().await {
            Ok(outcome) => {
                state.record_run_outcome(&outcome, reason);
                state.set_job_state(&job_id, "done", None);
                info!(job_id = %job_id, "operator evaluation finished");
            }
            Err(e) => {
                state.record_run_skipped(&e.to_string());
                state.set_job_state(&job_id, "failed", Some(e.to_string()));
                error!(job_id = %job_id, error = %e, "operator evaluation failed");
            }
        }
    });
}

/// `GET /api/ops/drift` — drift findings from the last completed run.
async fn ops_drift(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.last_drift.read().clone() {
        Some(status) => {
            let max = crate::drift_detector::drift_status_max_severity(&status);
            Json(json!({ "drift": status, "max_severity": max }))
        }
        None => Json(json!({ "drift": null, "max_severity": null })),
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// `GET /api/positions` — open positions plus their latest evaluations.
async fn positions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let open = state.position_store.load_open();
    let evaluations = state.last_position_evaluations.read().clone();
    Json(json!({
        "open": open,
        "evaluations": evaluations,
    }))
}

/// `GET /api/portfolio/monthly?year=YYYY&month=M` — deterministic ledger
/// roll-up. Defaults to the current month.
async fn portfolio_monthly(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let now = chrono::Utc::now().date_naive();
    let year = params
        .get("year")
        .and_then(|y| y.parse().ok())
        .unwrap_or_else(|| chrono::Datelike::year(&now));
    let month = params
        .get("month")
        .and_then(|m| m.parse().ok())
        .unwrap_or_else(|| chrono::Datelike::month(&now));

    let entries = state.capital_ledger.entries();
    let summary = crate::capital_ledger::summarize_month(year, month, &entries);
    Json(json!(summary))
}

// =============================================================================
// Diagnostics
// =============================================================================

async fn latest_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.artifact_store.get_latest() {
        Ok(Some(a)) => Json(json!({
            "metadata": a.metadata,
            "symbol_count": a.symbols.len(),
            "candidate_count": a.selected_candidates.len(),
            "history": state.artifact_store.history_run_ids(),
        })),
        _ => Json(json!({ "metadata": null, "history": state.artifact_store.history_run_ids() })),
    }
}

async fn eval_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = symbol.trim().to_uppercase();
    let artifact = state.artifact_store.get_latest().ok().flatten();
    let row = artifact
        .as_ref()
        .and_then(|a| a.symbols.iter().find(|r| r.symbol == symbol).cloned());
    let candidates: Vec<_> = artifact
        .map(|a| {
            a.selected_candidates
                .into_iter()
                .filter(|c| c.symbol == symbol)
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "symbol": symbol,
        "row": row,
        "candidates": candidates,
    }))
}

/// `GET /api/system/health` — CRITICAL when the persisted artifact is not
/// the v2 schema.
async fn system_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, artifact_version) = match state.artifact_store.get_latest() {
        Ok(Some(a)) if a.metadata.artifact_version == ARTIFACT_VERSION => {
            ("OK".to_string(), Some(a.metadata.artifact_version))
        }
        Ok(Some(a)) => ("CRITICAL".to_string(), Some(a.metadata.artifact_version)),
        Ok(None) => ("WARN".to_string(), None),
        Err(_) => ("CRITICAL".to_string(), None),
    };

    let uptime_secs = state.start_time.elapsed().as_secs();
    Json(json!({
        "status": status,
        "artifact_version": artifact_version,
        "expected_version": ARTIFACT_VERSION,
        "uptime_secs": uptime_secs,
    }))
}
