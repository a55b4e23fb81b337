// =============================================================================
// WheelOps Evaluation Engine — Main Entry Point
// =============================================================================
//
// The engine starts in DRY_RUN mode unless the config says otherwise; LIVE
// and PAPER_LIVE runs are freeze-guarded. The process hosts two things: the
// scheduler loop (one evaluation run per cadence tick) and the read-only
// HTTP surface.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod artifact_store;
mod capital_ledger;
mod contract_selector;
mod data_dependencies;
mod data_quality;
mod drift_detector;
mod eligibility;
mod freeze_guard;
mod guardrails;
mod indicators;
mod lifecycle;
mod market_calendar;
mod market_data;
mod pipeline;
mod providers;
mod quality_gates;
mod reason_codes;
mod regime;
mod runtime_config;
mod scoring;
mod snapshot;
mod stage1;
mod swing_cluster;
mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_calendar::market_phase;
use crate::pipeline::EvaluationPipeline;
use crate::runtime_config::EngineConfig;
use crate::types::MarketPhase;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("WheelOps evaluation engine starting up");

    let config_path =
        std::env::var("WHEELOPS_CONFIG").unwrap_or_else(|_| "engine_config.json".to_string());
    let mut config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        EngineConfig::default()
    });

    // Override the universe from env if provided.
    if let Ok(syms) = std::env::var("WHEELOPS_UNIVERSE") {
        let universe: Vec<String> = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !universe.is_empty() {
            config.universe = universe;
        }
    }

    info!(
        universe = ?config.universe,
        run_mode = %config.run_mode,
        output_dir = %config.output_dir.display(),
        "engine configured"
    );

    // ── 2. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Scheduler loop ────────────────────────────────────────────────
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let cadence = state.config.read().cadence_minutes.max(1);
            let mut ticker =
                tokio::time::interval(tokio::time::Duration::from_secs(cadence * 60));
            loop {
                ticker.tick().await;

                let phase = market_phase(chrono::Utc::now());
                let force = std::env::var("WHEELOPS_FORCE_EVAL").is_ok();
                if phase == MarketPhase::Closed && !force {
                    state.record_run_skipped("market closed");
                    continue;
                }

                let config = state.config.read().clone();
                let pipeline = EvaluationPipeline::new(
                    config,
                    Arc::clone(&state.artifact_store),
                    Arc::clone(&state.position_store),
                    Arc::clone(&state.cancel_flag),
                );
                match pipeline.run().await {
                    Ok(outcome) => state.record_run_outcome(&outcome, "scheduled"),
                    Err(e) => {
                        warn!(error = %e, "scheduled evaluation failed");
                        state.record_run_skipped(&e.to_string());
                    }
                }
            }
        });
    }

    // ── 4. HTTP surface ──────────────────────────────────────────────────
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP surface listening");

    axum::serve(listener, api::rest::router(state)).await?;
    Ok(())
}
