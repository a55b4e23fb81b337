// =============================================================================
// Evaluation Pipeline — one synchronous run over the universe
// =============================================================================
//
// Staged order inside a symbol (never parallel within a symbol):
//   Snapshot -> dependency check -> Stage-1 -> eligibility -> Stage-2 ->
//   quality gates -> scoring/banding.
// Across symbols there is no ordering: evaluations run on a bounded worker
// pool and results merge into the artifact under the store's writer lock.
// Guardrails run after the join — they need the whole portfolio.
//
// Resource discipline:
//   - HTTP request budget: a symbol is only scheduled while budget remains;
//     exhaustion sets a `budget_stopped` warning and the run continues with
//     partial symbols.
//   - Global deadline: symbols not started before the deadline are dropped
//     and `deadline_exceeded` is set. In-flight work completes.
//   - Explicit cancel invalidates the run — no artifact is written.
//
// Config is captured once at construction; mid-run edits are invisible.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Utc;
use futures_util::{stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact_store::{
    ArtifactMetadata, ArtifactStore, DecisionArtifact, SelectedCandidate, SymbolEvalSummary,
    ARTIFACT_VERSION,
};
use crate::contract_selector::{
    build_eligibility_layers, select_contracts, ContractEligibilityStatus, Stage2Result,
};
use crate::data_dependencies::{check_dependencies, DependencyReport};
use crate::drift_detector::{detect_drift, DriftStatus, LiveMarketData};
use crate::eligibility::{run_eligibility, EligibilityTrace};
use crate::freeze_guard;
use crate::guardrails::{
    apply_guardrails, CandidateSizing, ClusterRisk, PortfolioRegime, PortfolioState,
};
use crate::lifecycle::{
    apply_transition, evaluate_position, ExitPlan, ExitSignal, LifecycleAction, LifecycleState,
    Position, PositionEvaluation, PositionStore, PositionType,
};
use crate::market_calendar::market_phase;
use crate::providers::build_http_client;
use crate::providers::chain::ChainClient;
use crate::providers::core_stats::CoreStatsClient;
use crate::providers::dailies::DailiesClient;
use crate::providers::equity_quote::EquityQuoteClient;
use crate::quality_gates::{evaluate_universe_quality, ChainLiquidity, GateOutcome};
use crate::regime::{compute_market_regime, save_market_regime, MarketRegime};
use crate::runtime_config::EngineConfig;
use crate::scoring::{assign_band, compute_score};
use crate::snapshot::{SnapshotBuildResult, SnapshotService};
use crate::stage1::{qualify, Stage1Result};
use crate::types::{ChainSource, ModeDecision, StockVerdict};

/// Result of one evaluation run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub artifact: DecisionArtifact,
    pub budget_stopped: bool,
    pub deadline_exceeded: bool,
    /// Prior artifact vs this run's quotes.
    pub drift: Option<DriftStatus>,
    /// Per-open-position evaluator output for this cycle.
    pub position_evaluations: Vec<PositionEvaluation>,
}

/// Everything produced for one symbol before guardrails.
struct SymbolEvaluation {
    row: SymbolEvalSummary,
    candidates: Vec<SelectedCandidate>,
    spot: Option<f64>,
}

pub struct EvaluationPipeline {
    config: EngineConfig,
    snapshot_service: Arc<SnapshotService>,
    chain_client: Arc<ChainClient>,
    artifact_store: Arc<ArtifactStore>,
    position_store: Arc<PositionStore>,
    cancel: Arc<AtomicBool>,
}

impl EvaluationPipeline {
    pub fn new(
        config: EngineConfig,
        artifact_store: Arc<ArtifactStore>,
        position_store: Arc<PositionStore>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let http = build_http_client(config.provider.timeout_secs);
        let base = config.provider.base_url.clone();
        let out = &config.output_dir;

        let snapshot_service = Arc::new(SnapshotService {
            quote_client: EquityQuoteClient::new(http.clone(), base.clone(), out.join("quotes_cache")),
            core_client: CoreStatsClient::new(http.clone(), base.clone(), out.join("cores_cache")),
            dailies_client: DailiesClient::new(http.clone(), base.clone(), out.join("candles_cache")),
        });
        let chain_client = Arc::new(ChainClient::new(http, base));

        Self {
            config,
            snapshot_service,
            chain_client,
            artifact_store,
            position_store,
            cancel,
        }
    }

    /// Execute one full evaluation run and publish the artifact.
    pub async fn run(&self) -> Result<RunOutcome> {
        let run_mode = self.config.run_mode;
        let run_id = format!("run-{}", Uuid::new_v4());
        let started = Instant::now();
        info!(run_id = %run_id, run_mode = %run_mode, universe = self.config.universe.len(), "evaluation run starting");

        // --- Freeze guard (pipeline-level; aborts without artifact) -------
        if self.config.freeze_guard_enabled {
            let freeze = freeze_guard::check_freeze(&self.config, run_mode, &self.config.output_dir);
            if !freeze.allowed {
                bail!("freeze guard blocked run: {}", freeze.message);
            }
        }

        // --- Market regime (index-level) ----------------------------------
        let index_candles = self
            .snapshot_service
            .dailies_client
            .fetch_dailies(&self.config.index_symbol, 400)
            .await;
        let now_iso = Utc::now().to_rfc3339();
        let market_state = compute_market_regime(&index_candles, &now_iso);
        if let Some(state) = &market_state {
            if let Err(e) = save_market_regime(&self.config.output_dir, state) {
                warn!(error = %e, "failed to persist market regime");
            }
        }
        let market_regime = market_state.as_ref().map(|s| s.regime);
        let regime_confidence = market_state.as_ref().map(|s| s.confidence).unwrap_or(0);

        // --- Per-symbol fan-out --------------------------------------------
        let holdings = load_holdings(&self.config.output_dir);
        let budget = Arc::new(AtomicI64::new(self.config.request_budget as i64));
        let deadline = started + std::time::Duration::from_secs(self.config.deadline_secs);
        let budget_stopped = Arc::new(AtomicBool::new(false));
        let deadline_exceeded = Arc::new(AtomicBool::new(false));

        let evaluations: Vec<SymbolEvaluation> = stream::iter(self.config.universe.clone())
            .map(|symbol| {
                let holdings = holdings.clone();
                let budget = Arc::clone(&budget);
                let budget_stopped = Arc::clone(&budget_stopped);
                let deadline_exceeded = Arc::clone(&deadline_exceeded);
                async move {
                    if Instant::now() >= deadline {
                        deadline_exceeded.store(true, Ordering::SeqCst);
                        return None;
                    }
                    // Snapshot costs three provider calls.
                    if budget.fetch_sub(3, Ordering::SeqCst) < 3 {
                        budget_stopped.store(true, Ordering::SeqCst);
                        return None;
                    }
                    let shares = holdings.get(&symbol.to_uppercase()).copied().unwrap_or(0.0);
                    Some(
                        self.evaluate_symbol(&symbol, shares, market_regime, &budget, &budget_stopped)
                            .await,
                    )
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await;

        if self.cancel.swap(false, Ordering::SeqCst) {
            bail!("run cancelled — no artifact written");
        }

        // --- Guardrails over the whole portfolio ---------------------------
        let open_positions = self.position_store.load_open();
        let spot_by_symbol: HashMap<String, f64> = evaluations
            .iter()
            .filter_map(|e| e.spot.map(|s| (e.row.symbol.clone(), s)))
            .collect();

        // --- Drift: previous artifact vs this run's quotes -----------------
        let drift = self
            .artifact_store
            .get_latest()
            .ok()
            .flatten()
            .map(|previous| {
                let mut live = LiveMarketData::default();
                for (sym, spot) in &spot_by_symbol {
                    live.underlying_prices.insert(sym.clone(), *spot);
                    live.option_chain_available.insert(sym.clone(), true);
                }
                detect_drift(&previous.assumptions(), &live, &self.config.drift)
            });
        if let Some(status) = &drift {
            if status.has_drift {
                warn!(findings = status.items.len(), "drift detected against previous artifact");
            }
        }

        // --- Lifecycle: evaluate open positions against this cycle ---------
        let position_evaluations = self
            .evaluate_open_positions(
                &open_positions,
                &spot_by_symbol,
                &run_id,
                &budget,
                &budget_stopped,
            )
            .await;
        let portfolio = compute_portfolio_state(
            &open_positions,
            self.config.scoring.account_equity,
            &spot_by_symbol,
        );
        let portfolio_regime = map_portfolio_regime(market_regime, regime_confidence);

        let mut symbols: Vec<SymbolEvalSummary> = Vec::new();
        let mut selected_candidates: Vec<SelectedCandidate> = Vec::new();
        for mut eval in evaluations {
            for mut candidate in eval.candidates {
                let sizing = CandidateSizing {
                    mode: candidate.strategy,
                    suggested_contracts: candidate.suggested_contracts,
                };
                let adjusted =
                    apply_guardrails(&portfolio, &sizing, portfolio_regime, &self.config.portfolio);
                candidate.adjusted_contracts = adjusted.adjusted_contracts;
                if candidate.adjusted_contracts == 0 {
                    eval.row.final_verdict = "NO_TRADE".to_string();
                }
                selected_candidates.push(candidate);
            }
            symbols.push(eval.row);
        }
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let eligible_count = symbols
            .iter()
            .filter(|s| s.final_verdict == "ELIGIBLE")
            .count();

        let mut warnings = Vec::new();
        if budget_stopped.load(Ordering::SeqCst) {
            warnings.push("budget_stopped".to_string());
        }
        if deadline_exceeded.load(Ordering::SeqCst) {
            warnings.push("deadline_exceeded".to_string());
        }

        let freeze_hash = if self.config.freeze_guard_enabled {
            Some(freeze_guard::hash_snapshot(
                &freeze_guard::build_critical_snapshot(&self.config),
            ))
        } else {
            None
        };

        let artifact = DecisionArtifact {
            metadata: ArtifactMetadata {
                artifact_version: ARTIFACT_VERSION.to_string(),
                run_id: run_id.clone(),
                pipeline_timestamp: Utc::now().to_rfc3339(),
                market_phase: market_phase(Utc::now()),
                data_source: "delayed".to_string(),
                universe_size: self.config.universe.len(),
                eligible_count,
                freeze_hash,
                run_mode,
                warnings,
            },
            symbols,
            selected_candidates,
        };

        self.artifact_store.set_latest(&artifact)?;
        freeze_guard::record_run(&self.config, run_mode, &self.config.output_dir)?;

        info!(
            run_id = %run_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            symbols = artifact.symbols.len(),
            eligible = eligible_count,
            "evaluation run complete"
        );

        Ok(RunOutcome {
            budget_stopped: budget_stopped.load(Ordering::SeqCst),
            deadline_exceeded: deadline_exceeded.load(Ordering::SeqCst),
            drift,
            position_evaluations,
            artifact,
        })
    }

    /// Evaluate every open position against its exit plan. Evaluations are
    /// serialized per position id (sequential walk) and persisted under
    /// `positions/evaluations/{id}.json`. The evaluator never mutates the
    /// position; suggested transitions are surfaced, not executed (dry-run).
    async fn evaluate_open_positions(
        &self,
        open_positions: &[Position],
        spot_by_symbol: &HashMap<String, f64>,
        run_id: &str,
        budget: &AtomicI64,
        budget_stopped: &AtomicBool,
    ) -> Vec<PositionEvaluation> {
        let today = Utc::now().date_naive();
        let mut evaluations = Vec::with_capacity(open_positions.len());

        for position in open_positions {
            let spot = spot_by_symbol.get(&position.symbol).copied();

            // Current option quote for the exact contract, budget-charged.
            let quote = match (position.strike, position.expiry) {
                (Some(strike), Some(expiry))
                    if position.position_type != PositionType::Shares =>
                {
                    if budget.fetch_sub(1, Ordering::SeqCst) < 1 {
                        budget_stopped.store(true, Ordering::SeqCst);
                        None
                    } else {
                        self.chain_client
                            .fetch_contract_quote(&position.symbol, strike, expiry)
                            .await
                    }
                }
                _ => None,
            };
            let (bid, ask) = match quote {
                Some((b, a)) => (Some(b), Some(a)),
                None => (None, None),
            };

            let plan = position
                .exit_plan
                .clone()
                .unwrap_or_else(|| ExitPlan::from_config(&self.config.lifecycle));
            let evaluation = evaluate_position(position, spot, bid, ask, &plan, today);

            // Bookkeeping heartbeat: an OPEN position the evaluator holds
            // records the HOLD transition. Exits are surfaced, never
            // executed — the engine is dry-run.
            if position.lifecycle_state == LifecycleState::Open
                && evaluation.exit_signal == ExitSignal::Hold
            {
                let mut updated = position.clone();
                match apply_transition(
                    &mut updated,
                    LifecycleAction::Hold,
                    evaluation.exit_reason.clone(),
                    "evaluator",
                    run_id,
                    &Utc::now().to_rfc3339(),
                ) {
                    Ok(_) => {
                        if let Err(e) = self.position_store.save(&updated) {
                            warn!(position_id = %updated.id, error = %e, "failed to save position");
                        }
                    }
                    Err(e) => warn!(position_id = %position.id, "{e}"),
                }
            }

            if let Err(e) = persist_position_evaluation(&self.config.output_dir, &evaluation) {
                warn!(position_id = %position.id, error = %e, "failed to persist evaluation");
            }
            evaluations.push(evaluation);
        }

        evaluations
    }

    /// Full staged evaluation of one symbol. Never fails the run — errors
    /// collapse into the symbol's row.
    async fn evaluate_symbol(
        &self,
        symbol: &str,
        holdings_shares: f64,
        market_regime: Option<MarketRegime>,
        budget: &AtomicI64,
        budget_stopped: &AtomicBool,
    ) -> SymbolEvaluation {
        let SnapshotBuildResult { snapshot, candles } =
            self.snapshot_service.build(symbol).await;
        let today = Utc::now().date_naive();

        let instrument = crate::types::classify_instrument(symbol);
        let report = check_dependencies(
            &snapshot,
            instrument,
            &self.config.data_dependencies.optional_evaluation_fields,
            today,
            self.config.data_dependencies.staleness_trading_days,
        );
        let stage1 = qualify(&snapshot, &report);

        // Stage-1 BLOCKED short-circuits: no eligibility, no chain.
        if stage1.verdict == StockVerdict::Blocked {
            return SymbolEvaluation {
                row: blocked_row(&stage1, &report, &snapshot.fetched_at, snapshot.price),
                candidates: Vec::new(),
                spot: snapshot.price,
            };
        }

        // --- Intraday bars only when the flag is on -----------------------
        let intraday = if self.config.eligibility.enable_intraday_confirmation {
            if budget.fetch_sub(1, Ordering::SeqCst) < 1 {
                budget_stopped.store(true, Ordering::SeqCst);
                None
            } else {
                Some(
                    self.snapshot_service
                        .dailies_client
                        .fetch_intraday_4h(symbol, 200)
                        .await,
                )
            }
        } else {
            None
        };

        let trace = run_eligibility(
            symbol,
            &candles,
            intraday.as_deref(),
            holdings_shares,
            &self.config.eligibility,
            &self.config.volatility,
        );

        // --- Stage-2 only in a decided mode -------------------------------
        let stage2 = if trace.mode_decision != ModeDecision::None {
            if budget.fetch_sub(1, Ordering::SeqCst) < 1 {
                budget_stopped.store(true, Ordering::SeqCst);
                None
            } else {
                let fetched = self
                    .chain_client
                    .fetch_base_chain(
                        symbol,
                        self.config.selection.dte_min,
                        self.config.selection.dte_max,
                        trace.mode_decision,
                        ChainSource::Delayed,
                    )
                    .await;
                Some(select_contracts(
                    symbol,
                    trace.mode_decision,
                    &fetched.contracts,
                    &fetched.meta,
                    fetched.underlying_price.or(snapshot.price),
                    &self.config.selection,
                ))
            }
        } else {
            None
        };

        build_symbol_row(
            &self.config,
            &snapshot.fetched_at,
            &stage1,
            &report,
            &trace,
            stage2.as_ref(),
            snapshot.price,
            &snapshot,
            market_regime,
        )
    }
}

/// Map the market regime onto the guardrail regime scale. A low-confidence
/// RISK_OFF (nothing confirming) reads as crash conditions.
fn map_portfolio_regime(regime: Option<MarketRegime>, confidence: u32) -> PortfolioRegime {
    match regime {
        Some(MarketRegime::RiskOn) => PortfolioRegime::Normal,
        Some(MarketRegime::RiskOff) if confidence <= 25 => PortfolioRegime::Crash,
        Some(MarketRegime::RiskOff) => PortfolioRegime::Down,
        None => PortfolioRegime::Down,
    }
}

/// Portfolio state from open positions. Cluster risk stays LOW — there is no
/// sector model in this engine; the input exists for operators to override.
fn compute_portfolio_state(
    open: &[Position],
    equity: f64,
    spot_by_symbol: &HashMap<String, f64>,
) -> PortfolioState {
    let mut per_symbol: HashMap<&str, f64> = HashMap::new();
    let mut total = 0.0;
    let mut near_itm = 0u32;

    for p in open {
        if p.lifecycle_state == LifecycleState::Closed {
            continue;
        }
        let notional = match (p.position_type, p.strike) {
            (PositionType::Csp, Some(strike)) => strike * 100.0 * p.contracts as f64,
            (PositionType::Shares, _) => {
                let spot = spot_by_symbol.get(p.symbol.as_str()).copied().unwrap_or(0.0);
                spot * 100.0 * p.contracts as f64
            }
            _ => 0.0,
        };
        total += notional;
        *per_symbol.entry(p.symbol.as_str()).or_insert(0.0) += notional;

        if p.position_type == PositionType::Csp {
            if let (Some(strike), Some(&spot)) = (p.strike, spot_by_symbol.get(p.symbol.as_str())) {
                if spot <= strike * 1.02 {
                    near_itm += 1;
                }
            }
        }
    }

    let exposure_pct = if equity > 0.0 { total / equity * 100.0 } else { 0.0 };
    let max_symbol_pct = if equity > 0.0 {
        per_symbol
            .values()
            .fold(0.0_f64, |acc, v| acc.max(*v))
            / equity
            * 100.0
    } else {
        0.0
    };

    PortfolioState {
        exposure_pct,
        max_symbol_pct,
        cluster_risk: ClusterRisk::Low,
        positions_near_itm: near_itm,
    }
}

fn blocked_row(
    stage1: &Stage1Result,
    report: &DependencyReport,
    evaluated_at: &str,
    price: Option<f64>,
) -> SymbolEvalSummary {
    SymbolEvalSummary {
        symbol: stage1.symbol.clone(),
        verdict: stage1.verdict,
        final_verdict: "BLOCKED".to_string(),
        score: None,
        band: crate::types::Band::D,
        band_reason: format!("Band D because {}", stage1.reason),
        primary_reason: Some(stage1.reason.clone()),
        stage_status: report.status.to_string(),
        stage1_status: stage1.verdict.to_string(),
        stage2_status: "UNAVAILABLE".to_string(),
        provider_status: if price.is_some() { "DEGRADED" } else { "EMPTY" }.to_string(),
        evaluated_at: evaluated_at.to_string(),
        strategy: ModeDecision::None,
        price,
        expiration: None,
        has_candidates: false,
        candidate_count: 0,
    }
}

/// Pure assembly of the artifact row (and candidate rows) for one symbol.
#[allow(clippy::too_many_arguments)]
fn build_symbol_row(
    config: &EngineConfig,
    evaluated_at: &str,
    stage1: &Stage1Result,
    report: &DependencyReport,
    trace: &EligibilityTrace,
    stage2: Option<&Stage2Result>,
    spot: Option<f64>,
    snapshot: &crate::snapshot::SymbolSnapshot,
    market_regime: Option<MarketRegime>,
) -> SymbolEvaluation {
    let (contract_data, contract_eligibility) = build_eligibility_layers(stage2);

    // Quality gates run with whatever chain view Stage-2 produced.
    let chain_liquidity = stage2.and_then(|s2| {
        s2.selected_contract.as_ref().map(|sc| ChainLiquidity {
            option_bid: sc.contract.bid.value_copied(),
            option_ask: sc.contract.ask.value_copied(),
            option_mid: sc.contract.mid.value_copied(),
            option_oi: sc.contract.open_interest.value_copied(),
            option_volume: sc.contract.volume.value_copied(),
        })
    });
    let gate = evaluate_universe_quality(
        &stage1.symbol,
        snapshot,
        chain_liquidity.as_ref(),
        report,
        &config.quality_gates,
    );

    let rsi_band = match trace.mode_decision {
        ModeDecision::Csp => Some((config.eligibility.csp_rsi_min, config.eligibility.csp_rsi_max)),
        ModeDecision::Cc => Some((config.eligibility.cc_rsi_min, config.eligibility.cc_rsi_max)),
        ModeDecision::None => None,
    };
    let liquidity_ok = stage2.map(|s| s.liquidity_ok).unwrap_or(false);
    let breakdown = compute_score(trace, stage2, stage1.completeness, spot, rsi_band, &config.scoring);
    let hint = assign_band(
        breakdown.composite,
        stage1.completeness,
        liquidity_ok,
        market_regime,
        &config.scoring,
    );

    // --- Primary reason: eligibility first, then contract layer -----------
    let primary_reason = if let Some(code) = &trace.primary_reason_code {
        Some(code.clone())
    } else if gate.status == GateOutcome::Skip {
        gate.reasons.first().cloned()
    } else if contract_eligibility.status == ContractEligibilityStatus::Fail
        || contract_eligibility.status == ContractEligibilityStatus::Error
    {
        contract_eligibility.reasons.first().cloned()
    } else {
        None
    };

    let has_candidates = stage2
        .map(|s| !s.selected_candidates.is_empty())
        .unwrap_or(false);
    let eligible = trace.mode_decision != ModeDecision::None
        && has_candidates
        && gate.status == GateOutcome::Pass;

    let final_verdict = if eligible {
        "ELIGIBLE".to_string()
    } else {
        "NO_TRADE".to_string()
    };

    let candidate_count = stage2.map(|s| s.selected_candidates.len()).unwrap_or(0);
    let expiration = stage2
        .and_then(|s| s.selected_contract.as_ref())
        .map(|sc| sc.contract.expiration);

    let row = SymbolEvalSummary {
        symbol: stage1.symbol.clone(),
        verdict: stage1.verdict,
        final_verdict,
        score: Some(breakdown.composite),
        band: hint.band,
        band_reason: hint.band_reason,
        primary_reason,
        stage_status: report.status.to_string(),
        stage1_status: stage1.verdict.to_string(),
        stage2_status: contract_eligibility.status.to_string(),
        provider_status: if snapshot.missing_reasons.is_empty() {
            "OK".to_string()
        } else {
            "DEGRADED".to_string()
        },
        evaluated_at: evaluated_at.to_string(),
        strategy: trace.mode_decision,
        price: spot,
        expiration,
        has_candidates,
        candidate_count,
    };

    // --- Candidate rows ----------------------------------------------------
    let mut candidates = Vec::new();
    if eligible {
        if let Some(s2) = stage2 {
            if let Some(sc) = &s2.selected_contract {
                let suggested = suggested_contracts(
                    sc.contract.strike,
                    config.scoring.account_equity,
                );
                candidates.push(SelectedCandidate {
                    symbol: stage1.symbol.clone(),
                    strategy: trace.mode_decision,
                    option_right: sc.contract.option_type,
                    strike: sc.contract.strike,
                    expiry: sc.contract.expiration,
                    delta: sc.normalized_delta,
                    bid: sc.contract.bid.value_copied(),
                    ask: sc.contract.ask.value_copied(),
                    mid: sc.contract.mid.value_copied(),
                    iv: sc.contract.iv.value_copied(),
                    open_interest: sc.contract.open_interest.value_copied(),
                    spread_pct: sc.contract.spread_pct.value_copied(),
                    dte: sc.contract.dte,
                    liquidity_grade: sc.liquidity_grade,
                    underlying_price: spot.or(s2.spot_used),
                    chain_source: contract_data.source,
                    suggested_contracts: suggested,
                    adjusted_contracts: suggested,
                    score: Some(breakdown.composite),
                    band: hint.band,
                });
            }
        }
    }

    SymbolEvaluation {
        row,
        candidates,
        spot,
    }
}

/// Base sizing: 10% of equity in collateral, at least one contract.
fn suggested_contracts(strike: f64, equity: f64) -> u32 {
    if strike <= 0.0 || equity <= 0.0 {
        return 1;
    }
    let collateral_per_contract = strike * 100.0;
    ((equity * 0.10 / collateral_per_contract).floor() as u32).max(1)
}

/// Persist one position evaluation under `positions/evaluations/{id}.json`.
fn persist_position_evaluation(
    output_dir: &Path,
    evaluation: &PositionEvaluation,
) -> Result<()> {
    let dir = output_dir.join("positions").join("evaluations");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", evaluation.position_id));
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(evaluation)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Holdings map (symbol -> shares) from `holdings.json` in the output dir.
fn load_holdings(output_dir: &Path) -> HashMap<String, f64> {
    let path = output_dir.join("holdings.json");
    let Ok(content) = std::fs::read_to_string(&path) else {
        return HashMap::new();
    };
    match serde_json::from_str::<HashMap<String, f64>>(&content) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect(),
        Err(e) => {
            warn!(error = %e, "holdings.json unparseable — treating as empty");
            HashMap::new()
        }
    }
}
