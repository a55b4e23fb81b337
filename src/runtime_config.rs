// =============================================================================
// Engine Configuration — every recognized option, read once at run start
// =============================================================================
//
// Central configuration hub for the WheelOps engine. The pipeline captures a
// clone of this config at run start; mid-run edits are ignored until the next
// run. The freeze guard hashes the critical sections (scoring, selection,
// eligibility, volatility, portfolio) so LIVE runs are blocked on drift.
//
// Persistence uses an atomic tmp + rename pattern. All fields carry
// `#[serde(default)]` so adding new fields never breaks older config files.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::RunMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_universe() -> Vec<String> {
    vec![
        "SPY".to_string(),
        "QQQ".to_string(),
        "AAPL".to_string(),
        "MSFT".to_string(),
        "NVDA".to_string(),
    ]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_cadence_minutes() -> u64 {
    30
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_request_budget() -> u32 {
    400
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_cooldown_secs() -> u64 {
    120
}

fn default_provider_base_url() -> String {
    "https://api.orats.io".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    20
}

fn default_index_symbol() -> String {
    "SPY".to_string()
}

fn default_max_atr_pct() -> f64 {
    0.05
}

fn default_csp_rsi_min() -> f64 {
    35.0
}

fn default_csp_rsi_max() -> f64 {
    55.0
}

fn default_cc_rsi_min() -> f64 {
    50.0
}

fn default_cc_rsi_max() -> f64 {
    65.0
}

fn default_support_near_pct() -> f64 {
    0.03
}

fn default_resist_near_pct() -> f64 {
    0.03
}

fn default_max_s_r_tol_pct() -> f64 {
    0.012
}

fn default_sr_pct_floor() -> f64 {
    0.006
}

fn default_sr_atr_mult() -> f64 {
    0.5
}

fn default_swing_window() -> usize {
    60
}

fn default_swing_k() -> usize {
    3
}

fn default_min_candles() -> usize {
    210
}

fn default_intraday_min_rows() -> usize {
    60
}

fn default_dte_soft_exit() -> i64 {
    14
}

fn default_dte_hard_exit() -> i64 {
    7
}

fn default_profit_target_pct() -> f64 {
    0.60
}

fn default_premium_extension_pct() -> f64 {
    0.75
}

fn default_weight_data_quality() -> f64 {
    0.15
}

fn default_weight_regime() -> f64 {
    0.25
}

fn default_weight_options_liquidity() -> f64 {
    0.20
}

fn default_weight_strategy_fit() -> f64 {
    0.25
}

fn default_weight_capital_efficiency() -> f64 {
    0.15
}

fn default_band_a_min() -> f64 {
    70.0
}

fn default_band_b_min() -> f64 {
    60.0
}

fn default_band_c_min() -> f64 {
    50.0
}

fn default_account_equity() -> f64 {
    100_000.0
}

fn default_delta_lo() -> f64 {
    0.15
}

fn default_delta_hi() -> f64 {
    0.35
}

fn default_min_oi() -> i64 {
    500
}

fn default_max_spread_pct() -> f64 {
    0.10
}

fn default_dte_min() -> i64 {
    30
}

fn default_dte_max() -> i64 {
    45
}

fn default_target_max_exposure_pct() -> f64 {
    60.0
}

fn default_critical_exposure_pct() -> f64 {
    80.0
}

fn default_symbol_concentration_warn_pct() -> f64 {
    15.0
}

fn default_symbol_concentration_critical_pct() -> f64 {
    25.0
}

fn default_assignment_pressure_threshold() -> u32 {
    2
}

fn default_staleness_trading_days() -> i64 {
    1
}

fn default_price_drift_warn_pct() -> f64 {
    0.75
}

fn default_iv_drift_abs() -> f64 {
    0.03
}

fn default_iv_drift_rel() -> f64 {
    0.15
}

fn default_spread_widened_mult() -> f64 {
    1.5
}

fn default_spread_mid_max() -> f64 {
    0.20
}

fn default_gate_min_price_usd() -> f64 {
    8.0
}

fn default_gate_max_spread_pct() -> f64 {
    0.012
}

fn default_gate_min_avg_volume() -> i64 {
    800_000
}

fn default_gate_max_option_bidask_pct() -> f64 {
    0.10
}

fn default_gate_min_option_oi() -> i64 {
    500
}

fn default_gate_min_option_volume() -> i64 {
    50
}

// =============================================================================
// Config sections
// =============================================================================

/// Provider endpoints and HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Volatility gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// CSP/CC gate: ATR as a fraction of price must stay below this.
    #[serde(default = "default_max_atr_pct")]
    pub max_atr_pct: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            max_atr_pct: default_max_atr_pct(),
        }
    }
}

/// Eligibility-engine gates (Stage-1.5: mode decision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "default_csp_rsi_min")]
    pub csp_rsi_min: f64,
    #[serde(default = "default_csp_rsi_max")]
    pub csp_rsi_max: f64,
    #[serde(default = "default_cc_rsi_min")]
    pub cc_rsi_min: f64,
    #[serde(default = "default_cc_rsi_max")]
    pub cc_rsi_max: f64,

    /// Maximum distance to support (fraction of spot) for CSP.
    #[serde(default = "default_support_near_pct")]
    pub support_near_pct: f64,

    /// Maximum distance to resistance (fraction of spot) for CC.
    #[serde(default = "default_resist_near_pct")]
    pub resist_near_pct: f64,

    /// Hard cap on the S/R cluster tolerance as a fraction of spot.
    #[serde(default = "default_max_s_r_tol_pct")]
    pub max_s_r_tol_pct: f64,

    /// Percent floor for the S/R cluster tolerance.
    #[serde(default = "default_sr_pct_floor")]
    pub sr_pct_floor: f64,

    /// ATR multiplier feeding the S/R cluster tolerance.
    #[serde(default = "default_sr_atr_mult")]
    pub sr_atr_mult: f64,

    #[serde(default = "default_swing_window")]
    pub swing_window: usize,
    #[serde(default = "default_swing_k")]
    pub swing_k: usize,

    /// Minimum daily candles required before the engine will evaluate.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,

    /// Feature flag for the 4H intraday confirmation gate.
    #[serde(default)]
    pub enable_intraday_confirmation: bool,

    /// Minimum 4H rows before intraday confirmation is trusted.
    #[serde(default = "default_intraday_min_rows")]
    pub intraday_min_rows: usize,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            csp_rsi_min: default_csp_rsi_min(),
            csp_rsi_max: default_csp_rsi_max(),
            cc_rsi_min: default_cc_rsi_min(),
            cc_rsi_max: default_cc_rsi_max(),
            support_near_pct: default_support_near_pct(),
            resist_near_pct: default_resist_near_pct(),
            max_s_r_tol_pct: default_max_s_r_tol_pct(),
            sr_pct_floor: default_sr_pct_floor(),
            sr_atr_mult: default_sr_atr_mult(),
            swing_window: default_swing_window(),
            swing_k: default_swing_k(),
            min_candles: default_min_candles(),
            enable_intraday_confirmation: false,
            intraday_min_rows: default_intraday_min_rows(),
        }
    }
}

/// Position-lifecycle exit thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// DTE at or below which a roll is suggested.
    #[serde(default = "default_dte_soft_exit")]
    pub dte_soft_exit_threshold: i64,

    /// DTE at or below which the position must exit.
    #[serde(default = "default_dte_hard_exit")]
    pub dte_hard_exit_threshold: i64,

    /// Base premium-capture target (fraction of entry credit).
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,

    /// Extended premium-capture target that forces an exit.
    #[serde(default = "default_premium_extension_pct")]
    pub premium_extension_pct: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            dte_soft_exit_threshold: default_dte_soft_exit(),
            dte_hard_exit_threshold: default_dte_hard_exit(),
            profit_target_pct: default_profit_target_pct(),
            premium_extension_pct: default_premium_extension_pct(),
        }
    }
}

/// Component weights for the composite score. Consolidated here — this is the
/// single source of truth captured by the freeze guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_weight_data_quality")]
    pub weight_data_quality: f64,
    #[serde(default = "default_weight_regime")]
    pub weight_regime: f64,
    #[serde(default = "default_weight_options_liquidity")]
    pub weight_options_liquidity: f64,
    #[serde(default = "default_weight_strategy_fit")]
    pub weight_strategy_fit: f64,
    #[serde(default = "default_weight_capital_efficiency")]
    pub weight_capital_efficiency: f64,

    /// Minimum composite score for each band.
    #[serde(default = "default_band_a_min")]
    pub band_a_min: f64,
    #[serde(default = "default_band_b_min")]
    pub band_b_min: f64,
    #[serde(default = "default_band_c_min")]
    pub band_c_min: f64,

    /// Account equity used for capital-efficiency scoring.
    #[serde(default = "default_account_equity")]
    pub account_equity: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_data_quality: default_weight_data_quality(),
            weight_regime: default_weight_regime(),
            weight_options_liquidity: default_weight_options_liquidity(),
            weight_strategy_fit: default_weight_strategy_fit(),
            weight_capital_efficiency: default_weight_capital_efficiency(),
            band_a_min: default_band_a_min(),
            band_b_min: default_band_b_min(),
            band_c_min: default_band_c_min(),
            account_equity: default_account_equity(),
        }
    }
}

/// Contract-selection filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Delta band applied to |delta| regardless of provider sign convention.
    #[serde(default = "default_delta_lo")]
    pub delta_lo: f64,
    #[serde(default = "default_delta_hi")]
    pub delta_hi: f64,

    #[serde(default = "default_min_oi")]
    pub min_oi: i64,

    /// Maximum bid/ask spread as a fraction of mid.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: f64,

    #[serde(default = "default_dte_min")]
    pub dte_min: i64,
    #[serde(default = "default_dte_max")]
    pub dte_max: i64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            delta_lo: default_delta_lo(),
            delta_hi: default_delta_hi(),
            min_oi: default_min_oi(),
            max_spread_pct: default_max_spread_pct(),
            dte_min: default_dte_min(),
            dte_max: default_dte_max(),
        }
    }
}

/// Portfolio guardrail limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_target_max_exposure_pct")]
    pub target_max_exposure_pct: f64,
    #[serde(default = "default_critical_exposure_pct")]
    pub critical_exposure_pct: f64,
    #[serde(default = "default_symbol_concentration_warn_pct")]
    pub max_symbol_concentration_pct: f64,
    #[serde(default = "default_symbol_concentration_critical_pct")]
    pub max_symbol_concentration_critical_pct: f64,
    #[serde(default = "default_assignment_pressure_threshold")]
    pub assignment_pressure_threshold: u32,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            target_max_exposure_pct: default_target_max_exposure_pct(),
            critical_exposure_pct: default_critical_exposure_pct(),
            max_symbol_concentration_pct: default_symbol_concentration_warn_pct(),
            max_symbol_concentration_critical_pct: default_symbol_concentration_critical_pct(),
            assignment_pressure_threshold: default_assignment_pressure_threshold(),
        }
    }
}

/// Data-dependency policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDependencyConfig {
    /// quote_date older than this many trading days marks fields stale.
    #[serde(default = "default_staleness_trading_days")]
    pub staleness_trading_days: i64,

    /// Optional fields are explicit config, not derived from comments.
    /// Empty by default: nothing optional blocks.
    #[serde(default)]
    pub optional_evaluation_fields: Vec<String>,
}

impl Default for DataDependencyConfig {
    fn default() -> Self {
        Self {
            staleness_trading_days: default_staleness_trading_days(),
            optional_evaluation_fields: Vec::new(),
        }
    }
}

/// Drift-detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Underlying move (percent of snapshot price) that triggers PRICE_DRIFT.
    #[serde(default = "default_price_drift_warn_pct")]
    pub price_drift_warn_pct: f64,
    #[serde(default = "default_iv_drift_abs")]
    pub iv_drift_abs: f64,
    #[serde(default = "default_iv_drift_rel")]
    pub iv_drift_rel: f64,
    #[serde(default = "default_spread_widened_mult")]
    pub spread_widened_mult: f64,
    /// spread / mid above this triggers SPREAD_WIDENED.
    #[serde(default = "default_spread_mid_max")]
    pub spread_mid_max: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            price_drift_warn_pct: default_price_drift_warn_pct(),
            iv_drift_abs: default_iv_drift_abs(),
            iv_drift_rel: default_iv_drift_rel(),
            spread_widened_mult: default_spread_widened_mult(),
            spread_mid_max: default_spread_mid_max(),
        }
    }
}

/// Per-symbol override for the universe quality gates. `None` fields inherit
/// the global gate config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub min_price_usd: Option<f64>,
    #[serde(default)]
    pub max_price_usd: Option<f64>,
    #[serde(default)]
    pub max_spread_pct: Option<f64>,
    #[serde(default)]
    pub min_avg_volume: Option<i64>,
}

/// Universe quality-gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_gate_min_price_usd")]
    pub min_price_usd: f64,
    /// `None` disables the upper price bound.
    #[serde(default)]
    pub max_price_usd: Option<f64>,
    #[serde(default = "default_gate_max_spread_pct")]
    pub max_spread_pct: f64,
    #[serde(default = "default_gate_min_avg_volume")]
    pub min_avg_volume: i64,
    #[serde(default = "default_gate_max_option_bidask_pct")]
    pub max_option_bidask_pct: f64,
    #[serde(default = "default_gate_min_option_oi")]
    pub min_option_oi: i64,
    #[serde(default = "default_gate_min_option_volume")]
    pub min_option_volume: i64,
    #[serde(default)]
    pub symbol_overrides: HashMap<String, GateOverride>,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_price_usd: default_gate_min_price_usd(),
            max_price_usd: None,
            max_spread_pct: default_gate_max_spread_pct(),
            min_avg_volume: default_gate_min_avg_volume(),
            max_option_bidask_pct: default_gate_max_option_bidask_pct(),
            min_option_oi: default_gate_min_option_oi(),
            min_option_volume: default_gate_min_option_volume(),
            symbol_overrides: HashMap::new(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// DRY_RUN / PAPER_LIVE / LIVE. Non-DRY_RUN modes are freeze-guarded.
    #[serde(default)]
    pub run_mode: RunMode,

    /// Symbols evaluated each cycle.
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,

    /// Root of all persisted state (artifacts, caches, positions, ledger).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Minutes between scheduled evaluation runs.
    #[serde(default = "default_cadence_minutes")]
    pub cadence_minutes: u64,

    /// Bound on concurrent per-symbol evaluations.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// HTTP request budget per run; exceeding it stops scheduling new
    /// symbols and surfaces a budget_stopped warning.
    #[serde(default = "default_request_budget")]
    pub request_budget: u32,

    /// Global run deadline in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Minimum seconds between operator-triggered evaluations.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Index symbol used for the market-level regime.
    #[serde(default = "default_index_symbol")]
    pub index_symbol: String,

    /// Freeze guard active in non-DRY_RUN modes.
    #[serde(default = "default_true")]
    pub freeze_guard_enabled: bool,

    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub data_dependencies: DataDependencyConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub quality_gates: QualityGateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::DryRun,
            universe: default_universe(),
            output_dir: default_output_dir(),
            cadence_minutes: default_cadence_minutes(),
            max_workers: default_max_workers(),
            request_budget: default_request_budget(),
            deadline_secs: default_deadline_secs(),
            cooldown_secs: default_cooldown_secs(),
            index_symbol: default_index_symbol(),
            freeze_guard_enabled: true,
            provider: ProviderConfig::default(),
            volatility: VolatilityConfig::default(),
            eligibility: EligibilityConfig::default(),
            lifecycle: LifecycleConfig::default(),
            scoring: ScoringConfig::default(),
            selection: SelectionConfig::default(),
            portfolio: PortfolioConfig::default(),
            data_dependencies: DataDependencyConfig::default(),
            drift: DriftConfig::default(),
            quality_gates: QualityGateConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// Missing file is an error so the caller can decide to fall back to
    /// defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            universe = ?config.universe,
            run_mode = %config.run_mode,
            "engine config loaded"
        );
        Ok(config)
    }

    /// Persist the configuration atomically (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}
