// =============================================================================
// Position State Machine — strict (state, action) -> state table
// =============================================================================
//
// The transition table is data, not conditionals — `transition_target` is the
// only place a transition can be declared. Every successful transition
// appends to the position's ordered, append-only history. CLOSED is
// terminal.
//
//   NEW      --ASSIGN--> ASSIGNED
//   ASSIGNED --OPEN----> OPEN
//   OPEN     --HOLD----> OPEN
//   OPEN     --ROLL----> ROLLING
//   ROLLING  --OPEN----> OPEN
//   OPEN     --CLOSE---> CLOSING
//   CLOSING  --CLOSE---> CLOSED

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use super::evaluator::ExitPlan;

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    New,
    Assigned,
    Open,
    Rolling,
    Closing,
    Closed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Open => write!(f, "OPEN"),
            Self::Rolling => write!(f, "ROLLING"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleAction {
    Assign,
    Open,
    Hold,
    Roll,
    Close,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assign => write!(f, "ASSIGN"),
            Self::Open => write!(f, "OPEN"),
            Self::Hold => write!(f, "HOLD"),
            Self::Roll => write!(f, "ROLL"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

/// The transition table. `None` means the pair is invalid.
pub fn transition_target(
    state: LifecycleState,
    action: LifecycleAction,
) -> Option<LifecycleState> {
    use LifecycleAction as A;
    use LifecycleState as S;
    match (state, action) {
        (S::New, A::Assign) => Some(S::Assigned),
        (S::Assigned, A::Open) => Some(S::Open),
        (S::Open, A::Hold) => Some(S::Open),
        (S::Open, A::Roll) => Some(S::Rolling),
        (S::Rolling, A::Open) => Some(S::Open),
        (S::Open, A::Close) => Some(S::Closing),
        (S::Closing, A::Close) => Some(S::Closed),
        _ => None,
    }
}

/// Actions legal from a state, for error messages and the diagnostics API.
pub fn allowed_actions(state: LifecycleState) -> Vec<LifecycleAction> {
    use LifecycleAction as A;
    [A::Assign, A::Open, A::Hold, A::Roll, A::Close]
        .into_iter()
        .filter(|a| transition_target(state, *a).is_some())
        .collect()
}

/// Raised when a (state, action) pair is not in the table. Never silently
/// swallowed — the error carries the correlation id of the run (or caller)
/// that attempted it and is logged before propagating.
#[derive(Debug, Error)]
#[error(
    "invalid transition for position {position_id}: {from} --{action}--> ? \
     (allowed from {from}: {allowed}; correlation_id={correlation_id})"
)]
pub struct InvalidTransitionError {
    pub position_id: String,
    pub from: LifecycleState,
    pub action: LifecycleAction,
    pub allowed: String,
    pub correlation_id: String,
}

impl InvalidTransitionError {
    fn new(
        position_id: &str,
        from: LifecycleState,
        action: LifecycleAction,
        correlation_id: &str,
    ) -> Self {
        let allowed = allowed_actions(from);
        let allowed = if allowed.is_empty() {
            "none (terminal state)".to_string()
        } else {
            allowed
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self {
            position_id: position_id.to_string(),
            from,
            action,
            allowed,
            correlation_id: correlation_id.to_string(),
        }
    }
}

/// One entry in a position's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub action: LifecycleAction,
    pub reason: String,
    /// e.g. "system", "operator", "evaluator".
    pub source: String,
    pub ts: String,
}

/// What kind of holding this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionType {
    Csp,
    Cc,
    Shares,
}

/// A tracked wheel position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub strike: Option<f64>,
    pub expiry: Option<NaiveDate>,
    pub contracts: u32,
    /// Credit received at entry, total dollars.
    pub premium_collected: f64,
    pub entry_date: Option<NaiveDate>,
    pub lifecycle_state: LifecycleState,
    /// Ordered, append-only.
    #[serde(default)]
    pub state_history: Vec<TransitionRecord>,
    #[serde(default)]
    pub exit_plan: Option<ExitPlan>,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub notes: String,
}

/// Apply `action` to the position, enforcing the table. On success the state
/// is updated and one history record appended; on failure the position is
/// untouched and the error carries `correlation_id` (the run id or caller
/// identifier that attempted the transition).
pub fn apply_transition(
    position: &mut Position,
    action: LifecycleAction,
    reason: impl Into<String>,
    source: impl Into<String>,
    correlation_id: &str,
    now_iso: &str,
) -> Result<LifecycleState, InvalidTransitionError> {
    let from = position.lifecycle_state;
    let Some(to) = transition_target(from, action) else {
        let err = InvalidTransitionError::new(&position.id, from, action, correlation_id);
        error!(
            position_id = %position.id,
            from = %from,
            action = %action,
            correlation_id,
            "{err}"
        );
        return Err(err);
    };

    let reason = reason.into();
    position.state_history.push(TransitionRecord {
        from_state: from,
        to_state: to,
        action,
        reason: reason.clone(),
        source: source.into(),
        ts: now_iso.to_string(),
    });
    position.lifecycle_state = to;

    info!(
        position_id = %position.id,
        symbol = %position.symbol,
        from = %from,
        to = %to,
        action = %action,
        reason = %reason,
        "position transitioned"
    );
    Ok(to)
}

/// Map a legacy status string to a lifecycle state. Unknown values map to
/// OPEN — the shim runs exactly once on load, never on a live position.
pub fn map_legacy_state(raw: &str) -> LifecycleState {
    match raw.trim().to_uppercase().as_str() {
        "NEW" => LifecycleState::New,
        "ASSIGNED" => LifecycleState::Assigned,
        "OPEN" => LifecycleState::Open,
        "ROLLING" => LifecycleState::Rolling,
        "CLOSING" => LifecycleState::Closing,
        "CLOSED" => LifecycleState::Closed,
        _ => LifecycleState::Open,
    }
}
