// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the eligibility
// engine depends on. Every public function returns `Option<T>` (or an empty
// series) when the lookback is insufficient — there are no fallback values.

pub mod atr;
pub mod ema;
pub mod rsi;
