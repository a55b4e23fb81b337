// =============================================================================
// Market Data Module
// =============================================================================
//
// Candle types shared by the indicator stack, the regime classifiers, and the
// provider clients. All series are oldest-first.

pub mod candle;

pub use candle::{resample_weekly, DailyCandle, IntradayCandle};
