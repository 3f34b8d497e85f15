use serde::{Deserialize, Serialize};

use crate::domain::market::structure_break::BreakOfMarketStructure;
use crate::domain::market::trend::TrendDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Bullish,
    Bearish,
    Ranging,
    Transitioning,
}

/// Composite per-timeframe state produced by `MarketStateTracker` (§3, §4.11).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStateData {
    pub state: MarketState,
    pub trend_direction: TrendDirection,
    /// `[0, 100]`
    pub trend_strength: f64,
    pub bms_count: usize,
    pub last_bms: Option<BreakOfMarketStructure>,
    /// Net imbalance of recent bullish vs bearish liquidity sweeps, `[-1, 1]`.
    pub liquidity_profile: f64,
    pub state_duration_candles: usize,
    pub state_start_ts: i64,
    /// `[0, 100]`
    pub confidence: f64,
}
