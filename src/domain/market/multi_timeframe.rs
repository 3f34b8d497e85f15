use serde::{Deserialize, Serialize};

use crate::domain::market::market_state::MarketStateData;
use crate::domain::market::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Perfect,
    High,
    Moderate,
    Low,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallBias {
    StronglyBullish,
    Bullish,
    Neutral,
    Bearish,
    StronglyBearish,
}

/// Integrated H1/M15/M1 view produced by `MultiTimeframeAnalyzer` (§3, §4.12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeStructure {
    pub h1_structure: MarketStateData,
    pub m15_structure: MarketStateData,
    pub m1_structure: MarketStateData,
    pub consistency_level: ConsistencyLevel,
    pub overall_bias: OverallBias,
    /// `[0, 10]`
    pub bias_strength: f64,
    pub primary_timeframe: Timeframe,
    pub conflicts: Vec<String>,
    pub recommendations: Vec<String>,
}

impl MultiTimeframeStructure {
    pub fn is_strong_trend(&self) -> bool {
        matches!(self.consistency_level, ConsistencyLevel::Perfect | ConsistencyLevel::High)
            && self.bias_strength.abs() >= 8.0
    }

    pub fn is_ranging_market(&self) -> bool {
        matches!(self.consistency_level, ConsistencyLevel::Conflict)
            || (matches!(self.overall_bias, OverallBias::Neutral) && self.bias_strength < 4.0)
    }
}
