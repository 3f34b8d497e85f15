use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::liquidity::LiquidityLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    Bullish,
    Bearish,
}

/// Completed liquidity sweep (§3): a breach of a level followed by a close on the wrong side
/// and a confirmed reversal back across. Produced by `LiquiditySweepDetector` only once its
/// internal three-phase candidate state machine reaches `SweepCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySweep {
    pub level: LiquidityLevel,
    pub direction: SweepDirection,
    pub breach_ts: i64,
    pub breach_index: usize,
    pub close_ts: Option<i64>,
    pub reversal_ts: Option<i64>,
    pub reversal_index: Option<usize>,
    pub breach_distance_pips: Decimal,
    /// `[0, 100]`
    pub reversal_strength: Decimal,
    pub is_valid: bool,
}
