use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::swing::SwingPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmsType {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmsState {
    Potential,
    Confirmed,
    Invalidated,
}

/// `Low` 0-40, `Medium` 41-70, `High` 71-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 71.0 {
            ConfidenceLevel::High
        } else if confidence >= 41.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Break of Market Structure (§3, §4.10): a decisive close-through and follow-through past a
/// prior swing high/low, confirming a structural direction change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakOfMarketStructure {
    pub bms_type: BmsType,
    pub broken_level: SwingPoint,
    pub break_ts: i64,
    pub break_index: usize,
    pub confirmation_ts: Option<i64>,
    pub break_distance: Decimal,
    pub follow_through_distance: Decimal,
    /// `[0, 100]`
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub state: BmsState,
    pub volume_confirmation: bool,
    /// `[0, 100]`
    pub structure_significance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_level_buckets_match_break_score_thresholds() {
        assert_eq!(ConfidenceLevel::from_confidence(0.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_confidence(40.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_confidence(41.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(70.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(71.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(100.0), ConfidenceLevel::High);
    }
}
