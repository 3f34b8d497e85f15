use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingPattern {
    /// Higher High
    Hh,
    /// Higher Low
    Hl,
    /// Lower High
    Lh,
    /// Lower Low
    Ll,
}

impl SwingPattern {
    pub fn is_bullish(&self) -> bool {
        matches!(self, SwingPattern::Hh | SwingPattern::Hl)
    }
}

/// One classified pattern label between a swing pair (§3, §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendStructure {
    pub pattern: SwingPattern,
    pub price: Decimal,
    pub previous_swing_price: Decimal,
    pub swing_length: usize,
    pub price_change: Decimal,
    pub price_change_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Ranging,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrengthLevel {
    VeryWeak,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl StrengthLevel {
    /// Buckets: 0-20 VERY_WEAK, 21-40 WEAK, 41-60 MODERATE, 61-80 STRONG, 81-100 VERY_STRONG
    /// (§4.9).
    pub fn from_strength(strength: f64) -> Self {
        if strength <= 20.0 {
            StrengthLevel::VeryWeak
        } else if strength <= 40.0 {
            StrengthLevel::Weak
        } else if strength <= 60.0 {
            StrengthLevel::Moderate
        } else if strength <= 80.0 {
            StrengthLevel::Strong
        } else {
            StrengthLevel::VeryStrong
        }
    }
}

/// Composite trend state for one timeframe (§3, §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendState {
    pub direction: TrendDirection,
    /// `[0, 100]`
    pub strength: f64,
    pub strength_level: StrengthLevel,
    pub pattern_count: usize,
    pub consecutive_patterns: usize,
    pub is_confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_level_buckets() {
        assert_eq!(StrengthLevel::from_strength(0.0), StrengthLevel::VeryWeak);
        assert_eq!(StrengthLevel::from_strength(20.0), StrengthLevel::VeryWeak);
        assert_eq!(StrengthLevel::from_strength(21.0), StrengthLevel::Weak);
        assert_eq!(StrengthLevel::from_strength(60.0), StrengthLevel::Moderate);
        assert_eq!(StrengthLevel::from_strength(80.0), StrengthLevel::Strong);
        assert_eq!(StrengthLevel::from_strength(81.0), StrengthLevel::VeryStrong);
        assert_eq!(StrengthLevel::from_strength(100.0), StrengthLevel::VeryStrong);
    }

    #[test]
    fn swing_pattern_bullish() {
        assert!(SwingPattern::Hh.is_bullish());
        assert!(SwingPattern::Hl.is_bullish());
        assert!(!SwingPattern::Lh.is_bullish());
        assert!(!SwingPattern::Ll.is_bullish());
    }
}
