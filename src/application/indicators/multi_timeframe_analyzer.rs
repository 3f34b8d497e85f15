use crate::domain::market::market_state::{MarketState, MarketStateData};
use crate::domain::market::multi_timeframe::{ConsistencyLevel, MultiTimeframeStructure, OverallBias};
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::trend::TrendDirection;

/// Integrates independently-computed H1/M15/M1 `MarketStateData` into a single cross-timeframe
/// view (§4.12). H1 is always primary and dominates conflict resolution. No direct
/// original-source counterpart exists; the integration rules are taken verbatim from the
/// expanded specification.
#[derive(Default)]
pub struct MultiTimeframeAnalyzer;

impl MultiTimeframeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, h1: MarketStateData, m15: MarketStateData, m1: MarketStateData) -> MultiTimeframeStructure {
        let consistency_level = Self::consistency(&h1, &m15, &m1);
        let (overall_bias, bias_strength) = Self::bias(&h1, &m15, &m1);
        let conflicts = Self::conflicts(&h1, &m15, &m1);
        let recommendations = Self::recommendations(&overall_bias, bias_strength, &consistency_level, &conflicts);

        MultiTimeframeStructure {
            h1_structure: h1,
            m15_structure: m15,
            m1_structure: m1,
            consistency_level,
            overall_bias,
            bias_strength,
            primary_timeframe: Timeframe::OneHour,
            conflicts,
            recommendations,
        }
    }

    fn direction_agrees(a: &MarketStateData, b: &MarketStateData) -> bool {
        a.trend_direction == b.trend_direction
    }

    /// PERFECT when all three agree on direction and strengths are close; CONFLICT when H1
    /// disagrees with both secondaries; otherwise HIGH/MODERATE/LOW scaled by how much
    /// agreement and strength alignment survive.
    fn consistency(h1: &MarketStateData, m15: &MarketStateData, m1: &MarketStateData) -> ConsistencyLevel {
        let h1_m15 = Self::direction_agrees(h1, m15);
        let h1_m1 = Self::direction_agrees(h1, m1);
        let m15_m1 = Self::direction_agrees(m15, m1);

        let strength_gap = |a: &MarketStateData, b: &MarketStateData| (a.trend_strength - b.trend_strength).abs();
        let strengths_aligned = strength_gap(h1, m15) <= 20.0 && strength_gap(h1, m1) <= 20.0;

        if h1_m15 && h1_m1 && m15_m1 && strengths_aligned {
            ConsistencyLevel::Perfect
        } else if h1_m15 && h1_m1 {
            ConsistencyLevel::High
        } else if !h1_m15 && !h1_m1 {
            ConsistencyLevel::Conflict
        } else if h1_m15 || h1_m1 {
            ConsistencyLevel::Moderate
        } else {
            ConsistencyLevel::Low
        }
    }

    fn direction_score(direction: TrendDirection, strength: f64) -> f64 {
        match direction {
            TrendDirection::Uptrend => strength / 10.0,
            TrendDirection::Downtrend => -strength / 10.0,
            TrendDirection::Ranging | TrendDirection::Transition => 0.0,
        }
    }

    /// Weighted H1-dominant combination of per-timeframe direction scores, mapped onto the
    /// 5-bucket `OverallBias` enum. Weights: H1 0.6, M15 0.3, M1 0.1.
    fn bias(h1: &MarketStateData, m15: &MarketStateData, m1: &MarketStateData) -> (OverallBias, f64) {
        let score = Self::direction_score(h1.trend_direction, h1.trend_strength) * 0.6
            + Self::direction_score(m15.trend_direction, m15.trend_strength) * 0.3
            + Self::direction_score(m1.trend_direction, m1.trend_strength) * 0.1;
        let bias_strength = score.clamp(-10.0, 10.0);

        let overall_bias = if bias_strength >= 6.0 {
            OverallBias::StronglyBullish
        } else if bias_strength >= 2.0 {
            OverallBias::Bullish
        } else if bias_strength <= -6.0 {
            OverallBias::StronglyBearish
        } else if bias_strength <= -2.0 {
            OverallBias::Bearish
        } else {
            OverallBias::Neutral
        };

        (overall_bias, bias_strength)
    }

    /// Lists each secondary timeframe that disagrees with H1's direction; H1 itself is never
    /// listed as a conflict since it is always primary.
    fn conflicts(h1: &MarketStateData, m15: &MarketStateData, m1: &MarketStateData) -> Vec<String> {
        let mut conflicts = Vec::new();
        if !Self::direction_agrees(h1, m15) {
            conflicts.push(format!(
                "M15 ({:?}) conflicts with H1 ({:?})",
                m15.trend_direction, h1.trend_direction
            ));
        }
        if !Self::direction_agrees(h1, m1) {
            conflicts.push(format!(
                "M1 ({:?}) conflicts with H1 ({:?})",
                m1.trend_direction, h1.trend_direction
            ));
        }
        conflicts
    }

    fn recommendations(bias: &OverallBias, bias_strength: f64, consistency: &ConsistencyLevel, conflicts: &[String]) -> Vec<String> {
        let mut out = Vec::new();

        if matches!(consistency, ConsistencyLevel::Conflict) || matches!(consistency, ConsistencyLevel::Low) {
            out.push("Timeframes disagree on direction; avoid new directional entries until alignment improves.".to_string());
            for conflict in conflicts {
                out.push(conflict.clone());
            }
            return out;
        }

        match bias {
            OverallBias::StronglyBullish => out.push(format!("Strong bullish alignment across timeframes (strength {:.1}); favor long entries.", bias_strength)),
            OverallBias::Bullish => out.push(format!("Bullish bias (strength {:.1}); long entries favored with tighter risk.", bias_strength)),
            OverallBias::StronglyBearish => out.push(format!("Strong bearish alignment across timeframes (strength {:.1}); favor short entries.", bias_strength)),
            OverallBias::Bearish => out.push(format!("Bearish bias (strength {:.1}); short entries favored with tighter risk.", bias_strength)),
            OverallBias::Neutral => out.push("No dominant directional bias; range-bound tactics are more appropriate.".to_string()),
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::trend::TrendDirection;

    fn state(direction: TrendDirection, strength: f64) -> MarketStateData {
        MarketStateData {
            state: MarketState::Bullish,
            trend_direction: direction,
            trend_strength: strength,
            bms_count: 1,
            last_bms: None,
            liquidity_profile: 0.0,
            state_duration_candles: 5,
            state_start_ts: 0,
            confidence: 70.0,
        }
    }

    #[test]
    fn full_agreement_yields_perfect_consistency_and_strongly_bullish_bias() {
        let analyzer = MultiTimeframeAnalyzer::new();
        let structure = analyzer.analyze(
            state(TrendDirection::Uptrend, 90.0),
            state(TrendDirection::Uptrend, 85.0),
            state(TrendDirection::Uptrend, 80.0),
        );
        assert_eq!(structure.consistency_level, ConsistencyLevel::Perfect);
        assert_eq!(structure.overall_bias, OverallBias::StronglyBullish);
        assert!(structure.conflicts.is_empty());
        assert!(structure.is_strong_trend());
    }

    #[test]
    fn h1_disagreeing_with_both_secondaries_is_conflict() {
        let analyzer = MultiTimeframeAnalyzer::new();
        let structure = analyzer.analyze(
            state(TrendDirection::Downtrend, 70.0),
            state(TrendDirection::Uptrend, 70.0),
            state(TrendDirection::Uptrend, 70.0),
        );
        assert_eq!(structure.consistency_level, ConsistencyLevel::Conflict);
        assert_eq!(structure.conflicts.len(), 2);
        assert!(structure.recommendations[0].contains("disagree"));
    }

    #[test]
    fn h1_primary_timeframe_is_always_one_hour() {
        let analyzer = MultiTimeframeAnalyzer::new();
        let structure = analyzer.analyze(
            state(TrendDirection::Ranging, 10.0),
            state(TrendDirection::Ranging, 10.0),
            state(TrendDirection::Ranging, 10.0),
        );
        assert_eq!(structure.primary_timeframe, Timeframe::OneHour);
        assert_eq!(structure.overall_bias, OverallBias::Neutral);
    }
}
