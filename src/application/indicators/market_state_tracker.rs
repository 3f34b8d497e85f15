use crate::domain::events::{Event, EventPayload, EventType, MarketStructureChangePayload};
use crate::domain::market::liquidity::LiquidityType;
use crate::domain::market::market_state::{MarketState, MarketStateData};
use crate::domain::market::structure_break::{BmsType, BreakOfMarketStructure};
use crate::domain::market::sweep::{LiquiditySweep, SweepDirection};
use crate::domain::market::trend::{TrendDirection, TrendState};

/// Composes trend, BMS, and liquidity-sweep signals into a single `MarketStateData` per
/// timeframe, gating state-change emission on a confidence jump (§4.11). No direct
/// original-source counterpart exists; the composition rules are taken verbatim from the
/// expanded specification.
pub struct MarketStateTracker {
    min_trend_strength: f64,
    min_bms_for_confirmation: usize,
    state_change_threshold: f64,
    min_confidence_for_state: f64,
    previous: Option<MarketStateData>,
}

impl MarketStateTracker {
    pub fn new(min_trend_strength: f64, min_bms_for_confirmation: usize, state_change_threshold: f64, min_confidence_for_state: f64) -> Self {
        Self { min_trend_strength, min_bms_for_confirmation, state_change_threshold, min_confidence_for_state, previous: None }
    }

    /// Composes the current `MarketStateData` from the latest trend/BMS/sweep readings.
    pub fn compose(&self, trend: &TrendState, recent_bms: &[BreakOfMarketStructure], recent_sweeps: &[LiquiditySweep], current_ts: i64) -> MarketStateData {
        let state = self.derive_state(trend, recent_bms);
        let confidence = self.calculate_confidence(trend, recent_bms, recent_sweeps, &state);
        let liquidity_profile = Self::liquidity_profile(recent_sweeps);

        let (state_duration_candles, state_start_ts) = match &self.previous {
            Some(prev) if prev.state == state => (prev.state_duration_candles + 1, prev.state_start_ts),
            _ => (0, current_ts),
        };

        MarketStateData {
            state,
            trend_direction: trend.direction,
            trend_strength: trend.strength,
            bms_count: recent_bms.len(),
            last_bms: recent_bms.last().cloned(),
            liquidity_profile,
            state_duration_candles,
            state_start_ts,
            confidence,
        }
    }

    fn derive_state(&self, trend: &TrendState, recent_bms: &[BreakOfMarketStructure]) -> MarketState {
        if trend.direction == TrendDirection::Transition {
            return MarketState::Transitioning;
        }
        if trend.direction == TrendDirection::Ranging
            || trend.strength < self.min_trend_strength
            || recent_bms.len() < self.min_bms_for_confirmation
        {
            return MarketState::Ranging;
        }
        match trend.direction {
            TrendDirection::Uptrend if recent_bms.iter().any(|b| b.bms_type == BmsType::Bullish) => MarketState::Bullish,
            TrendDirection::Downtrend if recent_bms.iter().any(|b| b.bms_type == BmsType::Bearish) => MarketState::Bearish,
            _ => MarketState::Ranging,
        }
    }

    /// `trend_conf` (0-40, only when confirmed) + `bms_conf` (0-35, average BMS confidence) +
    /// `liquidity_alignment` (0-25 from sweep-side imbalance, 15 when no sweeps).
    fn calculate_confidence(&self, trend: &TrendState, recent_bms: &[BreakOfMarketStructure], recent_sweeps: &[LiquiditySweep], state: &MarketState) -> f64 {
        let trend_conf = if trend.is_confirmed && !matches!(state, MarketState::Ranging) {
            (trend.strength / 100.0) * 40.0
        } else {
            0.0
        };

        let bms_conf = if recent_bms.is_empty() {
            0.0
        } else {
            let avg = recent_bms.iter().map(|b| b.confidence).sum::<f64>() / recent_bms.len() as f64;
            (avg / 100.0) * 35.0
        };

        let liquidity_alignment = if recent_sweeps.is_empty() {
            15.0
        } else {
            Self::liquidity_profile(recent_sweeps).abs() * 25.0
        };

        (trend_conf + bms_conf + liquidity_alignment).clamp(0.0, 100.0)
    }

    /// Net bullish-vs-bearish sweep imbalance in `[-1, 1]`: a bullish sweep (sell-side swept)
    /// counts `+1`, a bearish sweep (buy-side swept) counts `-1`.
    fn liquidity_profile(recent_sweeps: &[LiquiditySweep]) -> f64 {
        if recent_sweeps.is_empty() {
            return 0.0;
        }
        let net: i64 = recent_sweeps
            .iter()
            .map(|s| match (s.direction, s.level.level_type) {
                (SweepDirection::Bullish, LiquidityType::SellSide) => 1,
                (SweepDirection::Bearish, LiquidityType::BuySide) => -1,
                _ => 0,
            })
            .sum();
        (net as f64 / recent_sweeps.len() as f64).clamp(-1.0, 1.0)
    }

    /// Updates internal state and returns a `MarketStructureChange` event (priority 10) when
    /// the change-gating condition in §4.11 is met.
    pub fn update(&mut self, symbol: &str, timeframe: crate::domain::market::timeframe::Timeframe, trend: &TrendState, recent_bms: &[BreakOfMarketStructure], recent_sweeps: &[LiquiditySweep], current_ts: i64) -> Option<Event> {
        let current = self.compose(trend, recent_bms, recent_sweeps, current_ts);

        let is_change = match &self.previous {
            None => true,
            Some(prev) => prev.state != current.state || (current.confidence - prev.confidence) >= self.state_change_threshold,
        };

        if !is_change || current.confidence < self.min_confidence_for_state {
            self.previous = Some(current);
            return None;
        }

        let previous = self.previous.replace(current.clone());
        Some(Event::new(
            10,
            EventType::MarketStructureChange,
            EventPayload::MarketStructureChange(MarketStructureChangePayload {
                symbol: symbol.to_string(),
                timeframe,
                previous,
                current,
            }),
            "market_state_tracker",
        ))
    }

    pub fn current(&self) -> Option<&MarketStateData> {
        self.previous.as_ref()
    }
}

impl Default for MarketStateTracker {
    fn default() -> Self {
        Self::new(40.0, 1, 10.0, 50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::liquidity::{LiquidityLevel, LiquidityState};
    use crate::domain::market::structure_break::{BmsState, ConfidenceLevel};
    use crate::domain::market::swing::SwingPoint;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::market::trend::StrengthLevel;
    use rust_decimal_macros::dec;

    fn trend(direction: TrendDirection, strength: f64, confirmed: bool) -> TrendState {
        TrendState {
            direction,
            strength,
            strength_level: StrengthLevel::from_strength(strength),
            pattern_count: 3,
            consecutive_patterns: 2,
            is_confirmed: confirmed,
        }
    }

    fn bullish_bms() -> BreakOfMarketStructure {
        BreakOfMarketStructure {
            bms_type: BmsType::Bullish,
            broken_level: SwingPoint::new(dec!(1.1), 0, 0, true, 3, dec!(1)),
            break_ts: 0,
            break_index: 0,
            confirmation_ts: None,
            break_distance: dec!(5),
            follow_through_distance: dec!(10),
            confidence: 80.0,
            confidence_level: ConfidenceLevel::High,
            state: BmsState::Confirmed,
            volume_confirmation: true,
            structure_significance: 70.0,
        }
    }

    #[test]
    fn ranging_trend_yields_ranging_state_regardless_of_bms() {
        let tracker = MarketStateTracker::default();
        let t = trend(TrendDirection::Ranging, 80.0, true);
        let state = tracker.compose(&t, &[bullish_bms()], &[], 0);
        assert_eq!(state.state, MarketState::Ranging);
    }

    #[test]
    fn confirmed_uptrend_with_bullish_bms_yields_bullish() {
        let tracker = MarketStateTracker::default();
        let t = trend(TrendDirection::Uptrend, 80.0, true);
        let state = tracker.compose(&t, &[bullish_bms()], &[], 0);
        assert_eq!(state.state, MarketState::Bullish);
        assert!(state.confidence > 0.0);
    }

    #[test]
    fn first_state_always_emits_a_change_event() {
        let mut tracker = MarketStateTracker::new(40.0, 1, 10.0, 0.0);
        let t = trend(TrendDirection::Uptrend, 80.0, true);
        let event = tracker.update("BTCUSDT", Timeframe::OneHour, &t, &[bullish_bms()], &[], 0);
        assert!(event.is_some());
    }

    #[test]
    fn liquidity_profile_is_zero_with_no_sweeps() {
        assert_eq!(MarketStateTracker::liquidity_profile(&[]), 0.0);
        let _ = LiquidityLevel::new(LiquidityType::BuySide, dec!(1), 0, 0, "X", Timeframe::OneMin, dec!(1), dec!(1));
        let _ = LiquidityState::Active;
    }
}
