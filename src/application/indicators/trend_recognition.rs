use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::market::candle::Candle;
use crate::domain::market::swing::SwingPoint;
use crate::domain::market::trend::{StrengthLevel, SwingPattern, TrendDirection, TrendState, TrendStructure};

/// Detects HH/HL/LH/LL swing patterns, classifies overall trend direction and strength, and
/// reports trend changes with noise filtering via ATR (§4.9).
pub struct TrendRecognitionEngine {
    min_swing_strength: usize,
    min_patterns_for_confirmation: usize,
    min_price_change_atr_multiple: f64,
    atr_period: usize,
    transition_threshold: f64,
    current_trend: Option<TrendState>,
}

impl TrendRecognitionEngine {
    pub fn new(
        min_swing_strength: usize,
        min_patterns_for_confirmation: usize,
        min_price_change_atr_multiple: f64,
        atr_period: usize,
        transition_threshold: f64,
    ) -> Self {
        Self {
            min_swing_strength,
            min_patterns_for_confirmation,
            min_price_change_atr_multiple,
            atr_period,
            transition_threshold,
            current_trend: None,
        }
    }

    /// Average true range over the last `atr_period` candles; `0.0` if there aren't enough.
    pub fn calculate_atr(&self, candles: &[Candle]) -> f64 {
        if candles.len() < self.atr_period {
            return 0.0;
        }
        let true_ranges: Vec<Decimal> = (1..candles.len())
            .map(|i| {
                let high = candles[i].high;
                let low = candles[i].low;
                let prev_close = candles[i - 1].close;
                (high - low).max((high - prev_close).abs()).max((low - prev_close).abs())
            })
            .collect();
        let relevant = &true_ranges[true_ranges.len().saturating_sub(self.atr_period)..];
        if relevant.is_empty() {
            return 0.0;
        }
        let sum: Decimal = relevant.iter().copied().sum();
        (sum / Decimal::from(relevant.len())).to_f64().unwrap_or(0.0)
    }

    fn is_significant_move(&self, price_change: Decimal, candles: &[Candle]) -> bool {
        let atr = self.calculate_atr(candles);
        if atr == 0.0 {
            return true;
        }
        let min_change = atr * self.min_price_change_atr_multiple;
        let change_f64 = price_change.abs().to_f64().unwrap_or(f64::MAX);
        change_f64 >= min_change
    }

    fn identify_pattern(&self, current: &SwingPoint, previous: &SwingPoint) -> Option<SwingPattern> {
        if current.is_high && previous.is_high {
            Some(if current.price > previous.price { SwingPattern::Hh } else { SwingPattern::Lh })
        } else if !current.is_high && !previous.is_high {
            Some(if current.price > previous.price { SwingPattern::Hl } else { SwingPattern::Ll })
        } else {
            None
        }
    }

    fn structures_from_swings(&self, swings: &[SwingPoint], candles: &[Candle]) -> Vec<(usize, TrendStructure)> {
        let mut out = Vec::new();
        for i in 1..swings.len() {
            let current = &swings[i];
            let previous = &swings[i - 1];
            let price_change = current.price - previous.price;
            if !self.is_significant_move(price_change, candles) {
                continue;
            }
            let Some(pattern) = self.identify_pattern(current, previous) else { continue };
            let swing_length = current.candle_index - previous.candle_index;
            let price_change_pct: f64 = if previous.price.is_zero() {
                0.0
            } else {
                (price_change / previous.price).to_f64().unwrap_or(0.0) * 100.0
            };
            out.push((
                current.candle_index,
                TrendStructure {
                    pattern,
                    price: current.price,
                    previous_swing_price: previous.price,
                    swing_length,
                    price_change,
                    price_change_pct,
                },
            ));
        }
        out
    }

    /// Detects HH/LH patterns among swing highs and HL/LL among swing lows, merges and sorts
    /// by candle index, then classifies the overall direction.
    pub fn analyze_trend_patterns(&self, candles: &[Candle], swing_highs: &[SwingPoint], swing_lows: &[SwingPoint]) -> (Vec<TrendStructure>, TrendDirection) {
        let mut indexed: Vec<(usize, TrendStructure)> = self.structures_from_swings(swing_highs, candles);
        indexed.extend(self.structures_from_swings(swing_lows, candles));
        indexed.sort_by_key(|(idx, _)| *idx);
        let structures: Vec<TrendStructure> = indexed.into_iter().map(|(_, s)| s).collect();
        let direction = self.determine_trend_direction(&structures);
        (structures, direction)
    }

    fn determine_trend_direction(&self, structures: &[TrendStructure]) -> TrendDirection {
        if structures.is_empty() {
            return TrendDirection::Ranging;
        }
        let bullish_patterns = structures.iter().filter(|s| s.pattern.is_bullish()).count();
        let total = structures.len();
        let bullish_ratio = bullish_patterns as f64 / total as f64;

        let recent_count = structures.len().min(5);
        let recent = &structures[structures.len() - recent_count..];
        let recent_bullish = recent.iter().filter(|s| s.pattern.is_bullish()).count() as i64;
        let recent_bearish = recent.iter().filter(|s| !s.pattern.is_bullish()).count() as i64;

        if bullish_ratio >= 0.65 && recent_bullish >= recent_bearish {
            TrendDirection::Uptrend
        } else if bullish_ratio <= 0.35 && recent_bearish >= recent_bullish {
            TrendDirection::Downtrend
        } else if (recent_bullish - recent_bearish).abs() <= 1 {
            TrendDirection::Ranging
        } else {
            TrendDirection::Transition
        }
    }

    fn count_max_consecutive(&self, structures: &[TrendStructure], direction: TrendDirection) -> usize {
        let mut max_count = 0usize;
        let mut current = 0usize;
        for s in structures {
            let aligned = match direction {
                TrendDirection::Uptrend => s.pattern.is_bullish(),
                TrendDirection::Downtrend => !s.pattern.is_bullish(),
                _ => false,
            };
            if aligned {
                current += 1;
                max_count = max_count.max(current);
            } else {
                current = 0;
            }
        }
        max_count
    }

    /// Strength in `[0, 100]`: pattern consistency (0-35) + max-consecutive (0-30) + average
    /// |price change %| (0-25) + recent momentum over the last 3 (0-10).
    pub fn calculate_trend_strength(&self, structures: &[TrendStructure], direction: TrendDirection) -> (f64, StrengthLevel) {
        if structures.is_empty() || direction == TrendDirection::Ranging {
            return (0.0, StrengthLevel::VeryWeak);
        }

        let aligned: Vec<&TrendStructure> = structures
            .iter()
            .filter(|s| match direction {
                TrendDirection::Uptrend => s.pattern.is_bullish(),
                TrendDirection::Downtrend => !s.pattern.is_bullish(),
                _ => false,
            })
            .collect();

        let consistency_ratio = aligned.len() as f64 / structures.len() as f64;
        let consistency_score = consistency_ratio * 35.0;

        let max_consecutive = self.count_max_consecutive(structures, direction);
        let consecutive_score = ((max_consecutive * 6) as f64).min(30.0);

        let avg_price_change = if aligned.is_empty() {
            0.0
        } else {
            aligned.iter().map(|s| s.price_change_pct.abs()).sum::<f64>() / aligned.len() as f64
        };
        let price_change_score = (avg_price_change * 5.0).min(25.0);

        let recent_count = structures.len().min(3);
        let recent = &structures[structures.len() - recent_count..];
        let recent_aligned = recent
            .iter()
            .filter(|s| match direction {
                TrendDirection::Uptrend => s.pattern.is_bullish(),
                TrendDirection::Downtrend => !s.pattern.is_bullish(),
                _ => false,
            })
            .count();
        let momentum_score = if recent_count > 0 { (recent_aligned as f64 / recent_count as f64) * 10.0 } else { 0.0 };

        let total = (consistency_score + consecutive_score + price_change_score + momentum_score).clamp(0.0, 100.0);
        (total, StrengthLevel::from_strength(total))
    }

    /// Re-analyzes the given candles/swings and returns a new `TrendState` if the direction
    /// changed, or the strength moved by more than `transition_threshold` since the last call.
    pub fn detect_trend_change(&mut self, candles: &[Candle], swing_highs: &[SwingPoint], swing_lows: &[SwingPoint]) -> Option<TrendState> {
        let (structures, direction) = self.analyze_trend_patterns(candles, swing_highs, swing_lows);
        if structures.is_empty() {
            return None;
        }
        let (strength, strength_level) = self.calculate_trend_strength(&structures, direction);

        let is_change = match &self.current_trend {
            None => true,
            Some(prev) => prev.direction != direction || (prev.strength - strength).abs() > self.transition_threshold,
        };
        if !is_change {
            return None;
        }

        let new_trend = TrendState {
            direction,
            strength,
            strength_level,
            pattern_count: structures.len(),
            consecutive_patterns: self.count_max_consecutive(&structures, direction),
            is_confirmed: structures.len() >= self.min_patterns_for_confirmation,
        };
        self.current_trend = Some(new_trend.clone());
        Some(new_trend)
    }

    pub fn current_trend(&self) -> Option<&TrendState> {
        self.current_trend.as_ref()
    }

    pub fn clear_history(&mut self) {
        self.current_trend = None;
    }
}

impl Default for TrendRecognitionEngine {
    fn default() -> Self {
        Self::new(3, 2, 0.5, 14, 40.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn candle(i: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new("BTCUSDT", Timeframe::OneMin, i * 60_000, close, high, low, close, dec!(1), true).unwrap()
    }

    fn swing(price: Decimal, index: usize, is_high: bool) -> SwingPoint {
        SwingPoint::new(price, index as i64 * 60_000, index, is_high, 3, dec!(1))
    }

    #[test]
    fn identifies_higher_high_and_higher_low_as_uptrend() {
        let engine = TrendRecognitionEngine::new(3, 2, 0.0, 1, 40.0);
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, dec!(110), dec!(90), dec!(100))).collect();
        let highs = vec![swing(dec!(100), 1, true), swing(dec!(105), 5, true)];
        let lows = vec![swing(dec!(90), 2, false), swing(dec!(95), 6, false)];
        let (structures, direction) = engine.analyze_trend_patterns(&candles, &highs, &lows);
        assert_eq!(structures.len(), 2);
        assert_eq!(direction, TrendDirection::Uptrend);
    }

    #[test]
    fn no_structures_yields_ranging() {
        let engine = TrendRecognitionEngine::default();
        let (structures, direction) = engine.analyze_trend_patterns(&[], &[], &[]);
        assert!(structures.is_empty());
        assert_eq!(direction, TrendDirection::Ranging);
    }

    #[test]
    fn first_detection_always_reports_a_change() {
        let mut engine = TrendRecognitionEngine::new(3, 2, 0.0, 1, 40.0);
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, dec!(110), dec!(90), dec!(100))).collect();
        let highs = vec![swing(dec!(100), 1, true), swing(dec!(105), 5, true)];
        let lows = vec![swing(dec!(90), 2, false), swing(dec!(95), 6, false)];
        let trend = engine.detect_trend_change(&candles, &highs, &lows);
        assert!(trend.is_some());
        assert_eq!(engine.current_trend().unwrap().direction, TrendDirection::Uptrend);
    }
}
