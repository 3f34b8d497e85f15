use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::market::candle::Candle;
use crate::domain::market::structure_break::{BmsState, BmsType, BreakOfMarketStructure, ConfidenceLevel};
use crate::domain::market::swing::SwingPoint;
use crate::domain::market::trend::TrendDirection;

#[derive(Debug, Clone)]
struct BmsCandidate {
    broken_level: SwingPoint,
    bms_type: BmsType,
    break_candle_index: usize,
    break_timestamp: i64,
    break_price: Decimal,
    state: BmsState,
    confirmation_candle_index: Option<usize>,
    confirmation_timestamp: Option<i64>,
}

/// Detects Break of Market Structure patterns: a decisive close-through of a swing high/low,
/// confirmed over a follow-through window, scored for confidence (§4.10).
pub struct MarketStructureBreakDetector {
    min_break_distance_pips: Decimal,
    max_break_distance_pips: Decimal,
    min_follow_through_pips: Decimal,
    confirmation_candles: usize,
    volume_threshold_multiple: Decimal,
    min_confidence_for_confirmed: f64,
    pip_size: Decimal,
    candidates: Vec<BmsCandidate>,
    confirmed: Vec<BreakOfMarketStructure>,
}

impl MarketStructureBreakDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        min_break_distance_pips: Decimal,
        max_break_distance_pips: Decimal,
        min_follow_through_pips: Decimal,
        confirmation_candles: usize,
        volume_threshold_multiple: Decimal,
        min_confidence_for_confirmed: f64,
        pip_size: Decimal,
    ) -> Self {
        Self {
            min_break_distance_pips,
            max_break_distance_pips,
            min_follow_through_pips,
            confirmation_candles,
            volume_threshold_multiple,
            min_confidence_for_confirmed,
            pip_size,
            candidates: Vec::new(),
            confirmed: Vec::new(),
        }
    }

    pub fn detect_bms(
        &mut self,
        candles: &[Candle],
        swing_highs: &[SwingPoint],
        swing_lows: &[SwingPoint],
        start_index: usize,
        current_trend: Option<TrendDirection>,
    ) -> Vec<BreakOfMarketStructure> {
        if candles.is_empty() || (swing_highs.is_empty() && swing_lows.is_empty()) {
            return Vec::new();
        }

        let mut detected = Vec::new();

        for i in start_index..candles.len() {
            let candle = &candles[i];

            for swing_high in swing_highs {
                if swing_high.candle_index >= i {
                    continue;
                }
                if self.has_candidate_or_confirmed(swing_high) {
                    continue;
                }
                if let Some(candidate) = self.check_high_break(candle, swing_high, i) {
                    self.candidates.push(candidate);
                }
            }

            for swing_low in swing_lows {
                if swing_low.candle_index >= i {
                    continue;
                }
                if self.has_candidate_or_confirmed(swing_low) {
                    continue;
                }
                if let Some(candidate) = self.check_low_break(candle, swing_low, i) {
                    self.candidates.push(candidate);
                }
            }

            self.update_candidates(candle, i, candles);
            detected.extend(self.check_confirmations(candles, swing_highs, swing_lows, current_trend));
        }

        self.cleanup_candidates(candles.len().saturating_sub(1));
        detected
    }

    fn has_candidate_or_confirmed(&self, level: &SwingPoint) -> bool {
        self.candidates.iter().any(|c| c.broken_level == *level)
            || self.confirmed.iter().any(|b| b.broken_level == *level)
    }

    fn check_high_break(&self, candle: &Candle, swing_high: &SwingPoint, index: usize) -> Option<BmsCandidate> {
        if candle.high <= swing_high.price {
            return None;
        }
        let break_distance_pips = (candle.high - swing_high.price) / self.pip_size;
        if break_distance_pips < self.min_break_distance_pips || break_distance_pips > self.max_break_distance_pips {
            return None;
        }
        Some(BmsCandidate {
            broken_level: swing_high.clone(),
            bms_type: BmsType::Bullish,
            break_candle_index: index,
            break_timestamp: candle.timestamp_ms,
            break_price: candle.high,
            state: BmsState::Potential,
            confirmation_candle_index: None,
            confirmation_timestamp: None,
        })
    }

    fn check_low_break(&self, candle: &Candle, swing_low: &SwingPoint, index: usize) -> Option<BmsCandidate> {
        if candle.low >= swing_low.price {
            return None;
        }
        let break_distance_pips = (swing_low.price - candle.low) / self.pip_size;
        if break_distance_pips < self.min_break_distance_pips || break_distance_pips > self.max_break_distance_pips {
            return None;
        }
        Some(BmsCandidate {
            broken_level: swing_low.clone(),
            bms_type: BmsType::Bearish,
            break_candle_index: index,
            break_timestamp: candle.timestamp_ms,
            break_price: candle.low,
            state: BmsState::Potential,
            confirmation_candle_index: None,
            confirmation_timestamp: None,
        })
    }

    fn update_candidates(&mut self, candle: &Candle, candle_index: usize, candles: &[Candle]) {
        let min_follow_through_pips = self.min_follow_through_pips;
        let pip_size = self.pip_size;
        for candidate in self.candidates.iter_mut() {
            if candidate.state != BmsState::Potential {
                continue;
            }
            let candles_since_break = candle_index - candidate.break_candle_index;
            if candles_since_break < self.confirmation_candles {
                continue;
            }
            if Self::evaluate_confirmation(candidate, candles, candle_index, min_follow_through_pips, pip_size) {
                candidate.state = BmsState::Confirmed;
                candidate.confirmation_candle_index = Some(candle_index);
                candidate.confirmation_timestamp = Some(candle.timestamp_ms);
            } else {
                candidate.state = BmsState::Invalidated;
            }
        }
    }

    /// Close-beyond, follow-through distance, and no-reversal-back-across gating checks (§4.10).
    fn evaluate_confirmation(
        candidate: &BmsCandidate,
        candles: &[Candle],
        current_index: usize,
        min_follow_through_pips: Decimal,
        pip_size: Decimal,
    ) -> bool {
        let level_price = candidate.broken_level.price;
        let window = &candles[candidate.break_candle_index..=current_index];
        if window.is_empty() {
            return false;
        }

        let last = window.last().unwrap();
        let close_beyond = match candidate.bms_type {
            BmsType::Bullish => last.close > level_price,
            BmsType::Bearish => last.close < level_price,
        };
        if !close_beyond {
            return false;
        }

        let follow_through = match candidate.bms_type {
            BmsType::Bullish => window.iter().map(|c| c.high).max().unwrap() - level_price,
            BmsType::Bearish => level_price - window.iter().map(|c| c.low).min().unwrap(),
        };
        if follow_through / pip_size < min_follow_through_pips {
            return false;
        }

        for candle in &window[1..] {
            let reversed = match candidate.bms_type {
                BmsType::Bullish => candle.close < level_price,
                BmsType::Bearish => candle.close > level_price,
            };
            if reversed {
                return false;
            }
        }

        true
    }

    fn check_confirmations(
        &mut self,
        candles: &[Candle],
        swing_highs: &[SwingPoint],
        swing_lows: &[SwingPoint],
        current_trend: Option<TrendDirection>,
    ) -> Vec<BreakOfMarketStructure> {
        let mut confirmed_out = Vec::new();
        let mut remaining = Vec::new();

        for mut candidate in self.candidates.drain(..) {
            match candidate.state {
                BmsState::Confirmed => {
                    let break_distance_pips = (candidate.break_price - candidate.broken_level.price).abs() / self.pip_size;

                    let window_end = candidate.confirmation_candle_index.unwrap_or(candles.len() - 1) + 1;
                    let window = &candles[candidate.break_candle_index..window_end.min(candles.len())];
                    let level_price = candidate.broken_level.price;
                    let follow_through = match candidate.bms_type {
                        BmsType::Bullish => window.iter().map(|c| c.high).max().unwrap_or(level_price) - level_price,
                        BmsType::Bearish => level_price - window.iter().map(|c| c.low).min().unwrap_or(level_price),
                    };
                    let follow_through_pips = follow_through / self.pip_size;

                    let relevant_swings: &[SwingPoint] = if candidate.broken_level.is_high { swing_highs } else { swing_lows };
                    let structure_significance = self.calculate_structure_significance(&candidate.broken_level, relevant_swings, candles);

                    let (confidence, confidence_level, volume_confirmed) = self.calculate_confidence(
                        &candidate,
                        break_distance_pips,
                        follow_through_pips,
                        structure_significance,
                        candles,
                        current_trend,
                    );

                    if confidence >= self.min_confidence_for_confirmed {
                        let bms = BreakOfMarketStructure {
                            bms_type: candidate.bms_type,
                            broken_level: candidate.broken_level.clone(),
                            break_ts: candidate.break_timestamp,
                            break_index: candidate.break_candle_index,
                            confirmation_ts: candidate.confirmation_timestamp,
                            break_distance: break_distance_pips,
                            follow_through_distance: follow_through_pips,
                            confidence,
                            confidence_level,
                            state: BmsState::Confirmed,
                            volume_confirmation: volume_confirmed,
                            structure_significance,
                        };
                        self.confirmed.push(bms.clone());
                        confirmed_out.push(bms);
                    }
                }
                BmsState::Potential => remaining.push(candidate),
                BmsState::Invalidated => {}
            }
        }

        self.candidates = remaining;
        confirmed_out
    }

    /// Significance in `[0, 100]`: swing strength (0-30) + historical touches (0-25) +
    /// recency (0-25) + relative-to-recent-swings position (0-20).
    fn calculate_structure_significance(&self, broken_level: &SwingPoint, all_swings: &[SwingPoint], candles: &[Candle]) -> f64 {
        const MAX_SWING_STRENGTH: f64 = 10.0;
        let swing_score = ((broken_level.strength as f64 / MAX_SWING_STRENGTH) * 30.0).min(30.0);

        let tolerance = Decimal::from(2) * self.pip_size;
        let touch_count = candles[..broken_level.candle_index.min(candles.len())]
            .iter()
            .filter(|c| {
                let diff = if broken_level.is_high { (c.high - broken_level.price).abs() } else { (c.low - broken_level.price).abs() };
                diff <= tolerance
            })
            .count();
        let touch_score = (touch_count as f64 * 5.0).min(25.0);

        let candles_since_formation = candles.len() as f64 - broken_level.candle_index as f64;
        let max_age = 100.0;
        let recency_ratio = (1.0 - candles_since_formation / max_age).max(0.0);
        let recency_score = recency_ratio * 25.0;

        let recent_swings: Vec<&SwingPoint> = all_swings
            .iter()
            .filter(|s| s.candle_index < broken_level.candle_index)
            .rev()
            .take(5)
            .collect();
        let relative_score = if recent_swings.is_empty() {
            10.0
        } else if broken_level.is_high {
            let max_price = recent_swings.iter().map(|s| s.price).max().unwrap();
            if broken_level.price == max_price { 20.0 } else { 10.0 }
        } else {
            let min_price = recent_swings.iter().map(|s| s.price).min().unwrap();
            if broken_level.price == min_price { 20.0 } else { 10.0 }
        };

        (swing_score + touch_score + recency_score + relative_score).clamp(0.0, 100.0)
    }

    /// Confidence in `[0, 100]`: break cleanliness (0-25) + follow-through (0-30) + structure
    /// significance (0-25) + volume confirmation (0-15) + trend alignment (0-5).
    fn calculate_confidence(
        &self,
        candidate: &BmsCandidate,
        break_distance_pips: Decimal,
        follow_through_pips: Decimal,
        structure_significance: f64,
        candles: &[Candle],
        current_trend: Option<TrendDirection>,
    ) -> (f64, ConfidenceLevel, bool) {
        let ideal_break = dec(5.0);
        let break_ratio = (break_distance_pips / ideal_break).to_f64().unwrap_or(0.0).min(1.0);
        let break_score = break_ratio * 25.0;

        let ideal_follow_through = dec(10.0);
        let follow_through_ratio = (follow_through_pips / ideal_follow_through).to_f64().unwrap_or(0.0).min(1.0);
        let follow_through_score = follow_through_ratio * 30.0;

        let significance_score = structure_significance * 0.25;

        let avg_volume = if candles.is_empty() {
            Decimal::ONE
        } else {
            candles.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(candles.len())
        };
        let break_candle = &candles[candidate.break_candle_index];
        let volume_ratio = if avg_volume > Decimal::ZERO { break_candle.volume / avg_volume } else { Decimal::ONE };
        let volume_confirmed = volume_ratio >= self.volume_threshold_multiple;
        let volume_ratio_f64 = volume_ratio.to_f64().unwrap_or(0.0);
        let volume_score = if volume_confirmed { (volume_ratio_f64 * 10.0).min(15.0) } else { 5.0 };

        let trend_score = match current_trend {
            Some(TrendDirection::Uptrend) if candidate.bms_type == BmsType::Bullish => 5.0,
            Some(TrendDirection::Downtrend) if candidate.bms_type == BmsType::Bearish => 5.0,
            _ => 0.0,
        };

        let total = (break_score + follow_through_score + significance_score + volume_score + trend_score).clamp(0.0, 100.0);
        (total, ConfidenceLevel::from_confidence(total), volume_confirmed)
    }

    fn cleanup_candidates(&mut self, current_index: usize) {
        let max_candles_for_decision = self.confirmation_candles + 5;
        self.candidates.retain(|c| {
            c.state == BmsState::Potential && current_index.saturating_sub(c.break_candle_index) <= max_candles_for_decision
        });
    }

    pub fn confirmed_bms(&self) -> &[BreakOfMarketStructure] {
        &self.confirmed
    }

    pub fn active_candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn clear_history(&mut self) {
        self.confirmed.clear();
        self.candidates.clear();
    }
}

fn dec(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

impl Default for MarketStructureBreakDetector {
    fn default() -> Self {
        Self::new(dec(2.0), dec(50.0), dec(5.0), 3, dec(1.2), 60.0, dec(0.0001))
    }
}
