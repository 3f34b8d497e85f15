use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::domain::market::candle::Candle;
use crate::domain::market::liquidity::{LiquidityLevel, LiquidityType};
use crate::domain::market::sweep::{LiquiditySweep, SweepDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepState {
    Breached,
    CloseConfirmed,
    SweepCompleted,
}

#[derive(Debug, Clone)]
struct SweepCandidate {
    level: LiquidityLevel,
    direction: SweepDirection,
    breach_candle_index: usize,
    breach_timestamp: i64,
    breach_price: Decimal,
    state: SweepState,
    close_candle_index: Option<usize>,
    close_timestamp: Option<i64>,
    reversal_candle_index: Option<usize>,
    reversal_timestamp: Option<i64>,
    reversal_strength: Decimal,
}

/// Detects the three-phase liquidity sweep pattern: breach -> close confirmation -> reversal
/// (§4.8). The reversal horizon is measured from the close-confirmation candle, not the breach
/// candle (see DESIGN.md open-question decision #1).
pub struct LiquiditySweepDetector {
    min_breach_distance_pips: Decimal,
    max_breach_distance_pips: Decimal,
    reversal_confirmation_pips: Decimal,
    max_candles_for_reversal: usize,
    min_reversal_strength: Decimal,
    pip_size: Decimal,
    candidates: Vec<SweepCandidate>,
    completed_sweeps: Vec<LiquiditySweep>,
}

impl LiquiditySweepDetector {
    pub fn new(
        min_breach_distance_pips: Decimal,
        max_breach_distance_pips: Decimal,
        reversal_confirmation_pips: Decimal,
        max_candles_for_reversal: usize,
        min_reversal_strength: Decimal,
        pip_size: Decimal,
    ) -> Self {
        Self {
            min_breach_distance_pips,
            max_breach_distance_pips,
            reversal_confirmation_pips,
            max_candles_for_reversal,
            min_reversal_strength,
            pip_size,
            candidates: Vec::new(),
            completed_sweeps: Vec::new(),
        }
    }

    /// Scans `candles[start_index..]` against `liquidity_levels`, advancing any in-flight
    /// candidates and returning newly completed sweeps.
    pub fn detect_sweeps(
        &mut self,
        candles: &[Candle],
        liquidity_levels: &[LiquidityLevel],
        start_index: usize,
    ) -> Vec<LiquiditySweep> {
        if candles.is_empty() || liquidity_levels.is_empty() {
            return Vec::new();
        }

        let active_levels: Vec<&LiquidityLevel> =
            liquidity_levels.iter().filter(|l| l.is_active_or_partial()).collect();

        let mut detected = Vec::new();

        for i in start_index..candles.len() {
            let candle = &candles[i];

            for level in &active_levels {
                if level.origin_candle_index >= i {
                    continue;
                }
                if self.candidates.iter().any(|c| c.level.price == level.price && c.level.level_type == level.level_type) {
                    continue;
                }
                if let Some(candidate) = self.check_breach(candle, level, i) {
                    debug!(price = %level.price, index = i, "new sweep candidate");
                    self.candidates.push(candidate);
                }
            }

            self.update_candidates(candle, i, candles);
            detected.extend(self.check_completions());
        }

        self.cleanup_candidates(candles.len().saturating_sub(1));
        detected
    }

    fn check_breach(&self, candle: &Candle, level: &LiquidityLevel, index: usize) -> Option<SweepCandidate> {
        match level.level_type {
            LiquidityType::BuySide if candle.high > level.price => {
                let breach_distance_pips = (candle.high - level.price) / self.pip_size;
                if breach_distance_pips < self.min_breach_distance_pips || breach_distance_pips > self.max_breach_distance_pips {
                    return None;
                }
                Some(SweepCandidate {
                    level: level.clone(),
                    direction: SweepDirection::Bearish,
                    breach_candle_index: index,
                    breach_timestamp: candle.timestamp_ms,
                    breach_price: candle.high,
                    state: SweepState::Breached,
                    close_candle_index: None,
                    close_timestamp: None,
                    reversal_candle_index: None,
                    reversal_timestamp: None,
                    reversal_strength: Decimal::ZERO,
                })
            }
            LiquidityType::SellSide if candle.low < level.price => {
                let breach_distance_pips = (level.price - candle.low) / self.pip_size;
                if breach_distance_pips < self.min_breach_distance_pips || breach_distance_pips > self.max_breach_distance_pips {
                    return None;
                }
                Some(SweepCandidate {
                    level: level.clone(),
                    direction: SweepDirection::Bullish,
                    breach_candle_index: index,
                    breach_timestamp: candle.timestamp_ms,
                    breach_price: candle.low,
                    state: SweepState::Breached,
                    close_candle_index: None,
                    close_timestamp: None,
                    reversal_candle_index: None,
                    reversal_timestamp: None,
                    reversal_strength: Decimal::ZERO,
                })
            }
            _ => None,
        }
    }

    fn update_candidates(&mut self, candle: &Candle, index: usize, all_candles: &[Candle]) {
        for candidate in self.candidates.iter_mut() {
            match candidate.state {
                SweepState::Breached => {
                    let confirmed = match candidate.direction {
                        SweepDirection::Bearish => candle.close > candidate.level.price,
                        SweepDirection::Bullish => candle.close < candidate.level.price,
                    };
                    if confirmed {
                        candidate.state = SweepState::CloseConfirmed;
                        candidate.close_candle_index = Some(index);
                        candidate.close_timestamp = Some(candle.timestamp_ms);
                    }
                }
                SweepState::CloseConfirmed => {
                    let candles_since_close = index - candidate.close_candle_index.unwrap_or(0);
                    if candles_since_close > self.max_candles_for_reversal {
                        continue;
                    }
                    if let Some(strength) = self.check_reversal(candle, candidate, all_candles) {
                        candidate.state = SweepState::SweepCompleted;
                        candidate.reversal_candle_index = Some(index);
                        candidate.reversal_timestamp = Some(candle.timestamp_ms);
                        candidate.reversal_strength = strength;
                    }
                }
                SweepState::SweepCompleted => {}
            }
        }
    }

    /// Returns the reversal strength once the close is far enough back across the level and
    /// strong enough per `min_reversal_strength`; `None` otherwise.
    fn check_reversal(&self, candle: &Candle, candidate: &SweepCandidate, all_candles: &[Candle]) -> Option<Decimal> {
        let level_price = candidate.level.price;
        let reversal_threshold = self.reversal_confirmation_pips * self.pip_size;

        let reversed = match candidate.direction {
            SweepDirection::Bearish => candle.close < (level_price - reversal_threshold),
            SweepDirection::Bullish => candle.close > (level_price + reversal_threshold),
        };
        if !reversed {
            return None;
        }

        let strength = self.calculate_reversal_strength(candidate, candle, all_candles);
        (strength >= self.min_reversal_strength).then_some(strength)
    }

    /// Reversal strength in `[0, 100]`: distance (0-30) + speed (0-30) + volume (0-25) +
    /// breach cleanliness (0-15).
    fn calculate_reversal_strength(&self, candidate: &SweepCandidate, reversal_candle: &Candle, all_candles: &[Candle]) -> Decimal {
        let level_price = candidate.level.price;
        let reversal_distance = match candidate.direction {
            SweepDirection::Bearish => level_price - reversal_candle.close,
            SweepDirection::Bullish => reversal_candle.close - level_price,
        };
        let reversal_distance_pips = reversal_distance.abs() / self.pip_size;
        let distance_score = (reversal_distance_pips * dec!(2)).min(dec!(30));

        let candles_to_reverse =
            candidate.close_candle_index.unwrap_or(0) as i64 - candidate.breach_candle_index as i64 + 1;
        let speed_score = (dec!(30) - Decimal::from(candles_to_reverse) * dec!(5)).max(Decimal::ZERO);

        let avg_volume = if all_candles.is_empty() {
            dec!(1)
        } else {
            all_candles.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(all_candles.len())
        };
        let volume_ratio = if avg_volume > Decimal::ZERO { reversal_candle.volume / avg_volume } else { dec!(1) };
        let volume_score = (volume_ratio * dec!(12.5)).min(dec!(25));

        let breach_distance_pips = (candidate.breach_price - level_price).abs() / self.pip_size;
        let breach_ratio = breach_distance_pips / self.max_breach_distance_pips;
        let breach_score = (dec!(15) * (Decimal::ONE - breach_ratio)).max(Decimal::ZERO);

        (distance_score + speed_score + volume_score + breach_score).clamp(Decimal::ZERO, dec!(100))
    }

    fn check_completions(&mut self) -> Vec<LiquiditySweep> {
        let mut completed = Vec::new();
        let mut remaining = Vec::new();

        for mut candidate in self.candidates.drain(..) {
            if candidate.state == SweepState::SweepCompleted {
                let breach_distance_pips = (candidate.breach_price - candidate.level.price).abs() / self.pip_size;
                candidate.level.mark_swept(candidate.close_timestamp.unwrap_or(candidate.breach_timestamp));

                let sweep = LiquiditySweep {
                    level: candidate.level.clone(),
                    direction: candidate.direction,
                    breach_ts: candidate.breach_timestamp,
                    breach_index: candidate.breach_candle_index,
                    close_ts: candidate.close_timestamp,
                    reversal_ts: candidate.reversal_timestamp,
                    reversal_index: candidate.reversal_candle_index,
                    breach_distance_pips,
                    reversal_strength: candidate.reversal_strength,
                    is_valid: true,
                };
                self.completed_sweeps.push(sweep.clone());
                completed.push(sweep);
            } else {
                remaining.push(candidate);
            }
        }

        self.candidates = remaining;
        completed
    }

    fn cleanup_candidates(&mut self, current_index: usize) {
        self.candidates.retain(|candidate| match candidate.state {
            SweepState::Breached => current_index.saturating_sub(candidate.breach_candle_index) <= 2,
            SweepState::CloseConfirmed => {
                current_index.saturating_sub(candidate.close_candle_index.unwrap_or(0)) <= self.max_candles_for_reversal
            }
            SweepState::SweepCompleted => false,
        });
    }

    pub fn completed_sweeps(&self) -> &[LiquiditySweep] {
        &self.completed_sweeps
    }

    pub fn active_candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn clear_history(&mut self) {
        self.completed_sweeps.clear();
        self.candidates.clear();
    }
}

impl Default for LiquiditySweepDetector {
    fn default() -> Self {
        Self::new(dec!(1.0), dec!(20.0), dec!(3.0), 5, dec!(30.0), dec!(0.0001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::liquidity::LiquidityState;
    use crate::domain::market::timeframe::Timeframe;

    fn candle(i: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Candle {
        Candle::new("BTCUSDT", Timeframe::OneMin, i * 60_000, open, high, low, close, volume, true).unwrap()
    }

    fn buy_side_level() -> LiquidityLevel {
        LiquidityLevel::new(LiquidityType::BuySide, dec!(1.1000), 0, 0, "BTCUSDT", Timeframe::OneMin, dec!(50), dec!(10))
    }

    #[test]
    fn full_three_phase_sweep_completes_and_marks_level_swept() {
        let mut detector = LiquiditySweepDetector::default();
        let level = buy_side_level();
        let candles = vec![
            candle(0, dec!(1.0950), dec!(1.0960), dec!(1.0940), dec!(1.0955), dec!(100)),
            // breach: high > 1.1000
            candle(1, dec!(1.0990), dec!(1.1010), dec!(1.0985), dec!(1.0995), dec!(100)),
            // close confirmation: close > level
            candle(2, dec!(1.0995), dec!(1.1015), dec!(1.0990), dec!(1.1005), dec!(100)),
            // reversal: close well below level
            candle(3, dec!(1.1000), dec!(1.1005), dec!(1.0920), dec!(1.0930), dec!(500)),
        ];
        let sweeps = detector.detect_sweeps(&candles, std::slice::from_ref(&level), 0);
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].direction, SweepDirection::Bearish);
        assert!(sweeps[0].reversal_strength > Decimal::ZERO, "reversal strength must be captured on the sweep");
        assert_eq!(sweeps[0].level.state, LiquidityState::Swept);
    }

    #[test]
    fn breach_below_min_distance_is_ignored() {
        let mut detector = LiquiditySweepDetector::default();
        let level = buy_side_level();
        // breach of only 0.5 pips, below the 1.0 pip minimum
        let candles = vec![candle(0, dec!(1.0999), dec!(1.10005), dec!(1.0995), dec!(1.0998), dec!(10))];
        let sweeps = detector.detect_sweeps(&candles, std::slice::from_ref(&level), 0);
        assert!(sweeps.is_empty());
        assert_eq!(detector.active_candidate_count(), 0);
    }

    #[test]
    fn stale_breach_without_close_confirmation_is_cleaned_up() {
        let mut detector = LiquiditySweepDetector::default();
        let level = buy_side_level();
        let candles = vec![
            candle(0, dec!(1.0950), dec!(1.1010), dec!(1.0940), dec!(1.0960), dec!(10)), // breach, no close through
            candle(1, dec!(1.0960), dec!(1.0970), dec!(1.0950), dec!(1.0955), dec!(10)),
            candle(2, dec!(1.0955), dec!(1.0965), dec!(1.0945), dec!(1.0950), dec!(10)),
            candle(3, dec!(1.0950), dec!(1.0960), dec!(1.0940), dec!(1.0945), dec!(10)),
        ];
        detector.detect_sweeps(&candles, std::slice::from_ref(&level), 0);
        assert_eq!(detector.active_candidate_count(), 0, "candidate should time out after 2 candles without close confirmation");
    }
}
