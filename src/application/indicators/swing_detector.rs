use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::market::candle::Candle;
use crate::domain::market::swing::SwingPoint;

/// Detects fractal swing highs/lows: a candle whose high (low) is strictly higher (lower)
/// than every candle within `lookback` positions on both sides (§4.6).
pub struct SwingDetector {
    pub min_swing_strength: usize,
}

impl SwingDetector {
    pub fn new(min_swing_strength: usize) -> Self {
        Self { min_swing_strength: min_swing_strength.max(1) }
    }

    pub fn detect_swing_highs(&self, candles: &[Candle], lookback: Option<usize>) -> Vec<SwingPoint> {
        self.detect(candles, lookback, true)
    }

    pub fn detect_swing_lows(&self, candles: &[Candle], lookback: Option<usize>) -> Vec<SwingPoint> {
        self.detect(candles, lookback, false)
    }

    fn detect(&self, candles: &[Candle], lookback: Option<usize>, highs: bool) -> Vec<SwingPoint> {
        let lookback = lookback.unwrap_or(self.min_swing_strength);
        if candles.len() < lookback * 2 + 1 {
            warn!(need = lookback * 2 + 1, got = candles.len(), "insufficient candles for swing detection");
            return Vec::new();
        }

        let mut points = Vec::new();
        for i in lookback..(candles.len() - lookback) {
            let current = if highs { candles[i].high } else { candles[i].low };

            let left_ok = (i - lookback..i).all(|j| {
                let other = if highs { candles[j].high } else { candles[j].low };
                if highs { current > other } else { current < other }
            });
            if !left_ok {
                continue;
            }

            let right_end = (i + lookback + 1).min(candles.len());
            let right_ok = (i + 1..right_end).all(|j| {
                let other = if highs { candles[j].high } else { candles[j].low };
                if highs { current > other } else { current < other }
            });
            if !right_ok {
                continue;
            }

            points.push(SwingPoint::new(
                current,
                candles[i].timestamp_ms,
                i,
                highs,
                lookback,
                candles[i].volume,
            ));
        }
        points
    }

    /// Average volume in a `volume_lookback`-wide window centered on `center_index` (§4.7).
    pub fn volume_profile(candles: &[Candle], center_index: usize, volume_lookback: usize) -> Decimal {
        let half = volume_lookback / 2;
        let start = center_index.saturating_sub(half);
        let end = (center_index + half).min(candles.len());
        if start >= end {
            return Decimal::ZERO;
        }
        let window = &candles[start..end];
        let sum: Decimal = window.iter().map(|c| c.volume).sum();
        sum / Decimal::from(window.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn candle(i: i64, high: Decimal, low: Decimal) -> Candle {
        Candle::new("BTCUSDT", Timeframe::OneMin, i * 60_000, low, high, low, high, dec!(1), true).unwrap()
    }

    #[test]
    fn detects_a_single_swing_high_with_lookback_two() {
        let candles = vec![
            candle(0, dec!(10), dec!(9)),
            candle(1, dec!(11), dec!(9)),
            candle(2, dec!(15), dec!(9)),
            candle(3, dec!(11), dec!(9)),
            candle(4, dec!(10), dec!(9)),
        ];
        let detector = SwingDetector::new(2);
        let highs = detector.detect_swing_highs(&candles, None);
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].candle_index, 2);
        assert_eq!(highs[0].price, dec!(15));
    }

    #[test]
    fn insufficient_candles_returns_empty() {
        let candles = vec![candle(0, dec!(10), dec!(9)), candle(1, dec!(11), dec!(9))];
        let detector = SwingDetector::new(3);
        assert!(detector.detect_swing_highs(&candles, None).is_empty());
    }

    #[test]
    fn tie_does_not_count_as_a_swing_high() {
        let candles = vec![
            candle(0, dec!(10), dec!(9)),
            candle(1, dec!(15), dec!(9)),
            candle(2, dec!(15), dec!(9)),
            candle(3, dec!(10), dec!(9)),
        ];
        let detector = SwingDetector::new(1);
        assert!(detector.detect_swing_highs(&candles, None).is_empty(), "strict inequality required on both sides");
    }
}
