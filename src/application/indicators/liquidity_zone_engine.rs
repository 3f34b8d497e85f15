use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::application::indicators::swing_detector::SwingDetector;
use crate::domain::market::candle::Candle;
use crate::domain::market::liquidity::{LiquidityLevel, LiquidityState, LiquidityType};
use crate::domain::market::swing::SwingPoint;

/// Builds and maintains buy-side/sell-side liquidity levels from swing points (§4.7).
pub struct LiquidityZoneEngine {
    swings: SwingDetector,
    proximity_tolerance_pips: Decimal,
    pip_size: Decimal,
    volume_lookback: usize,
}

impl LiquidityZoneEngine {
    pub fn new(min_swing_strength: usize, proximity_tolerance_pips: Decimal, pip_size: Decimal, volume_lookback: usize) -> Self {
        Self {
            swings: SwingDetector::new(min_swing_strength),
            proximity_tolerance_pips,
            pip_size,
            volume_lookback,
        }
    }

    /// Strength score in `[0, 100]`: swing-strength factor (0-30) + touch-count factor (0-40) +
    /// volume factor (0-30).
    pub fn calculate_strength(&self, swing: &SwingPoint, candles: &[Candle], touch_count: u32) -> Decimal {
        const MAX_SWING_STRENGTH: Decimal = dec!(10);
        let swing_score = (Decimal::from(swing.strength) / MAX_SWING_STRENGTH * dec!(30)).min(dec!(30));

        let touch_score = (Decimal::from(touch_count) * dec!(10)).min(dec!(40));

        let volume_profile = SwingDetector::volume_profile(candles, swing.candle_index, self.volume_lookback);
        let avg_volume = if candles.is_empty() {
            dec!(1)
        } else {
            candles.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(candles.len())
        };
        let volume_ratio = if avg_volume > Decimal::ZERO {
            (swing.volume + volume_profile) / (dec!(2) * avg_volume)
        } else {
            dec!(1)
        };
        let volume_score = (volume_ratio * dec!(15)).min(dec!(30));

        (swing_score + touch_score + volume_score).clamp(Decimal::ZERO, dec!(100))
    }

    /// Detects swing highs/lows and converts them to buy-side/sell-side liquidity levels,
    /// then clusters nearby levels. Returns `(buy_side, sell_side)`.
    pub fn detect_liquidity_levels(&self, candles: &[Candle]) -> (Vec<LiquidityLevel>, Vec<LiquidityLevel>) {
        if candles.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let symbol = candles[0].symbol.clone();
        let timeframe = candles[0].timeframe;

        let swing_highs = self.swings.detect_swing_highs(candles, None);
        let swing_lows = self.swings.detect_swing_lows(candles, None);

        let buy_side: Vec<LiquidityLevel> = swing_highs
            .iter()
            .map(|swing| {
                let strength = self.calculate_strength(swing, candles, 0);
                let volume_profile = SwingDetector::volume_profile(candles, swing.candle_index, self.volume_lookback);
                LiquidityLevel::new(
                    LiquidityType::BuySide,
                    swing.price,
                    swing.timestamp_ms,
                    swing.candle_index,
                    &symbol,
                    timeframe,
                    strength,
                    volume_profile,
                )
            })
            .collect();

        let sell_side: Vec<LiquidityLevel> = swing_lows
            .iter()
            .map(|swing| {
                let strength = self.calculate_strength(swing, candles, 0);
                let volume_profile = SwingDetector::volume_profile(candles, swing.candle_index, self.volume_lookback);
                LiquidityLevel::new(
                    LiquidityType::SellSide,
                    swing.price,
                    swing.timestamp_ms,
                    swing.candle_index,
                    &symbol,
                    timeframe,
                    strength,
                    volume_profile,
                )
            })
            .collect();

        (self.cluster_nearby_levels(buy_side), self.cluster_nearby_levels(sell_side))
    }

    /// Merges levels whose price lies within `proximity_tolerance_pips` of the running
    /// cluster's mean price into a single, stronger level.
    pub fn cluster_nearby_levels(&self, levels: Vec<LiquidityLevel>) -> Vec<LiquidityLevel> {
        if levels.is_empty() {
            return Vec::new();
        }
        let mut sorted = levels;
        sorted.sort_by(|a, b| a.price.cmp(&b.price));
        let tolerance = self.proximity_tolerance_pips * self.pip_size;

        let mut clustered = Vec::new();
        let mut current: Vec<LiquidityLevel> = vec![sorted[0].clone()];

        for level in sorted.into_iter().skip(1) {
            let cluster_price: Decimal =
                current.iter().map(|l| l.price).sum::<Decimal>() / Decimal::from(current.len());
            if (level.price - cluster_price).abs() <= tolerance {
                current.push(level);
            } else {
                clustered.push(Self::merge_cluster(current));
                current = vec![level];
            }
        }
        clustered.push(Self::merge_cluster(current));
        clustered
    }

    fn merge_cluster(cluster: Vec<LiquidityLevel>) -> LiquidityLevel {
        if cluster.len() == 1 {
            return cluster.into_iter().next().unwrap();
        }

        let base_index = cluster
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.strength.cmp(&b.strength))
            .map(|(i, _)| i)
            .unwrap();
        let base = cluster[base_index].clone();

        let total_strength: Decimal = cluster.iter().map(|l| l.strength).sum();
        let weighted_price = if total_strength > Decimal::ZERO {
            cluster.iter().map(|l| l.price * l.strength).sum::<Decimal>() / total_strength
        } else {
            cluster.iter().map(|l| l.price).sum::<Decimal>() / Decimal::from(cluster.len())
        };

        let total_touches: u32 = cluster.iter().map(|l| l.touch_count).sum();

        let combined_strength = (base.strength
            + cluster
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != base_index)
                .map(|(_, l)| l.strength * dec!(0.3))
                .sum::<Decimal>())
        .min(dec!(100));

        let earliest = cluster
            .iter()
            .min_by_key(|l| l.origin_timestamp_ms)
            .expect("cluster is non-empty");

        let max_volume_profile = cluster.iter().map(|l| l.volume_profile).fold(Decimal::ZERO, Decimal::max);
        let last_touch_ts = cluster.iter().filter_map(|l| l.last_touch_ts).max();

        LiquidityLevel {
            level_type: base.level_type,
            price: weighted_price,
            origin_timestamp_ms: earliest.origin_timestamp_ms,
            origin_candle_index: earliest.origin_candle_index,
            symbol: base.symbol,
            timeframe: base.timeframe,
            touch_count: total_touches,
            strength: combined_strength,
            volume_profile: max_volume_profile,
            state: base.state,
            last_touch_ts,
            swept_ts: None,
        }
    }

    /// Advances level state against new candles starting at `start_index` (§4.7): a level
    /// whose origin candle hasn't happened yet is skipped; BUY_SIDE levels are touched on
    /// `high >= price` and swept on `close > price`; SELL_SIDE levels are touched on
    /// `low <= price` and swept on `close < price`. Sweeps are terminal.
    pub fn update_liquidity_states(&self, levels: &mut [LiquidityLevel], candles: &[Candle], start_index: usize) {
        for i in start_index..candles.len() {
            let candle = &candles[i];
            for level in levels.iter_mut() {
                if !level.is_active_or_partial() || level.origin_candle_index >= i {
                    continue;
                }
                match level.level_type {
                    LiquidityType::BuySide => {
                        if candle.high >= level.price {
                            if candle.close > level.price {
                                level.mark_swept(candle.timestamp_ms);
                                debug!(price = %level.price, "buy-side liquidity swept");
                            } else {
                                level.mark_touched(candle.timestamp_ms);
                            }
                        }
                    }
                    LiquidityType::SellSide => {
                        if candle.low <= level.price {
                            if candle.close < level.price {
                                level.mark_swept(candle.timestamp_ms);
                                debug!(price = %level.price, "sell-side liquidity swept");
                            } else {
                                level.mark_touched(candle.timestamp_ms);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Ages out levels that have sat ACTIVE/PARTIAL for longer than `max_age_candles` without
    /// being swept (supplemental to the original detector, per SPEC_FULL.md §4.7).
    pub fn expire_stale(&self, levels: &mut [LiquidityLevel], current_index: usize, max_age_candles: usize) {
        for level in levels.iter_mut() {
            if level.is_active_or_partial() && current_index.saturating_sub(level.origin_candle_index) > max_age_candles {
                level.expire();
            }
        }
    }

    pub fn is_price_near(level: &LiquidityLevel, price: Decimal, tolerance_pips: Decimal, pip_size: Decimal) -> bool {
        (price - level.price).abs() <= tolerance_pips * pip_size
    }
}

impl Default for LiquidityZoneEngine {
    fn default() -> Self {
        Self::new(3, dec!(2.0), dec!(0.0001), 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;

    fn candle(i: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new("BTCUSDT", Timeframe::OneMin, i * 60_000, low, high, low, close, dec!(1), true).unwrap()
    }

    #[test]
    fn detects_and_clusters_buy_side_levels() {
        let candles = vec![
            candle(0, dec!(10), dec!(9), dec!(9.5)),
            candle(1, dec!(11), dec!(9), dec!(10.5)),
            candle(2, dec!(15), dec!(9), dec!(10)),
            candle(3, dec!(11), dec!(9), dec!(10.5)),
            candle(4, dec!(10), dec!(9), dec!(9.5)),
        ];
        let engine = LiquidityZoneEngine::new(2, dec!(2.0), dec!(0.0001), 20);
        let (buy_side, _sell_side) = engine.detect_liquidity_levels(&candles);
        assert_eq!(buy_side.len(), 1);
        assert_eq!(buy_side[0].price, dec!(15));
    }

    #[test]
    fn close_through_marks_swept_touch_without_close_through_marks_touched() {
        let mut levels = vec![LiquidityLevel::new(
            LiquidityType::BuySide,
            dec!(100),
            0,
            0,
            "BTCUSDT",
            Timeframe::OneMin,
            dec!(50),
            dec!(1),
        )];
        let candles = vec![
            candle(0, dec!(90), dec!(80), dec!(85)),
            candle(1, dec!(101), dec!(95), dec!(98)), // touch: high>=price but close<=price
        ];
        let engine = LiquidityZoneEngine::default();
        engine.update_liquidity_states(&mut levels, &candles, 0);
        assert_eq!(levels[0].state, LiquidityState::Partial);

        let candles2 = vec![candle(2, dec!(105), dec!(95), dec!(102))]; // sweep: close>price
        engine.update_liquidity_states(&mut levels, &candles2, 0);
        assert_eq!(levels[0].state, LiquidityState::Swept);
    }

    #[test]
    fn stale_level_expires_past_max_age() {
        let mut levels = vec![LiquidityLevel::new(
            LiquidityType::SellSide,
            dec!(100),
            0,
            0,
            "BTCUSDT",
            Timeframe::OneMin,
            dec!(50),
            dec!(1),
        )];
        let engine = LiquidityZoneEngine::default();
        engine.expire_stale(&mut levels, 100, 50);
        assert_eq!(levels[0].state, LiquidityState::Expired);
    }
}
