use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::domain::errors::CoreError;
use crate::domain::market::liquidity::{LiquidityLevel, LiquidityType};
use crate::domain::trading::order::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeProfitStrategy {
    LiquiditySweep,
    FixedRr,
    Scaled,
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialTakeProfit {
    pub price: Decimal,
    pub share_pct: Decimal,
    pub risk_reward_ratio: Decimal,
    pub aligned_liquidity: Option<LiquidityLevel>,
}

#[derive(Debug, Clone)]
pub struct TakeProfitPlan {
    pub partials: Vec<PartialTakeProfit>,
    pub final_target: Decimal,
    pub min_risk_reward_ratio: Decimal,
    pub actual_risk_reward_ratio: Decimal,
    pub risk_distance: Decimal,
    pub reward_distance: Decimal,
    pub trailing_stop_enabled: bool,
    pub trailing_activation_price: Option<Decimal>,
    pub strategy_used: TakeProfitStrategy,
    pub valid: bool,
}

/// Computes RR-based partial take-profits, optionally snapped to nearby liquidity, plus a
/// trailing-stop rule (§4.18). `partial_tp_percentages` is a list of `(rr_multiple, share_pct)`
/// and must sum to 100.
pub struct TakeProfitCalculator {
    min_risk_reward_ratio: Decimal,
    partial_tp_percentages: Vec<(Decimal, Decimal)>,
    min_distance_pct: Decimal,
    max_distance_pct: Decimal,
    precision: u32,
}

impl TakeProfitCalculator {
    pub fn new(
        min_risk_reward_ratio: Decimal,
        partial_tp_percentages: Vec<(Decimal, Decimal)>,
        min_distance_pct: Decimal,
        max_distance_pct: Decimal,
        precision: u32,
    ) -> Result<Self, CoreError> {
        if min_risk_reward_ratio < Decimal::ONE {
            return Err(CoreError::Validation("min_risk_reward_ratio must be >= 1.0".into()));
        }
        if min_distance_pct <= Decimal::ZERO || min_distance_pct > max_distance_pct {
            return Err(CoreError::Validation("invalid distance range: min must be positive and <= max".into()));
        }
        let total: Decimal = partial_tp_percentages.iter().map(|(_, pct)| *pct).sum();
        if (total - Decimal::ONE_HUNDRED).abs() > Decimal::new(1, 2) {
            return Err(CoreError::Validation(format!("partial TP percentages must sum to 100%, got {total}%")));
        }
        Ok(Self { min_risk_reward_ratio, partial_tp_percentages, min_distance_pct, max_distance_pct, precision })
    }

    pub fn default_percentages() -> Vec<(Decimal, Decimal)> {
        vec![(Decimal::new(15, 1), Decimal::new(25, 0)), (Decimal::TWO, Decimal::new(25, 0)), (Decimal::new(25, 1), Decimal::new(25, 0)), (Decimal::new(3, 0), Decimal::new(25, 0))]
    }

    /// Filters to ACTIVE/PARTIAL liquidity on the correct side of `entry_price`, sorted by
    /// strength descending then proximity, capped to `count` (supplemented: grounded in
    /// `original_source/src/services/risk/take_profit_calculator.py::_find_target_liquidity_levels`).
    fn find_target_liquidity_levels<'a>(&self, liquidity_levels: &'a [LiquidityLevel], entry_price: Decimal, side: PositionSide, count: usize) -> Vec<&'a LiquidityLevel> {
        let wanted_type = match side {
            PositionSide::Long => LiquidityType::BuySide,
            PositionSide::Short => LiquidityType::SellSide,
        };

        let mut relevant: Vec<&LiquidityLevel> = liquidity_levels
            .iter()
            .filter(|level| level.is_active_or_partial() && level.level_type == wanted_type)
            .filter(|level| match side {
                PositionSide::Long => level.price > entry_price,
                PositionSide::Short => level.price < entry_price,
            })
            .collect();

        if relevant.is_empty() {
            debug!("no relevant liquidity levels found for take profit alignment");
            return relevant;
        }

        relevant.sort_by(|a, b| b.strength.cmp(&a.strength).then_with(|| (a.price - entry_price).abs().cmp(&(b.price - entry_price).abs())));
        relevant.truncate(count);
        relevant
    }

    fn tp_price_from_rr(entry_price: Decimal, stop_loss_price: Decimal, rr: Decimal, side: PositionSide) -> Decimal {
        let risk_distance = (entry_price - stop_loss_price).abs();
        let reward_distance = risk_distance * rr;
        match side {
            PositionSide::Long => entry_price + reward_distance,
            PositionSide::Short => entry_price - reward_distance,
        }
    }

    fn validate_distance(&self, entry_price: Decimal, tp_price: Decimal) -> bool {
        if entry_price == Decimal::ZERO {
            return false;
        }
        let distance_pct = ((entry_price - tp_price).abs() / entry_price) * Decimal::ONE_HUNDRED;
        let valid = distance_pct >= self.min_distance_pct && distance_pct <= self.max_distance_pct;
        if !valid {
            warn!(%distance_pct, min = %self.min_distance_pct, max = %self.max_distance_pct, "take profit distance outside valid range, including anyway");
        }
        valid
    }

    fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(self.precision, RoundingStrategy::ToZero)
    }

    /// Computes one RR-based target per configured `(rr_multiple, share_pct)` pair, snapping to
    /// a nearby liquidity level within 1% of the RR target when one is available.
    pub fn calculate_partial_take_profits(&self, entry_price: Decimal, stop_loss_price: Decimal, side: PositionSide, liquidity_levels: &[LiquidityLevel]) -> Vec<PartialTakeProfit> {
        let target_levels = self.find_target_liquidity_levels(liquidity_levels, entry_price, side, self.partial_tp_percentages.len());

        let mut partials = Vec::with_capacity(self.partial_tp_percentages.len());
        for (i, (rr, share_pct)) in self.partial_tp_percentages.iter().enumerate() {
            let mut tp_price = Self::tp_price_from_rr(entry_price, stop_loss_price, *rr, side);
            let mut aligned_liquidity = None;

            if let Some(level) = target_levels.get(i) {
                if entry_price != Decimal::ZERO {
                    let diff_pct = ((tp_price - level.price).abs() / entry_price) * Decimal::ONE_HUNDRED;
                    if diff_pct <= Decimal::ONE {
                        tp_price = level.price;
                        aligned_liquidity = Some((*level).clone());
                        debug!(level = i, price = %tp_price, "aligned take profit with liquidity level");
                    }
                }
            }

            self.validate_distance(entry_price, tp_price);
            tp_price = self.round_price(tp_price);

            partials.push(PartialTakeProfit { price: tp_price, share_pct: *share_pct, risk_reward_ratio: *rr, aligned_liquidity });
        }
        partials
    }

    /// Orchestrates the full plan: partial levels, final target, actual RR, and trailing-stop
    /// activation (the first partial's price).
    pub fn calculate_take_profit(&self, entry_price: Decimal, stop_loss_price: Decimal, side: PositionSide, liquidity_levels: &[LiquidityLevel], strategy: TakeProfitStrategy) -> Result<TakeProfitPlan, CoreError> {
        let partials = self.calculate_partial_take_profits(entry_price, stop_loss_price, side, liquidity_levels);
        let Some(last) = partials.last() else {
            return Err(CoreError::Validation("no partial take profit levels calculated".into()));
        };

        let final_target = last.price;
        let risk_distance = (entry_price - stop_loss_price).abs();
        let reward_distance = (entry_price - final_target).abs();
        let actual_rr = if risk_distance > Decimal::ZERO { reward_distance / risk_distance } else { Decimal::ZERO };
        let valid = actual_rr >= self.min_risk_reward_ratio;

        if !valid {
            warn!(%actual_rr, min = %self.min_risk_reward_ratio, "actual risk-reward ratio below minimum");
        }

        let trailing_activation_price = partials.first().map(|p| p.price);

        Ok(TakeProfitPlan {
            partials,
            final_target,
            min_risk_reward_ratio: self.min_risk_reward_ratio,
            actual_risk_reward_ratio: actual_rr,
            risk_distance,
            reward_distance,
            trailing_stop_enabled: trailing_activation_price.is_some(),
            trailing_activation_price,
            strategy_used: strategy,
            valid,
        })
    }

    /// LONG trails `trailing_pct`% below the highest price reached, floored at entry; SHORT
    /// trails above the lowest price reached, ceilinged at entry.
    pub fn calculate_trailing_stop(&self, entry_price: Decimal, highest_price: Decimal, lowest_price: Decimal, side: PositionSide, trailing_pct: Decimal) -> Decimal {
        let trailing_fraction = trailing_pct / Decimal::ONE_HUNDRED;
        let stop = match side {
            PositionSide::Long => {
                let distance = highest_price * trailing_fraction;
                (highest_price - distance).max(entry_price)
            }
            PositionSide::Short => {
                let distance = lowest_price * trailing_fraction;
                (lowest_price + distance).min(entry_price)
            }
        };
        self.round_price(stop)
    }

    pub fn min_risk_reward_ratio(&self) -> Decimal {
        self.min_risk_reward_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn calculator() -> TakeProfitCalculator {
        TakeProfitCalculator::new(dec!(1.5), TakeProfitCalculator::default_percentages(), dec!(0.5), dec!(10.0), 2).unwrap()
    }

    fn liquidity(level_type: LiquidityType, price: Decimal, strength: Decimal) -> LiquidityLevel {
        LiquidityLevel::new(level_type, price, 0, 0, "BTCUSDT", Timeframe::OneHour, strength, dec!(0))
    }

    #[test]
    fn rejects_percentages_not_summing_to_100() {
        let err = TakeProfitCalculator::new(dec!(1.5), vec![(dec!(1.0), dec!(50))], dec!(0.5), dec!(10.0), 2).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn long_partials_increase_with_rr_and_final_target_meets_min_rr() {
        let calc = calculator();
        let plan = calc.calculate_take_profit(dec!(100), dec!(95), PositionSide::Long, &[], TakeProfitStrategy::FixedRr).unwrap();

        assert_eq!(plan.partials.len(), 4);
        assert_eq!(plan.partials[0].price, dec!(107.5));
        assert_eq!(plan.final_target, dec!(115));
        assert_eq!(plan.actual_risk_reward_ratio, dec!(3));
        assert!(plan.valid);
        assert_eq!(plan.trailing_activation_price, Some(dec!(107.5)));
    }

    #[test]
    fn short_partials_decrease_with_rr() {
        let calc = calculator();
        let plan = calc.calculate_take_profit(dec!(100), dec!(105), PositionSide::Short, &[], TakeProfitStrategy::FixedRr).unwrap();
        assert_eq!(plan.partials[0].price, dec!(92.5));
        assert_eq!(plan.final_target, dec!(85));
    }

    #[test]
    fn snaps_to_nearby_liquidity_level_within_one_percent() {
        let calc = calculator();
        // RR-based first target is 107.5; a buy-side level at 108 is within 1% of entry (100).
        let levels = vec![liquidity(LiquidityType::BuySide, dec!(108), dec!(80))];
        let plan = calc.calculate_take_profit(dec!(100), dec!(95), PositionSide::Long, &levels, TakeProfitStrategy::Auto).unwrap();
        assert_eq!(plan.partials[0].price, dec!(108));
        assert!(plan.partials[0].aligned_liquidity.is_some());
    }

    #[test]
    fn ignores_liquidity_level_too_far_from_rr_target() {
        let calc = calculator();
        let levels = vec![liquidity(LiquidityType::BuySide, dec!(130), dec!(80))];
        let plan = calc.calculate_take_profit(dec!(100), dec!(95), PositionSide::Long, &levels, TakeProfitStrategy::Auto).unwrap();
        assert_eq!(plan.partials[0].price, dec!(107.5));
        assert!(plan.partials[0].aligned_liquidity.is_none());
    }

    #[test]
    fn trailing_stop_long_floors_at_entry() {
        let calc = calculator();
        let stop = calc.calculate_trailing_stop(dec!(100), dec!(105), dec!(100), PositionSide::Long, dec!(10));
        assert_eq!(stop, dec!(100), "10% below 105 is 94.5, below entry, so floored at entry");
    }

    #[test]
    fn trailing_stop_long_trails_below_threshold() {
        let calc = calculator();
        let stop = calc.calculate_trailing_stop(dec!(100), dec!(110), dec!(100), PositionSide::Long, dec!(1));
        assert_eq!(stop, dec!(108.9));
    }

    #[test]
    fn trailing_stop_short_ceilings_at_entry() {
        let calc = calculator();
        let stop = calc.calculate_trailing_stop(dec!(100), dec!(100), dec!(95), PositionSide::Short, dec!(10));
        assert_eq!(stop, dec!(100), "10% above 95 is 104.5, above entry, so ceilinged at entry");
    }
}
