use std::env;
use std::str::FromStr;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Thresholds for the candle pipeline and indicator stack (§4.3–§4.12).
#[derive(Debug, Clone)]
pub struct IndicatorEnvConfig {
    pub pip_size: Decimal,
    pub max_candles: usize,
    pub outlier_threshold_pct: Decimal,

    pub swing_min_strength: usize,

    pub liquidity_proximity_tolerance_pips: Decimal,
    pub liquidity_volume_lookback: usize,

    pub sweep_min_breach_distance_pips: Decimal,
    pub sweep_max_breach_distance_pips: Decimal,
    pub sweep_reversal_confirmation_pips: Decimal,
    pub sweep_max_candles_for_reversal: usize,
    pub sweep_min_reversal_strength: Decimal,

    pub trend_min_patterns_for_confirmation: usize,
    pub trend_min_price_change_atr_multiple: f64,
    pub trend_atr_period: usize,
    pub trend_transition_threshold: f64,

    pub bms_min_break_distance_pips: Decimal,
    pub bms_max_break_distance_pips: Decimal,
    pub bms_min_follow_through_pips: Decimal,
    pub bms_confirmation_candles: usize,
    pub bms_volume_threshold_multiple: Decimal,
    pub bms_min_confidence_for_confirmed: f64,

    pub state_min_trend_strength: f64,
    pub state_min_bms_for_confirmation: usize,
    pub state_change_threshold: f64,
    pub state_min_confidence: f64,
}

impl Default for IndicatorEnvConfig {
    fn default() -> Self {
        Self {
            pip_size: dec!(0.0001),
            max_candles: 5_000,
            outlier_threshold_pct: dec!(10),

            swing_min_strength: 5,

            liquidity_proximity_tolerance_pips: dec!(5),
            liquidity_volume_lookback: 20,

            sweep_min_breach_distance_pips: dec!(2),
            sweep_max_breach_distance_pips: dec!(50),
            sweep_reversal_confirmation_pips: dec!(3),
            sweep_max_candles_for_reversal: 10,
            sweep_min_reversal_strength: dec!(40),

            trend_min_patterns_for_confirmation: 2,
            trend_min_price_change_atr_multiple: 0.5,
            trend_atr_period: 14,
            trend_transition_threshold: 0.3,

            bms_min_break_distance_pips: dec!(2),
            bms_max_break_distance_pips: dec!(50),
            bms_min_follow_through_pips: dec!(3),
            bms_confirmation_candles: 2,
            bms_volume_threshold_multiple: dec!(1.2),
            bms_min_confidence_for_confirmed: 60.0,

            state_min_trend_strength: 40.0,
            state_min_bms_for_confirmation: 1,
            state_change_threshold: 0.3,
            state_min_confidence: 50.0,
        }
    }
}

/// Parses `$env[key]` with `Decimal::from_str` if set, leaving `default` untouched otherwise.
fn decimal_env(key: &str, default: Decimal) -> Result<Decimal> {
    match env::var(key) {
        Ok(v) => Ok(Decimal::from_str(&v)?),
        Err(_) => Ok(default),
    }
}

fn usize_env(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn f64_env(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl IndicatorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            pip_size: decimal_env("INDICATOR_PIP_SIZE", d.pip_size)?,
            max_candles: usize_env("CANDLE_STORE_MAX_CANDLES", d.max_candles),
            outlier_threshold_pct: decimal_env("CANDLE_OUTLIER_THRESHOLD_PCT", d.outlier_threshold_pct)?,

            swing_min_strength: usize_env("SWING_MIN_STRENGTH", d.swing_min_strength),

            liquidity_proximity_tolerance_pips: decimal_env("LIQUIDITY_PROXIMITY_TOLERANCE_PIPS", d.liquidity_proximity_tolerance_pips)?,
            liquidity_volume_lookback: usize_env("LIQUIDITY_VOLUME_LOOKBACK", d.liquidity_volume_lookback),

            sweep_min_breach_distance_pips: decimal_env("SWEEP_MIN_BREACH_DISTANCE_PIPS", d.sweep_min_breach_distance_pips)?,
            sweep_max_breach_distance_pips: decimal_env("SWEEP_MAX_BREACH_DISTANCE_PIPS", d.sweep_max_breach_distance_pips)?,
            sweep_reversal_confirmation_pips: decimal_env("SWEEP_REVERSAL_CONFIRMATION_PIPS", d.sweep_reversal_confirmation_pips)?,
            sweep_max_candles_for_reversal: usize_env("SWEEP_MAX_CANDLES_FOR_REVERSAL", d.sweep_max_candles_for_reversal),
            sweep_min_reversal_strength: decimal_env("SWEEP_MIN_REVERSAL_STRENGTH", d.sweep_min_reversal_strength)?,

            trend_min_patterns_for_confirmation: usize_env("TREND_MIN_PATTERNS_FOR_CONFIRMATION", d.trend_min_patterns_for_confirmation),
            trend_min_price_change_atr_multiple: f64_env("TREND_MIN_PRICE_CHANGE_ATR_MULTIPLE", d.trend_min_price_change_atr_multiple),
            trend_atr_period: usize_env("TREND_ATR_PERIOD", d.trend_atr_period),
            trend_transition_threshold: f64_env("TREND_TRANSITION_THRESHOLD", d.trend_transition_threshold),

            bms_min_break_distance_pips: decimal_env("BMS_MIN_BREAK_DISTANCE_PIPS", d.bms_min_break_distance_pips)?,
            bms_max_break_distance_pips: decimal_env("BMS_MAX_BREAK_DISTANCE_PIPS", d.bms_max_break_distance_pips)?,
            bms_min_follow_through_pips: decimal_env("BMS_MIN_FOLLOW_THROUGH_PIPS", d.bms_min_follow_through_pips)?,
            bms_confirmation_candles: usize_env("BMS_CONFIRMATION_CANDLES", d.bms_confirmation_candles),
            bms_volume_threshold_multiple: decimal_env("BMS_VOLUME_THRESHOLD_MULTIPLE", d.bms_volume_threshold_multiple)?,
            bms_min_confidence_for_confirmed: f64_env("BMS_MIN_CONFIDENCE_FOR_CONFIRMED", d.bms_min_confidence_for_confirmed),

            state_min_trend_strength: f64_env("STATE_MIN_TREND_STRENGTH", d.state_min_trend_strength),
            state_min_bms_for_confirmation: usize_env("STATE_MIN_BMS_FOR_CONFIRMATION", d.state_min_bms_for_confirmation),
            state_change_threshold: f64_env("STATE_CHANGE_THRESHOLD", d.state_change_threshold),
            state_min_confidence: f64_env("STATE_MIN_CONFIDENCE", d.state_min_confidence),
        })
    }
}
