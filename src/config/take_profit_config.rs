use std::env;
use std::str::FromStr;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Defaults for `application::risk_management::take_profit_calculator::TakeProfitCalculator`
/// (§4.18).
#[derive(Debug, Clone)]
pub struct TakeProfitEnvConfig {
    pub min_risk_reward_ratio: Decimal,
    pub min_distance_pct: Decimal,
    pub max_distance_pct: Decimal,
    pub precision: u32,
}

impl Default for TakeProfitEnvConfig {
    fn default() -> Self {
        Self {
            min_risk_reward_ratio: dec!(1.5),
            min_distance_pct: dec!(0.1),
            max_distance_pct: dec!(10),
            precision: 5,
        }
    }
}

impl TakeProfitEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let min_risk_reward_ratio = match env::var("TAKE_PROFIT_MIN_RR") {
            Ok(v) => Decimal::from_str(&v)?,
            Err(_) => d.min_risk_reward_ratio,
        };
        let min_distance_pct = match env::var("TAKE_PROFIT_MIN_DISTANCE_PCT") {
            Ok(v) => Decimal::from_str(&v)?,
            Err(_) => d.min_distance_pct,
        };
        let max_distance_pct = match env::var("TAKE_PROFIT_MAX_DISTANCE_PCT") {
            Ok(v) => Decimal::from_str(&v)?,
            Err(_) => d.max_distance_pct,
        };
        let precision = env::var("TAKE_PROFIT_PRECISION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.precision);

        Ok(Self { min_risk_reward_ratio, min_distance_pct, max_distance_pct, precision })
    }
}
